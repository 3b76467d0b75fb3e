//! Core types for the feed watcher.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Tag that marks a post as patch notes.
pub const PATCHNOTES_TAG: &str = "patchnotes";

/// Seconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Timestamp(secs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Identifier of a delivery destination (a chat).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub i64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Post category. Exactly one holds per post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    News,
    Update,
    External,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::News, Category::Update, Category::External];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::News => "news",
            Category::Update => "update",
            Category::External => "external",
        }
    }

    /// Whether new posts of this category are fanned out to subscribers.
    pub fn is_dispatched(&self) -> bool {
        !matches!(self, Category::External)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feed a post was published through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum FeedType {
    /// Third-party site syndicated into the feed.
    External,
    /// The publisher's own community announcements.
    Community,
    Other(u8),
}

impl From<u8> for FeedType {
    fn from(value: u8) -> Self {
        match value {
            0 => FeedType::External,
            1 => FeedType::Community,
            other => FeedType::Other(other),
        }
    }
}

impl From<FeedType> for u8 {
    fn from(value: FeedType) -> Self {
        match value {
            FeedType::External => 0,
            FeedType::Community => 1,
            FeedType::Other(other) => other,
        }
    }
}

/// Raw attributes of a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostData {
    pub id: String,
    pub title: String,
    pub url: String,
    pub is_external_url: bool,
    pub author: String,
    pub contents: String,
    pub feed_label: String,
    pub feed_name: String,
    pub timestamp: Timestamp,
    pub feed_type: FeedType,
    pub app_id: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PostData {
    fn derive_category(&self) -> Category {
        if self.tags.iter().any(|t| t == PATCHNOTES_TAG) {
            Category::Update
        } else if self.feed_type == FeedType::Community {
            Category::News
        } else {
            Category::External
        }
    }
}

/// An immutable announcement with its category fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PostData", into = "PostData")]
pub struct Post {
    data: PostData,
    category: Category,
}

impl Post {
    pub fn new(data: PostData) -> Self {
        let category = data.derive_category();
        Self { data, category }
    }

    pub fn data(&self) -> &PostData {
        &self.data
    }

    pub fn into_data(self) -> PostData {
        self.data
    }

    pub fn id(&self) -> &str {
        &self.data.id
    }

    pub fn title(&self) -> &str {
        &self.data.title
    }

    pub fn url(&self) -> &str {
        &self.data.url
    }

    pub fn timestamp(&self) -> Timestamp {
        self.data.timestamp
    }

    pub fn tags(&self) -> &[String] {
        &self.data.tags
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn is_news(&self) -> bool {
        self.category == Category::News
    }

    pub fn is_update(&self) -> bool {
        self.category == Category::Update
    }

    pub fn is_external(&self) -> bool {
        self.category == Category::External
    }

    /// Total order used for newness: timestamp, then id.
    pub fn newness_cmp(&self, other: &Post) -> Ordering {
        self.data
            .timestamp
            .cmp(&other.data.timestamp)
            .then_with(|| self.data.id.cmp(&other.data.id))
    }

    /// True if `self` strictly supersedes `other`.
    pub fn is_newer_than(&self, other: &Post) -> bool {
        self.newness_cmp(other) == Ordering::Greater
    }
}

impl From<PostData> for Post {
    fn from(data: PostData) -> Self {
        Post::new(data)
    }
}

impl From<Post> for PostData {
    fn from(post: Post) -> Self {
        post.data
    }
}

/// A registered delivery destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub admin_id: Option<i64>,
    pub is_running: bool,
    pub is_banned: bool,
    pub was_removed_while_banned: bool,
    pub interested_in_news: bool,
    pub interested_in_updates: bool,
    pub last_activity_timestamp: Timestamp,
}

impl Subscriber {
    pub fn new(id: SubscriberId) -> Self {
        Self {
            id,
            admin_id: None,
            is_running: false,
            is_banned: false,
            was_removed_while_banned: false,
            interested_in_news: true,
            interested_in_updates: true,
            last_activity_timestamp: Timestamp::now(),
        }
    }

    /// Interest flag for a category. External posts are never dispatched.
    pub fn is_interested_in(&self, category: Category) -> bool {
        match category {
            Category::News => self.interested_in_news,
            Category::Update => self.interested_in_updates,
            Category::External => false,
        }
    }

    /// Eligible to receive a post of `category` right now.
    pub fn accepts(&self, category: Category) -> bool {
        self.is_running && !self.is_banned && self.is_interested_in(category)
    }
}
