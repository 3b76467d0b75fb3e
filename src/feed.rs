//! Upstream feed shapes and the raw-to-post mapper.
//!
//! The HTTP fetch itself lives outside this crate; hosts implement
//! [`FeedFetcher`] and hand back [`RawPost`]s, usually by parsing a
//! partner-events page with [`FeedPage::from_json`].

use crate::error::FetchError;
use crate::types::{FeedType, Post, PostData, Timestamp, PATCHNOTES_TAG};
use serde::{Deserialize, Serialize};

/// Source of raw posts. Implementations must reject `limit == 0`
/// (see [`validate_limit`]).
pub trait FeedFetcher: Send + Sync {
    fn fetch(&self, limit: usize) -> Result<Vec<RawPost>, FetchError>;
}

/// Validate a fetch limit before issuing a request.
pub fn validate_limit(limit: usize) -> Result<(), FetchError> {
    if limit == 0 {
        return Err(FetchError::InvalidLimit(limit));
    }
    Ok(())
}

/// Event discriminator carried by the upstream feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    SmallUpdate,
    RegularUpdate,
    MajorUpdate,
    News,
}

impl EventType {
    /// Map the numeric discriminator; unknown values yield `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            12 => Some(EventType::SmallUpdate),
            13 => Some(EventType::RegularUpdate),
            14 => Some(EventType::MajorUpdate),
            28 => Some(EventType::News),
            _ => None,
        }
    }

    pub fn is_update(&self) -> bool {
        !matches!(self, EventType::News)
    }
}

/// Announcement payload of a raw event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementBody {
    #[serde(default)]
    pub gid: String,
    #[serde(default)]
    pub posterid: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub posttime: u64,
    #[serde(default)]
    pub updatetime: u64,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One event as delivered by the upstream feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub gid: String,
    pub event_type: u32,
    #[serde(default)]
    pub appid: u32,
    pub announcement_body: AnnouncementBody,
}

/// A page of the partner-events feed.
#[derive(Clone, Debug, Default)]
pub struct FeedPage {
    pub events: Vec<RawPost>,
}

impl FeedPage {
    /// Parse a feed page. A missing `events` key yields an empty page and
    /// individual malformed events are skipped.
    pub fn from_json(bytes: &[u8]) -> Result<Self, FetchError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let Some(events) = value.get("events").and_then(|e| e.as_array()) else {
            return Ok(Self::default());
        };

        let mut parsed = Vec::with_capacity(events.len());
        for event in events {
            match serde_json::from_value::<RawPost>(event.clone()) {
                Ok(raw) => parsed.push(raw),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed feed event");
                }
            }
        }

        Ok(Self { events: parsed })
    }
}

/// Converts raw events into [`Post`]s.
#[derive(Clone, Debug)]
pub struct FeedMapper {
    /// Prefix for post links; the announcement gid is appended.
    pub url_base: String,
    pub feed_label: String,
    pub feed_name: String,
}

impl Default for FeedMapper {
    fn default() -> Self {
        Self {
            url_base: "https://store.steampowered.com/news/app".to_string(),
            feed_label: "Community Announcements".to_string(),
            feed_name: "community_announcements".to_string(),
        }
    }
}

impl FeedMapper {
    /// Map one event. Unknown discriminators are dropped with a warning.
    pub fn map(&self, raw: &RawPost) -> Option<Post> {
        let Some(event_type) = EventType::from_raw(raw.event_type) else {
            tracing::warn!(
                event_type = raw.event_type,
                gid = %raw.gid,
                headline = %raw.announcement_body.headline,
                "Unknown event type, dropping post"
            );
            return None;
        };

        let body = &raw.announcement_body;
        let announcement_gid = if body.gid.is_empty() {
            raw.gid.as_str()
        } else {
            body.gid.as_str()
        };

        let mut tags = body.tags.clone();
        if event_type.is_update() && !tags.iter().any(|t| t == PATCHNOTES_TAG) {
            tags.push(PATCHNOTES_TAG.to_string());
        }
        if !event_type.is_update() {
            tags.retain(|t| t != PATCHNOTES_TAG);
        }

        Some(Post::new(PostData {
            id: raw.gid.clone(),
            title: body.headline.clone(),
            url: format!("{}/{}/view/{}", self.url_base, raw.appid, announcement_gid),
            is_external_url: false,
            author: body.posterid.clone(),
            contents: body.body.clone(),
            feed_label: self.feed_label.clone(),
            feed_name: self.feed_name.clone(),
            timestamp: Timestamp(body.posttime),
            feed_type: FeedType::Community,
            app_id: raw.appid,
            tags,
        }))
    }

    /// Map a batch, dropping what cannot be mapped.
    pub fn map_all(&self, raw: &[RawPost]) -> Vec<Post> {
        raw.iter().filter_map(|r| self.map(r)).collect()
    }
}
