//! Post watermark tracking.
//!
//! Holds the newest seen post per category and decides which posts of a
//! freshly fetched batch are new. Older posts are discarded, not archived.

use crate::error::Result;
use crate::snapshot::{SnapshotStore, Watermarks};
use crate::types::{Category, Post, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

/// Categories whose watermark advanced during one ingest.
///
/// External posts advance silently and never show up here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ingested {
    pub news: Option<Post>,
    pub update: Option<Post>,
}

impl Ingested {
    pub fn is_empty(&self) -> bool {
        self.news.is_none() && self.update.is_none()
    }

    pub fn get(&self, category: Category) -> Option<&Post> {
        match category {
            Category::News => self.news.as_ref(),
            Category::Update => self.update.as_ref(),
            Category::External => None,
        }
    }

    /// Fired categories, updates first.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Post)> {
        self.update
            .iter()
            .map(|p| (Category::Update, p))
            .chain(self.news.iter().map(|p| (Category::News, p)))
    }
}

/// Tracks the latest post per category.
pub struct PostTracker {
    watermarks: Mutex<Watermarks>,
    store: Arc<dyn SnapshotStore>,
    /// News and update posts older than this are ignored.
    ignore_before: Timestamp,
}

impl PostTracker {
    /// Load watermarks from `store`.
    pub fn load(store: Arc<dyn SnapshotStore>, ignore_before: Timestamp) -> Result<Self> {
        let watermarks = store.load_post_watermarks()?;
        for (category, post) in &watermarks {
            tracing::debug!(category = %category, post = %post.id(), "Loaded watermark");
        }

        Ok(Self {
            watermarks: Mutex::new(watermarks),
            store,
            ignore_before,
        })
    }

    /// Classify a batch and advance watermarks.
    ///
    /// An empty batch, or one holding only stale posts, reports nothing and
    /// mutates nothing. Advanced watermarks are persisted in a single write
    /// before memory is updated, so a failed save leaves every category as
    /// it was.
    pub fn ingest(&self, batch: &[Post]) -> Result<Ingested> {
        let mut watermarks = self.watermarks.lock();
        let mut next = watermarks.clone();
        let mut ingested = Ingested::default();

        for category in Category::ALL {
            let Some(candidate) = self.newest_in(batch, category) else {
                continue;
            };

            let advances = watermarks
                .get(&category)
                .map_or(true, |current| candidate.is_newer_than(current));
            if !advances {
                tracing::debug!(
                    category = %category,
                    candidate = %candidate.id(),
                    "No new post"
                );
                continue;
            }

            next.insert(category, candidate.clone());
            match category {
                Category::News => ingested.news = Some(candidate.clone()),
                Category::Update => ingested.update = Some(candidate.clone()),
                Category::External => {
                    tracing::debug!(post = %candidate.id(), "External watermark advanced");
                }
            }
        }

        if next == *watermarks {
            return Ok(ingested);
        }

        self.store.save_post_watermarks(&next)?;
        *watermarks = next;
        Ok(ingested)
    }

    /// No watermark is known yet for any category.
    pub fn is_empty(&self) -> bool {
        self.watermarks.lock().is_empty()
    }

    /// Current watermark for a category.
    pub fn latest_in(&self, category: Category) -> Option<Post> {
        self.watermarks.lock().get(&category).cloned()
    }

    /// Newest watermark across all categories.
    pub fn latest(&self) -> Option<Post> {
        self.watermarks
            .lock()
            .values()
            .max_by(|a, b| a.newness_cmp(b))
            .cloned()
    }

    /// Persist every watermark.
    pub fn flush(&self) -> Result<()> {
        let watermarks = self.watermarks.lock();
        self.store.save_post_watermarks(&watermarks)
    }

    fn newest_in<'a>(&self, batch: &'a [Post], category: Category) -> Option<&'a Post> {
        batch
            .iter()
            .filter(|p| p.category() == category)
            .filter(|p| !category.is_dispatched() || p.timestamp() >= self.ignore_before)
            .max_by(|a, b| a.newness_cmp(b))
    }
}
