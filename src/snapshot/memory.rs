//! Volatile snapshot store.

use super::{SnapshotStore, Watermarks};
use crate::error::Result;
use crate::types::{Category, Post, Subscriber};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory store for hosts that do not need durability, and for tests.
#[derive(Default)]
pub struct MemorySnapshotStore {
    subscribers: Mutex<Vec<Subscriber>>,
    watermarks: Mutex<Watermarks>,
    subscriber_saves: AtomicU64,
    watermark_saves: AtomicU64,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save_subscribers` calls so far.
    pub fn subscriber_saves(&self) -> u64 {
        self.subscriber_saves.load(Ordering::SeqCst)
    }

    /// Number of watermark writes so far, single or bulk.
    pub fn watermark_saves(&self) -> u64 {
        self.watermark_saves.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.subscribers.lock().clone())
    }

    fn save_subscribers(&self, subscribers: &[Subscriber]) -> Result<()> {
        *self.subscribers.lock() = subscribers.to_vec();
        self.subscriber_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_post_watermarks(&self) -> Result<Watermarks> {
        Ok(self.watermarks.lock().clone())
    }

    fn save_post_watermark(&self, category: Category, post: &Post) -> Result<()> {
        self.watermarks.lock().insert(category, post.clone());
        self.watermark_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_post_watermarks(&self, watermarks: &Watermarks) -> Result<()> {
        *self.watermarks.lock() = watermarks.clone();
        self.watermark_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
