//! Durable snapshots of subscribers and post watermarks.
//!
//! Two independent collections are kept:
//! - the ordered list of all known subscribers
//! - up to one post watermark per [`Category`]
//!
//! Both are loaded fully at startup. A missing backing resource loads as an
//! empty collection.

mod file;
mod format;
mod memory;

use crate::error::Result;
use crate::types::{Category, Post, Subscriber};
use std::collections::BTreeMap;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;

/// Post watermarks keyed by category.
pub type Watermarks = BTreeMap<Category, Post>;

/// Backing store for registry and tracker state.
pub trait SnapshotStore: Send + Sync {
    /// All known subscribers in insertion order.
    fn load_subscribers(&self) -> Result<Vec<Subscriber>>;

    /// Replace the stored subscriber collection.
    fn save_subscribers(&self, subscribers: &[Subscriber]) -> Result<()>;

    fn load_post_watermarks(&self) -> Result<Watermarks>;

    /// Replace the watermark of one category, leaving the others untouched.
    fn save_post_watermark(&self, category: Category, post: &Post) -> Result<()>;

    /// Replace every stored watermark in one write. Either all of
    /// `watermarks` is persisted or none of it is.
    fn save_post_watermarks(&self, watermarks: &Watermarks) -> Result<()>;
}
