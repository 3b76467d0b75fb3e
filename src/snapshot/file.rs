//! File-backed snapshot store.

use super::format::{read_snapshot, write_snapshot, SNAPSHOT_VERSION};
use super::{SnapshotStore, Watermarks};
use crate::error::{EngineError, Result};
use crate::types::{Category, Post, Subscriber};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for the store manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"FWS\0";

/// Magic bytes for the subscriber snapshot.
const SUBSCRIBERS_MAGIC: &[u8; 4] = b"FWC\0";

/// Magic bytes for the watermark snapshot.
const WATERMARKS_MAGIC: &[u8; 4] = b"FWP\0";

const SUBSCRIBERS_FILE: &str = "subscribers.snap";
const WATERMARKS_FILE: &str = "watermarks.snap";

/// Snapshot store persisting each collection to its own file.
///
/// The directory is locked exclusively while the store is open.
pub struct FileSnapshotStore {
    path: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Serializes writers; watermark saves are read-modify-write.
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    /// Open the store at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        if path.join("MANIFEST").exists() {
            Self::verify_manifest(&path)?;
        } else {
            Self::write_manifest(&path)?;
        }

        let lock_file = Self::acquire_lock(&path)?;
        tracing::debug!(path = %path.display(), "Opened snapshot store");

        Ok(Self {
            path,
            _lock_file: lock_file,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn subscribers_path(&self) -> PathBuf {
        self.path.join(SUBSCRIBERS_FILE)
    }

    fn watermarks_path(&self) -> PathBuf {
        self.path.join(WATERMARKS_FILE)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(MANIFEST_MAGIC)?;
        file.write_all(&[SNAPSHOT_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MANIFEST_MAGIC {
            return Err(EngineError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != SNAPSHOT_VERSION {
            return Err(EngineError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| EngineError::Locked)?;
        Ok(lock_file)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(read_snapshot(&self.subscribers_path(), SUBSCRIBERS_MAGIC)?.unwrap_or_default())
    }

    fn save_subscribers(&self, subscribers: &[Subscriber]) -> Result<()> {
        let _lock = self.write_lock.lock();
        write_snapshot(&self.subscribers_path(), SUBSCRIBERS_MAGIC, subscribers)
    }

    fn load_post_watermarks(&self) -> Result<Watermarks> {
        Ok(read_snapshot(&self.watermarks_path(), WATERMARKS_MAGIC)?.unwrap_or_default())
    }

    fn save_post_watermark(&self, category: Category, post: &Post) -> Result<()> {
        let _lock = self.write_lock.lock();
        let mut watermarks: Watermarks =
            read_snapshot(&self.watermarks_path(), WATERMARKS_MAGIC)?.unwrap_or_default();
        watermarks.insert(category, post.clone());
        write_snapshot(&self.watermarks_path(), WATERMARKS_MAGIC, &watermarks)
    }

    fn save_post_watermarks(&self, watermarks: &Watermarks) -> Result<()> {
        let _lock = self.write_lock.lock();
        write_snapshot(&self.watermarks_path(), WATERMARKS_MAGIC, watermarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::post;
    use crate::types::SubscriberId;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::open(dir.path().join("store")).unwrap();

        assert!(store.load_subscribers().unwrap().is_empty());
        assert!(store.load_post_watermarks().unwrap().is_empty());
        assert!(store.path().join("MANIFEST").exists());
    }

    #[test]
    fn test_subscribers_keep_order_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        {
            let store = FileSnapshotStore::open(&path).unwrap();
            let subs = vec![
                Subscriber::new(SubscriberId(1337)),
                Subscriber::new(SubscriberId(42)),
            ];
            store.save_subscribers(&subs).unwrap();
        }

        let store = FileSnapshotStore::open(&path).unwrap();
        let ids: Vec<_> = store
            .load_subscribers()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![SubscriberId(1337), SubscriberId(42)]);
    }

    #[test]
    fn test_watermark_save_touches_one_category() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::open(dir.path().join("store")).unwrap();

        store
            .save_post_watermark(Category::News, &post("news-1", 100, &[]))
            .unwrap();
        store
            .save_post_watermark(Category::Update, &post("update-1", 200, &["patchnotes"]))
            .unwrap();
        store
            .save_post_watermark(Category::Update, &post("update-2", 300, &["patchnotes"]))
            .unwrap();

        let marks = store.load_post_watermarks().unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[&Category::News].id(), "news-1");
        assert_eq!(marks[&Category::Update].id(), "update-2");
        assert!(marks[&Category::Update].is_update());
    }

    #[test]
    fn test_bulk_watermark_save_replaces_all() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::open(dir.path().join("store")).unwrap();
        store
            .save_post_watermark(Category::External, &post("ext-1", 50, &[]))
            .unwrap();

        let mut marks = Watermarks::new();
        marks.insert(Category::News, post("news-1", 100, &[]));
        marks.insert(Category::Update, post("update-1", 200, &["patchnotes"]));
        store.save_post_watermarks(&marks).unwrap();

        assert_eq!(store.load_post_watermarks().unwrap(), marks);
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");

        let _store = FileSnapshotStore::open(&path).unwrap();
        let result = FileSnapshotStore::open(&path);
        assert!(matches!(result, Err(EngineError::Locked)));
    }
}
