//! Registry of subscribers backed by a snapshot store.

use crate::error::{EngineError, Result};
use crate::snapshot::SnapshotStore;
use crate::types::{Category, Subscriber, SubscriberId, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

/// Manages subscribers and their lifecycle flags.
///
/// Listing order is insertion order, which survives restarts.
pub struct SubscriberRegistry {
    /// Subscribers in insertion order.
    subscribers: Mutex<Vec<Subscriber>>,
    store: Arc<dyn SnapshotStore>,
}

impl SubscriberRegistry {
    /// Load the registry from `store`.
    pub fn load(store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let subscribers = store.load_subscribers()?;
        tracing::info!(count = subscribers.len(), "Loaded subscribers");

        Ok(Self {
            subscribers: Mutex::new(subscribers),
            store,
        })
    }

    pub fn get(&self, id: SubscriberId) -> Option<Subscriber> {
        self.subscribers.lock().iter().find(|s| s.id == id).cloned()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all subscribers in insertion order.
    pub fn all(&self) -> Vec<Subscriber> {
        self.subscribers.lock().clone()
    }

    /// Register a new subscriber with default flags.
    ///
    /// Fails with [`EngineError::SubscriberExists`] if `id` is known; callers
    /// check with [`get`](Self::get) first.
    pub fn create_and_register(&self, id: SubscriberId) -> Result<Subscriber> {
        let subscriber = self.mutate(|subs| {
            if subs.iter().any(|s| s.id == id) {
                return Err(EngineError::SubscriberExists(id));
            }
            let subscriber = Subscriber::new(id);
            subs.push(subscriber.clone());
            Ok(subscriber)
        })?;

        tracing::info!(subscriber = %id, "Registered subscriber");
        Ok(subscriber)
    }

    /// Register `id` as running with `admin_id` as its administrator, in
    /// a single write.
    pub fn register_running(&self, id: SubscriberId, admin_id: i64) -> Result<Subscriber> {
        let subscriber = self.mutate(|subs| {
            if subs.iter().any(|s| s.id == id) {
                return Err(EngineError::SubscriberExists(id));
            }
            let mut subscriber = Subscriber::new(id);
            subscriber.admin_id = Some(admin_id);
            subscriber.is_running = true;
            subs.push(subscriber.clone());
            Ok(subscriber)
        })?;

        tracing::info!(subscriber = %id, admin = admin_id, "Registered running subscriber");
        Ok(subscriber)
    }

    /// Remove a subscriber. Returns whether it was present; removing an
    /// unknown id is a no-op.
    pub fn remove(&self, id: SubscriberId) -> Result<bool> {
        let mut subs = self.subscribers.lock();
        let Some(pos) = subs.iter().position(|s| s.id == id) else {
            return Ok(false);
        };

        let mut next = subs.clone();
        next.remove(pos);
        self.store.save_subscribers(&next)?;
        *subs = next;

        tracing::info!(subscriber = %id, "Removed subscriber");
        Ok(true)
    }

    pub fn set_running(&self, id: SubscriberId, running: bool) -> Result<Subscriber> {
        self.update(id, |s| s.is_running = running)
    }

    /// Set the interest flag for a dispatched category.
    pub fn set_interest(
        &self,
        id: SubscriberId,
        category: Category,
        interested: bool,
    ) -> Result<Subscriber> {
        match category {
            Category::News => self.update(id, |s| s.interested_in_news = interested),
            Category::Update => self.update(id, |s| s.interested_in_updates = interested),
            Category::External => Err(EngineError::NotDispatched(category)),
        }
    }

    /// Flip the interest flag for a category and return the new value.
    pub fn toggle_interest(&self, id: SubscriberId, category: Category) -> Result<bool> {
        let current = self
            .get(id)
            .ok_or(EngineError::SubscriberNotFound(id))?
            .is_interested_in(category);
        let updated = self.set_interest(id, category, !current)?;
        Ok(updated.is_interested_in(category))
    }

    pub fn set_admin(&self, id: SubscriberId, admin_id: Option<i64>) -> Result<Subscriber> {
        self.update(id, |s| s.admin_id = admin_id)
    }

    pub fn set_banned(&self, id: SubscriberId, banned: bool) -> Result<Subscriber> {
        self.update(id, |s| s.is_banned = banned)
    }

    pub fn set_removed_while_banned(&self, id: SubscriberId, removed: bool) -> Result<Subscriber> {
        self.update(id, |s| s.was_removed_while_banned = removed)
    }

    /// Stamp the last activity time.
    pub fn touch(&self, id: SubscriberId, at: Timestamp) -> Result<Subscriber> {
        self.update(id, |s| s.last_activity_timestamp = at)
    }

    /// Subscribers that are running, not banned, and interested in
    /// `category`, in insertion order.
    pub fn list_active_interested_in(&self, category: Category) -> Vec<Subscriber> {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| s.accepts(category))
            .cloned()
            .collect()
    }

    /// Persist the current collection.
    pub fn flush(&self) -> Result<()> {
        let subs = self.subscribers.lock();
        self.store.save_subscribers(&subs)
    }

    fn update<F>(&self, id: SubscriberId, apply: F) -> Result<Subscriber>
    where
        F: FnOnce(&mut Subscriber),
    {
        self.mutate(|subs| {
            let subscriber = subs
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(EngineError::SubscriberNotFound(id))?;
            apply(subscriber);
            Ok(subscriber.clone())
        })
    }

    /// Apply `f` to a copy of the collection, persist it, then commit.
    /// The lock is held throughout so readers never see unsaved state.
    fn mutate<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<Subscriber>) -> Result<R>,
    {
        let mut subs = self.subscribers.lock();
        let mut next = subs.clone();
        let out = f(&mut next)?;
        self.store.save_subscribers(&next)?;
        *subs = next;
        Ok(out)
    }
}
