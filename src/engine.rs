//! Engine facade tying all components together.

use crate::config::EngineConfig;
use crate::dispatch::{
    Collaborators, CycleReport, DispatchSettings, Dispatcher, PeriodicDriver, RecipientOutcome,
};
use crate::error::{EngineError, Result};
use crate::guard::AbuseGuard;
use crate::registry::SubscriberRegistry;
use crate::snapshot::{FileSnapshotStore, SnapshotStore};
use crate::tracker::PostTracker;
use crate::types::{Category, Post, Subscriber, SubscriberId, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

/// Kind of conversation a command arrived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one conversation with the subscriber.
    Private,
    /// Group or channel with an administrator.
    Group,
}

/// Result of a start command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started { created: bool },
    AlreadyRunning,
    RateLimited,
    Banned,
}

/// Result of a stop command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Private context: the subscriber was removed.
    Removed,
    /// Group context: delivery paused, registration kept.
    Stopped,
    Banned,
    NotRegistered,
}

/// Result of the sender leaving or being removed from a chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipOutcome {
    Removed,
    MarkedRemovedWhileBanned,
    NotRegistered,
}

/// The notification dispatch engine.
///
/// `initialize` loads the snapshot store, `shutdown` stops polling and
/// flushes all state. Hosts call these from their own lifecycle hooks.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<SubscriberRegistry>,
    tracker: Arc<PostTracker>,
    guard: AbuseGuard,
    dispatcher: Arc<Dispatcher>,
    driver: Mutex<Option<PeriodicDriver>>,
}

impl Engine {
    /// Open the file snapshot store under `config.data_dir` and build the
    /// engine on top of it.
    pub fn initialize(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(FileSnapshotStore::open(&config.data_dir)?);
        Self::with_store(config, store, collaborators)
    }

    /// Build the engine on an existing snapshot store.
    pub fn with_store(
        config: EngineConfig,
        store: Arc<dyn SnapshotStore>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SubscriberRegistry::load(Arc::clone(&store))?);
        let tracker = Arc::new(PostTracker::load(
            Arc::clone(&store),
            Timestamp(config.ignore_posts_before),
        )?);
        let guard = AbuseGuard::new(config.guard.clone(), Arc::clone(&registry));
        let dispatcher = Arc::new(Dispatcher::new(
            collaborators,
            Arc::clone(&registry),
            Arc::clone(&tracker),
            DispatchSettings {
                fetch_limit: config.fetch_limit,
                concurrency: config.fanout_concurrency,
                soft_deadline: config.cycle_soft_deadline(),
            },
        )?);

        if tracker.is_empty() {
            dispatcher.prime()?;
        }

        tracing::info!(
            subscribers = registry.len(),
            poll_interval_secs = config.poll_interval_secs,
            "Engine initialized"
        );

        Ok(Self {
            config,
            registry,
            tracker,
            guard,
            dispatcher,
            driver: Mutex::new(None),
        })
    }

    /// Stop polling and flush subscribers and watermarks.
    pub fn shutdown(&self) -> Result<()> {
        self.stop_polling();
        self.registry.flush()?;
        self.tracker.flush()?;
        tracing::info!("Engine shut down");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<PostTracker> {
        &self.tracker
    }

    pub fn guard(&self) -> &AbuseGuard {
        &self.guard
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    // --- Polling ---

    /// Run one dispatch cycle on the calling thread.
    pub fn run_cycle(&self) -> CycleReport {
        self.dispatcher.run_cycle()
    }

    /// Start the periodic driver. Returns false if it was already running.
    pub fn start_polling(&self) -> Result<bool> {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            return Ok(false);
        }
        *driver = Some(PeriodicDriver::spawn(
            Arc::clone(&self.dispatcher),
            self.config.poll_interval(),
        )?);
        Ok(true)
    }

    /// Stop the periodic driver, letting an in-flight cycle drain.
    pub fn stop_polling(&self) {
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            driver.stop();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.driver.lock().is_some()
    }

    // --- Subscriber Commands ---

    /// Handle a start request for `chat` issued by user `caller`.
    pub fn start(&self, chat: SubscriberId, caller: i64) -> Result<StartOutcome> {
        let allowed = self.guard.check(chat);
        self.guard.record_activity(chat)?;
        if !allowed {
            return Ok(StartOutcome::RateLimited);
        }

        let Some(subscriber) = self.registry.get(chat) else {
            self.registry.register_running(chat, caller)?;
            return Ok(StartOutcome::Started { created: true });
        };

        if subscriber.was_removed_while_banned {
            self.registry.set_removed_while_banned(chat, false)?;
        }
        if subscriber.is_banned {
            tracing::debug!(subscriber = %chat, "Ignoring start from banned subscriber");
            return Ok(StartOutcome::Banned);
        }
        if subscriber.is_running {
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.registry.set_running(chat, true)?;
        Ok(StartOutcome::Started { created: false })
    }

    /// Handle a stop request for `chat`.
    pub fn stop(&self, chat: SubscriberId, kind: ChatKind) -> Result<StopOutcome> {
        let Some(subscriber) = self.registry.get(chat) else {
            return Ok(StopOutcome::NotRegistered);
        };
        if subscriber.is_banned {
            return Ok(StopOutcome::Banned);
        }

        match kind {
            ChatKind::Private => {
                self.registry.remove(chat)?;
                Ok(StopOutcome::Removed)
            }
            ChatKind::Group => {
                self.registry.set_running(chat, false)?;
                Ok(StopOutcome::Stopped)
            }
        }
    }

    pub fn set_interest(&self, chat: SubscriberId, category: Category, interested: bool) -> Result<()> {
        self.registry.set_interest(chat, category, interested)?;
        Ok(())
    }

    /// Flip interest in `category`; returns the new value.
    pub fn toggle_interest(&self, chat: SubscriberId, category: Category) -> Result<bool> {
        self.registry.toggle_interest(chat, category)
    }

    /// The engine was added to `chat` by `admin`.
    pub fn member_joined(&self, chat: SubscriberId, admin: i64) -> Result<Subscriber> {
        if !self.registry.contains(chat) {
            self.registry.create_and_register(chat)?;
        }
        self.registry.set_admin(chat, Some(admin))
    }

    /// The engine was removed from `chat`. Banned subscribers stay
    /// registered and are only flagged.
    pub fn member_left(&self, chat: SubscriberId) -> Result<MembershipOutcome> {
        let Some(subscriber) = self.registry.get(chat) else {
            return Ok(MembershipOutcome::NotRegistered);
        };

        if subscriber.is_banned {
            self.registry.set_removed_while_banned(chat, true)?;
            return Ok(MembershipOutcome::MarkedRemovedWhileBanned);
        }

        self.registry.remove(chat)?;
        Ok(MembershipOutcome::Removed)
    }

    // --- Queries ---

    /// Newest known post across all categories.
    pub fn latest(&self) -> Option<Post> {
        self.tracker.latest()
    }

    pub fn latest_in(&self, category: Category) -> Option<Post> {
        self.tracker.latest_in(category)
    }

    /// Send the latest post (of `category`, or overall) to `chat` on request.
    ///
    /// Returns `None` when there is nothing to send or the subscriber is
    /// banned.
    pub fn send_latest(
        &self,
        chat: SubscriberId,
        category: Option<Category>,
    ) -> Result<Option<RecipientOutcome>> {
        let subscriber = self
            .registry
            .get(chat)
            .ok_or(EngineError::SubscriberNotFound(chat))?;
        if subscriber.is_banned {
            return Ok(None);
        }

        let post = match category {
            Some(category) => self.latest_in(category),
            None => self.latest(),
        };
        Ok(post.map(|p| self.dispatcher.deliver_post(&p, chat)))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best-effort flush on drop
        let _ = self.shutdown();
    }
}
