//! Reactivation rate limiting.
//!
//! Counts start/interaction attempts per subscriber inside a trailing
//! window. Once the count meets the configured threshold further attempts
//! are refused and each refusal is a strike; with `strikes_to_ban` set, the
//! subscriber is banned once enough strikes accumulate.

use crate::config::GuardConfig;
use crate::error::{EngineError, Result};
use crate::registry::SubscriberRegistry;
use crate::types::{SubscriberId, Timestamp};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct Activity {
    /// Attempt times inside the current window, oldest first.
    attempts: VecDeque<Instant>,
    strikes: u32,
}

/// Suppresses abusive reactivation.
pub struct AbuseGuard {
    config: GuardConfig,
    registry: Arc<SubscriberRegistry>,
    activity: Mutex<HashMap<SubscriberId, Activity>>,
}

impl AbuseGuard {
    pub fn new(config: GuardConfig, registry: Arc<SubscriberRegistry>) -> Self {
        Self {
            config,
            registry,
            activity: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Whether another attempt from `id` is allowed right now.
    pub fn check(&self, id: SubscriberId) -> bool {
        self.check_at(id, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, id: SubscriberId, now: Instant) -> bool {
        let strikes = {
            let mut activity = self.activity.lock();
            let (recent, struck) = match activity.get_mut(&id) {
                Some(entry) => {
                    self.prune(entry, now);
                    (entry.attempts.len(), entry.strikes)
                }
                None => (0, 0),
            };
            if recent == 0 && struck == 0 {
                activity.remove(&id);
            }

            if (recent as u64) < u64::from(self.config.max_attempts) {
                return true;
            }

            let entry = activity.entry(id).or_default();
            entry.strikes += 1;
            entry.strikes
        };

        tracing::warn!(subscriber = %id, strikes, "Rate limit exceeded");
        self.escalate(id, strikes);
        false
    }

    /// Record an inbound attempt, allowed or not.
    pub fn record_activity(&self, id: SubscriberId) -> Result<()> {
        self.record_activity_at(id, Instant::now())
    }

    /// [`record_activity`](Self::record_activity) against an explicit clock
    /// reading.
    pub fn record_activity_at(&self, id: SubscriberId, now: Instant) -> Result<()> {
        {
            let mut activity = self.activity.lock();
            let entry = activity.entry(id).or_default();
            self.prune(entry, now);
            entry.attempts.push_back(now);
        }

        match self.registry.touch(id, Timestamp::now()) {
            Ok(_) | Err(EngineError::SubscriberNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Strikes accumulated by `id`.
    pub fn strikes(&self, id: SubscriberId) -> u32 {
        self.activity.lock().get(&id).map_or(0, |a| a.strikes)
    }

    /// Number of subscribers with live history.
    pub fn tracked(&self) -> usize {
        self.activity.lock().len()
    }

    /// Forget all history for `id`.
    pub fn reset(&self, id: SubscriberId) {
        self.activity.lock().remove(&id);
    }

    fn prune(&self, entry: &mut Activity, now: Instant) {
        let window = self.config.window();
        while let Some(&oldest) = entry.attempts.front() {
            if now.saturating_duration_since(oldest) < window {
                break;
            }
            entry.attempts.pop_front();
        }
    }

    fn escalate(&self, id: SubscriberId, strikes: u32) {
        let Some(limit) = self.config.strikes_to_ban else {
            return;
        };
        if strikes < limit {
            return;
        }

        match self.registry.get(id) {
            Some(sub) if !sub.is_banned => match self.registry.set_banned(id, true) {
                Ok(_) => tracing::warn!(subscriber = %id, strikes, "Banned after repeated strikes"),
                Err(e) => tracing::error!(subscriber = %id, error = %e, "Failed to persist ban"),
            },
            _ => {}
        }
    }
}
