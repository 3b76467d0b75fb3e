//! The dispatch cycle: fetch, track, fan out, reconcile.

use super::types::{
    CategoryReport, CycleReport, CycleStatus, DeliveryAction, OutboundMessage, RecipientOutcome,
    Renderer, Transport,
};
use crate::error::{DeliveryError, EngineError, Result};
use crate::feed::{FeedFetcher, FeedMapper};
use crate::registry::SubscriberRegistry;
use crate::tracker::{Ingested, PostTracker};
use crate::types::{Post, Subscriber, SubscriberId};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dispatcher lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchState {
    Idle = 0,
    Fetching = 1,
    Tracking = 2,
    Fanout = 3,
    /// Idle after a failed fetch. The next tick proceeds as from `Idle`.
    Suspended = 4,
}

impl DispatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DispatchState::Fetching,
            2 => DispatchState::Tracking,
            3 => DispatchState::Fanout,
            4 => DispatchState::Suspended,
            _ => DispatchState::Idle,
        }
    }

    /// A cycle is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            DispatchState::Fetching | DispatchState::Tracking | DispatchState::Fanout
        )
    }
}

/// External collaborators of the dispatch loop.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn FeedFetcher>,
    pub renderer: Arc<dyn Renderer>,
    pub transport: Arc<dyn Transport>,
    pub mapper: FeedMapper,
}

/// Tunables of the dispatch loop.
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub fetch_limit: usize,
    pub concurrency: usize,
    pub soft_deadline: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 100,
            concurrency: 8,
            soft_deadline: Some(Duration::from_secs(30)),
        }
    }
}

/// Runs dispatch cycles. At most one cycle is in flight at a time;
/// overlapping calls return a skipped report.
pub struct Dispatcher {
    collaborators: Collaborators,
    registry: Arc<SubscriberRegistry>,
    tracker: Arc<PostTracker>,
    settings: DispatchSettings,
    state: AtomicU8,
    consecutive_fetch_failures: AtomicU64,
}

/// Returns the dispatcher to a resting state when a cycle ends, even on
/// unwind.
struct CycleGuard<'a> {
    state: &'a AtomicU8,
    rest: DispatchState,
}

impl CycleGuard<'_> {
    fn advance(&self, next: DispatchState) {
        self.state.store(next as u8, Ordering::SeqCst);
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.store(self.rest as u8, Ordering::SeqCst);
    }
}

impl Dispatcher {
    pub fn new(
        collaborators: Collaborators,
        registry: Arc<SubscriberRegistry>,
        tracker: Arc<PostTracker>,
        settings: DispatchSettings,
    ) -> Result<Self> {
        if settings.fetch_limit == 0 {
            return Err(EngineError::InvalidFetchLimit(settings.fetch_limit));
        }
        if settings.concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "fan-out concurrency must be greater than 0".into(),
            ));
        }

        Ok(Self {
            collaborators,
            registry,
            tracker,
            settings,
            state: AtomicU8::new(DispatchState::Idle as u8),
            consecutive_fetch_failures: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> DispatchState {
        DispatchState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Fetch failures since the last successful fetch.
    pub fn consecutive_fetch_failures(&self) -> u64 {
        self.consecutive_fetch_failures.load(Ordering::SeqCst)
    }

    /// Run one full cycle. Every recipient is resolved before this returns.
    pub fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let Some(mut guard) = self.begin() else {
            tracing::debug!("Dispatch cycle already in flight, skipping tick");
            return CycleReport::without_fanout(CycleStatus::Skipped, started.elapsed());
        };

        let raw = match self.collaborators.fetcher.fetch(self.settings.fetch_limit) {
            Ok(raw) => raw,
            Err(e) => {
                let failures = self.consecutive_fetch_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(error = %e, failures, "Feed fetch failed, will retry next tick");
                guard.rest = DispatchState::Suspended;
                return CycleReport::without_fanout(CycleStatus::FetchFailed(e), started.elapsed());
            }
        };
        self.consecutive_fetch_failures.store(0, Ordering::SeqCst);

        guard.advance(DispatchState::Tracking);
        let posts = self.collaborators.mapper.map_all(&raw);
        let ingested = match self.tracker.ingest(&posts) {
            Ok(ingested) => ingested,
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist watermarks");
                return CycleReport::without_fanout(
                    CycleStatus::TrackingFailed(e.to_string()),
                    started.elapsed(),
                );
            }
        };

        if ingested.is_empty() {
            tracing::debug!(fetched = raw.len(), "No new posts");
            return CycleReport::without_fanout(CycleStatus::Completed, started.elapsed());
        }

        guard.advance(DispatchState::Fanout);
        let mut fired = Vec::new();
        for (category, post) in ingested.iter() {
            let recipients = self.registry.list_active_interested_in(category);
            tracing::info!(
                category = %category,
                post = %post.id(),
                recipients = recipients.len(),
                "New post, fanning out"
            );

            let message = self.collaborators.renderer.render(post);
            let outcomes = self.fan_out(&message, &recipients);
            log_fanout(category.as_str(), &outcomes);

            fired.push(CategoryReport {
                category,
                post: post.clone(),
                outcomes,
            });
        }

        let elapsed = started.elapsed();
        if let Some(deadline) = self.settings.soft_deadline {
            if elapsed > deadline {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    deadline_ms = deadline.as_millis() as u64,
                    "Dispatch cycle overran its soft deadline"
                );
            }
        }

        CycleReport {
            status: CycleStatus::Completed,
            fired,
            elapsed,
        }
    }

    /// Render `post` and deliver it to a single subscriber, applying the
    /// same failure classification as a cycle.
    pub fn deliver_post(&self, post: &Post, subscriber: SubscriberId) -> RecipientOutcome {
        let message = self.collaborators.renderer.render(post);
        let result = self.attempt(&message, subscriber);
        self.reconcile(subscriber, result)
    }

    /// Fetch once and record the result as already seen, without fanning
    /// out. Used on a fresh install so the feed's backlog is not sent to
    /// every subscriber on the first tick.
    ///
    /// Returns `None` if a cycle is in flight or the fetch failed; neither
    /// affects the fetch-failure count.
    pub fn prime(&self) -> Result<Option<Ingested>> {
        let Some(guard) = self.begin() else {
            return Ok(None);
        };

        let raw = match self.collaborators.fetcher.fetch(self.settings.fetch_limit) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Could not seed watermarks, first tick will fan out");
                return Ok(None);
            }
        };

        guard.advance(DispatchState::Tracking);
        let posts = self.collaborators.mapper.map_all(&raw);
        let seeded = self.tracker.ingest(&posts)?;
        for (category, post) in seeded.iter() {
            tracing::info!(category = %category, post = %post.id(), "Seeded watermark");
        }
        Ok(Some(seeded))
    }

    fn begin(&self) -> Option<CycleGuard<'_>> {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if DispatchState::from_u8(current).is_busy() {
                return None;
            }
            match self.state.compare_exchange(
                current,
                DispatchState::Fetching as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Some(CycleGuard {
                        state: &self.state,
                        rest: DispatchState::Idle,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Deliver to all recipients on a bounded worker pool. Outcomes come
    /// back in recipient order.
    fn fan_out(&self, message: &OutboundMessage, recipients: &[Subscriber]) -> Vec<RecipientOutcome> {
        if recipients.is_empty() {
            return Vec::new();
        }

        let workers = self.settings.concurrency.min(recipients.len());
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, SubscriberId)>();
        let (result_tx, result_rx) =
            crossbeam_channel::unbounded::<(usize, SubscriberId, std::result::Result<(), DeliveryError>)>();

        for (idx, subscriber) in recipients.iter().enumerate() {
            if job_tx.send((idx, subscriber.id)).is_err() {
                break;
            }
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (idx, id) in job_rx.iter() {
                        let result = self.attempt(message, id);
                        if result_tx.send((idx, id, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut outcomes: Vec<Option<RecipientOutcome>> = (0..recipients.len()).map(|_| None).collect();
            for (idx, id, result) in result_rx.iter() {
                outcomes[idx] = Some(self.reconcile(id, result));
            }
            outcomes.into_iter().flatten().collect()
        })
    }

    /// One delivery attempt. A panicking transport counts as a transient
    /// failure.
    fn attempt(
        &self,
        message: &OutboundMessage,
        id: SubscriberId,
    ) -> std::result::Result<(), DeliveryError> {
        let transport = &self.collaborators.transport;
        match std::panic::catch_unwind(AssertUnwindSafe(|| transport.deliver(message, id))) {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(subscriber = %id, "Transport panicked during delivery");
                Err(DeliveryError::Other("transport panicked".into()))
            }
        }
    }

    /// Apply the registry consequence of a delivery result.
    fn reconcile(
        &self,
        id: SubscriberId,
        result: std::result::Result<(), DeliveryError>,
    ) -> RecipientOutcome {
        let action = DeliveryAction::classify(&result);
        let mut removed = false;

        match (&result, action) {
            (Ok(()), _) => {}
            (Err(e), DeliveryAction::Remove) => {
                tracing::warn!(subscriber = %id, error = %e, "Permanent delivery failure, removing subscriber");
                match self.registry.remove(id) {
                    Ok(_) => removed = true,
                    Err(store_err) => {
                        tracing::error!(subscriber = %id, error = %store_err, "Failed to remove subscriber");
                    }
                }
            }
            (Err(e @ DeliveryError::BadRequest(_)), DeliveryAction::Keep) => {
                tracing::warn!(subscriber = %id, error = %e, "Delivery rejected as malformed");
            }
            (Err(e), DeliveryAction::Keep) => {
                tracing::warn!(subscriber = %id, error = %e, "Delivery failed");
            }
        }

        RecipientOutcome {
            subscriber: id,
            result,
            action,
            removed,
        }
    }
}

fn log_fanout(category: &str, outcomes: &[RecipientOutcome]) {
    let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
    let removed = outcomes.iter().filter(|o| o.removed).count();
    tracing::info!(
        category,
        delivered,
        failed = outcomes.len() - delivered,
        removed,
        "Fan-out finished"
    );
}
