//! Error handling and edge case tests.

use feedwatch::{
    Category, Collaborators, CycleStatus, DeliveryError, DispatchState, Engine, EngineConfig,
    EngineError, FeedFetcher, FeedMapper, FetchError, GuardConfig, MemorySnapshotStore,
    MembershipOutcome, OutboundMessage, PlainRenderer, RawPost, SubscriberId, Transport,
};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Feed that fails until told otherwise.
#[derive(Default)]
struct FlakyFeed {
    healthy: AtomicBool,
}

impl FeedFetcher for FlakyFeed {
    fn fetch(&self, _limit: usize) -> Result<Vec<RawPost>, FetchError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(Vec::new())
        } else {
            Err(FetchError::Network("connection refused".into()))
        }
    }
}

struct NullTransport;

impl Transport for NullTransport {
    fn deliver(&self, _message: &OutboundMessage, _destination: SubscriberId) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn collaborators(feed: Arc<FlakyFeed>) -> Collaborators {
    Collaborators {
        fetcher: feed,
        renderer: Arc::new(PlainRenderer),
        transport: Arc::new(NullTransport),
        mapper: FeedMapper::default(),
    }
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        data_dir: dir.path().join("data"),
        ..Default::default()
    }
}

fn memory_engine() -> Engine {
    Engine::with_store(
        EngineConfig::default(),
        Arc::new(MemorySnapshotStore::new()),
        collaborators(Arc::new(FlakyFeed::default())),
    )
    .unwrap()
}

// --- Configuration Errors ---

#[test]
fn test_zero_fetch_limit_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Engine::initialize(
        EngineConfig {
            fetch_limit: 0,
            ..config(&dir)
        },
        collaborators(Arc::new(FlakyFeed::default())),
    );

    assert!(matches!(result, Err(EngineError::InvalidFetchLimit(0))));
}

#[test]
fn test_invalid_guard_config_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Engine::initialize(
        EngineConfig {
            guard: GuardConfig {
                max_attempts: 0,
                ..Default::default()
            },
            ..config(&dir)
        },
        collaborators(Arc::new(FlakyFeed::default())),
    );

    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_config_file_with_bad_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let result = EngineConfig::from_json_file(&path);
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_config_file_partial_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"poll_interval_secs": 5, "guard": {"max_attempts": 2}}"#).unwrap();

    let config = EngineConfig::from_json_file(&path).unwrap();
    assert_eq!(config.poll_interval_secs, 5);
    assert_eq!(config.fetch_limit, 100);
    assert_eq!(config.guard.max_attempts, 2);
    assert_eq!(config.guard.window_secs, 60);
}

// --- Snapshot Store Errors ---

#[test]
fn test_data_dir_locked_by_second_engine() {
    let dir = TempDir::new().unwrap();
    let _first =
        Engine::initialize(config(&dir), collaborators(Arc::new(FlakyFeed::default()))).unwrap();

    let second = Engine::initialize(config(&dir), collaborators(Arc::new(FlakyFeed::default())));
    assert!(matches!(second, Err(EngineError::Locked)));
}

#[test]
fn test_corrupted_subscriber_snapshot() {
    let dir = TempDir::new().unwrap();
    {
        let engine =
            Engine::initialize(config(&dir), collaborators(Arc::new(FlakyFeed::default())))
                .unwrap();
        engine.start(SubscriberId(1), 1).unwrap();
    }

    let snap = dir.path().join("data").join("subscribers.snap");
    let mut bytes = fs::read(&snap).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&snap, bytes).unwrap();

    let result = Engine::initialize(config(&dir), collaborators(Arc::new(FlakyFeed::default())));
    assert!(matches!(result, Err(EngineError::ChecksumMismatch { .. })));
}

#[test]
fn test_foreign_manifest_rejected() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("MANIFEST"), b"NOPE\x01").unwrap();

    let result = Engine::initialize(config(&dir), collaborators(Arc::new(FlakyFeed::default())));
    assert!(matches!(result, Err(EngineError::InvalidFormat(_))));
}

#[test]
fn test_empty_snapshot_files_load_empty() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("subscribers.snap"), b"").unwrap();
    fs::write(data.join("watermarks.snap"), b"").unwrap();

    let engine =
        Engine::initialize(config(&dir), collaborators(Arc::new(FlakyFeed::default()))).unwrap();
    assert!(engine.registry().is_empty());
    assert!(engine.latest().is_none());
}

// --- Registry Errors ---

#[test]
fn test_mutating_unknown_subscriber() {
    let engine = memory_engine();

    let result = engine.toggle_interest(SubscriberId(404), Category::News);
    assert!(matches!(result, Err(EngineError::SubscriberNotFound(SubscriberId(404)))));

    let result = engine.registry().set_running(SubscriberId(404), true);
    assert!(matches!(result, Err(EngineError::SubscriberNotFound(_))));
}

#[test]
fn test_duplicate_registration() {
    let engine = memory_engine();
    engine.registry().create_and_register(SubscriberId(1)).unwrap();

    let result = engine.registry().create_and_register(SubscriberId(1));
    assert!(matches!(result, Err(EngineError::SubscriberExists(_))));
    assert_eq!(engine.registry().len(), 1);
}

#[test]
fn test_external_interest_not_settable() {
    let engine = memory_engine();
    engine.start(SubscriberId(1), 1).unwrap();

    let result = engine.set_interest(SubscriberId(1), Category::External, true);
    assert!(matches!(result, Err(EngineError::NotDispatched(Category::External))));
}

#[test]
fn test_remove_is_idempotent() {
    let engine = memory_engine();
    engine.start(SubscriberId(1), 1).unwrap();

    assert!(engine.registry().remove(SubscriberId(1)).unwrap());
    assert!(!engine.registry().remove(SubscriberId(1)).unwrap());
    assert_eq!(
        engine.member_left(SubscriberId(1)).unwrap(),
        MembershipOutcome::NotRegistered
    );
}

// --- Fetch Errors ---

#[test]
fn test_startup_seed_survives_fetch_failure() {
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = Engine::with_store(
        EngineConfig::default(),
        store.clone(),
        collaborators(Arc::new(FlakyFeed::default())),
    )
    .unwrap();

    assert!(engine.latest().is_none());
    assert_eq!(engine.dispatcher().state(), DispatchState::Idle);
    assert_eq!(engine.dispatcher().consecutive_fetch_failures(), 0);
    assert_eq!(store.watermark_saves(), 0);
}

#[test]
fn test_fetch_failure_suspends_then_recovers() {
    let feed = Arc::new(FlakyFeed::default());
    let store = Arc::new(MemorySnapshotStore::new());
    let engine =
        Engine::with_store(EngineConfig::default(), store.clone(), collaborators(feed.clone()))
            .unwrap();
    engine.start(SubscriberId(1), 1).unwrap();
    let saves = store.subscriber_saves();

    let report = engine.run_cycle();
    assert!(matches!(report.status, CycleStatus::FetchFailed(FetchError::Network(_))));
    assert_eq!(engine.dispatcher().state(), DispatchState::Suspended);
    assert_eq!(engine.dispatcher().consecutive_fetch_failures(), 1);
    assert_eq!(store.subscriber_saves(), saves);
    assert_eq!(store.watermark_saves(), 0);

    engine.run_cycle();
    assert_eq!(engine.dispatcher().consecutive_fetch_failures(), 2);

    feed.healthy.store(true, Ordering::SeqCst);
    let report = engine.run_cycle();
    assert_eq!(report.status, CycleStatus::Completed);
    assert_eq!(engine.dispatcher().state(), DispatchState::Idle);
    assert_eq!(engine.dispatcher().consecutive_fetch_failures(), 0);
}
