//! Performance benchmarks for the dispatch engine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use feedwatch::{
    AnnouncementBody, Category, Collaborators, DeliveryError, Engine, EngineConfig, FeedFetcher,
    FeedMapper, FeedPage, FetchError, FileSnapshotStore, MemorySnapshotStore, OutboundMessage,
    PlainRenderer, PostTracker, RawPost, SubscriberId, SubscriberRegistry, Timestamp, Transport,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn raw_posts(count: usize, offset: u64) -> Vec<RawPost> {
    (0..count)
        .map(|i| RawPost {
            gid: format!("{}", offset + i as u64),
            event_type: if i % 4 == 0 { 13 } else { 28 },
            appid: 730,
            announcement_body: AnnouncementBody {
                headline: format!("Announcement {}", i),
                posttime: offset + i as u64,
                body: "x".repeat(512),
                ..Default::default()
            },
        })
        .collect()
}

/// Feed that publishes one fresh batch per fetch.
struct AdvancingFeed {
    next: AtomicU64,
}

impl FeedFetcher for AdvancingFeed {
    fn fetch(&self, limit: usize) -> Result<Vec<RawPost>, FetchError> {
        let offset = self.next.fetch_add(limit as u64, Ordering::SeqCst);
        Ok(raw_posts(limit, offset))
    }
}

struct NullTransport;

impl Transport for NullTransport {
    fn deliver(&self, message: &OutboundMessage, destination: SubscriberId) -> Result<(), DeliveryError> {
        black_box((message, destination));
        Ok(())
    }
}

/// Benchmark watermark ingestion with varying batch sizes
fn bench_ingest(c: &mut Criterion) {
    let mapper = FeedMapper::default();
    let mut group = c.benchmark_group("ingest");

    for batch_size in [10, 100, 1000] {
        let posts = mapper.map_all(&raw_posts(batch_size, 0));
        group.bench_with_input(BenchmarkId::new("batch_size", batch_size), &posts, |b, posts| {
            b.iter(|| {
                let tracker =
                    PostTracker::load(Arc::new(MemorySnapshotStore::new()), Timestamp(0)).unwrap();
                black_box(tracker.ingest(posts).unwrap())
            });
        });
    }

    group.finish();
}

/// Benchmark recipient listing on large registries
fn bench_list_recipients(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_active_interested_in");

    for count in [100, 1000, 5000] {
        let registry = SubscriberRegistry::load(Arc::new(MemorySnapshotStore::new())).unwrap();
        for i in 0..count {
            let id = SubscriberId(i);
            registry.create_and_register(id).unwrap();
            registry.set_running(id, i % 3 != 0).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("subscribers", count), &registry, |b, registry| {
            b.iter(|| black_box(registry.list_active_interested_in(Category::News)));
        });
    }

    group.finish();
}

/// Benchmark feed page parsing
fn bench_feed_parse(c: &mut Criterion) {
    let page = serde_json::json!({ "events": raw_posts(100, 0) });
    let bytes = serde_json::to_vec(&page).unwrap();

    c.bench_function("feed_page_100_events", |b| {
        b.iter(|| black_box(FeedPage::from_json(&bytes).unwrap()))
    });
}

/// Benchmark full cycles with file-backed persistence
fn bench_dispatch_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_cycle");
    group.sample_size(20);

    for subscribers in [10, 100, 1000] {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileSnapshotStore::open(dir.path().join("data")).unwrap());
        let engine = Engine::with_store(
            EngineConfig {
                fetch_limit: 20,
                ..Default::default()
            },
            store,
            Collaborators {
                fetcher: Arc::new(AdvancingFeed {
                    next: AtomicU64::new(1),
                }),
                renderer: Arc::new(PlainRenderer),
                transport: Arc::new(NullTransport),
                mapper: FeedMapper::default(),
            },
        )
        .unwrap();
        for i in 0..subscribers {
            engine.registry().create_and_register(SubscriberId(i)).unwrap();
            engine.registry().set_running(SubscriberId(i), true).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("subscribers", subscribers), &engine, |b, engine| {
            b.iter(|| black_box(engine.run_cycle()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ingest,
    bench_list_recipients,
    bench_feed_parse,
    bench_dispatch_cycle,
);
criterion_main!(benches);
