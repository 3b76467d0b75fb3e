//! # Feedwatch
//!
//! A notification dispatch engine: polls an announcement feed, detects
//! posts newer than the last seen one per category, and fans them out to
//! the subscribers that asked for them.
//!
//! ## Core Concepts
//!
//! - **Posts**: Feed items classified as news, update or external
//! - **Watermarks**: The newest seen post per category, persisted
//! - **Subscribers**: Chats with running/banned flags and interests
//! - **Dispatch**: Fetch, track, fan out, prune unreachable recipients
//!
//! ## Example
//!
//! ```ignore
//! use feedwatch::{Collaborators, Engine, EngineConfig, FeedMapper, PlainRenderer, SubscriberId};
//!
//! let engine = Engine::initialize(
//!     EngineConfig {
//!         data_dir: "./feedwatch-data".into(),
//!         ..Default::default()
//!     },
//!     Collaborators {
//!         fetcher: Arc::new(my_fetcher),
//!         renderer: Arc::new(PlainRenderer),
//!         transport: Arc::new(my_transport),
//!         mapper: FeedMapper::default(),
//!     },
//! )?;
//!
//! engine.start(SubscriberId(42), 42)?;
//! engine.start_polling()?;
//! // ...
//! engine.shutdown()?;
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod feed;
pub mod guard;
pub mod registry;
pub mod snapshot;
pub mod tracker;
pub mod types;

// Re-exports
pub use config::{EngineConfig, GuardConfig};
pub use dispatch::{
    CategoryReport, Collaborators, CycleReport, CycleStatus, DeliveryAction, DispatchSettings,
    DispatchState, Dispatcher, OutboundMessage, PeriodicDriver, PlainRenderer, RecipientOutcome,
    Renderer, Transport,
};
pub use engine::{ChatKind, Engine, MembershipOutcome, StartOutcome, StopOutcome};
pub use error::{DeliveryError, EngineError, FetchError, Result};
pub use feed::{AnnouncementBody, EventType, FeedFetcher, FeedMapper, FeedPage, RawPost};
pub use guard::AbuseGuard;
pub use registry::SubscriberRegistry;
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, Watermarks};
pub use tracker::{Ingested, PostTracker};
pub use types::*;
