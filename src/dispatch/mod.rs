//! Dispatch loop.
//!
//! One cycle walks `Idle -> Fetching -> Tracking -> Fanout -> Idle`:
//! - fetch raw posts from the [`FeedFetcher`](crate::feed::FeedFetcher)
//! - advance watermarks through the [`PostTracker`](crate::tracker::PostTracker)
//! - deliver each fired category to the interested, active subscribers
//! - remove subscribers whose delivery failed permanently
//!
//! A failed fetch leaves the dispatcher `Suspended` with no state changed.

mod dispatcher;
mod driver;
mod types;

pub use dispatcher::{Collaborators, DispatchSettings, DispatchState, Dispatcher};
pub use driver::PeriodicDriver;
pub use types::{
    CategoryReport, CycleReport, CycleStatus, DeliveryAction, OutboundMessage, PlainRenderer,
    RecipientOutcome, Renderer, Transport,
};
