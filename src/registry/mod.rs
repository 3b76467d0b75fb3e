//! Subscriber registry.
//!
//! In-memory index over [`Subscriber`](crate::types::Subscriber) records
//! with write-through persistence: every mutation saves the full collection
//! to the snapshot store before returning.

mod manager;

pub use manager::SubscriberRegistry;
