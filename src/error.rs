//! Error types for the feed watcher.

use crate::types::{Category, SubscriberId};
use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subscriber already registered: {0}")]
    SubscriberExists(SubscriberId),

    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(SubscriberId),

    #[error("Category is never dispatched: {0}")]
    NotDispatched(Category),

    #[error("Fetch limit must be greater than 0, got {0}")]
    InvalidFetchLimit(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Snapshot store is locked by another process")]
    Locked,

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Deserialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for EngineError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for EngineError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        EngineError::Deserialization(e.to_string())
    }
}

/// Failure of the upstream feed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Fetch limit must be greater than 0, got {0}")]
    InvalidLimit(usize),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not parse feed: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}

/// Classified failure reported by a delivery transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The destination no longer exists (e.g. chat deleted).
    #[error("recipient unreachable: {0}")]
    Unreachable(String),

    /// The recipient blocked or kicked the sender.
    #[error("sender forbidden by recipient: {0}")]
    Forbidden(String),

    /// The request was rejected but the recipient is still valid.
    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl DeliveryError {
    /// Whether the recipient should be dropped from the registry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Unreachable(_) | DeliveryError::Forbidden(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_permanence() {
        assert!(DeliveryError::Unreachable("chat not found".into()).is_permanent());
        assert!(DeliveryError::Forbidden("blocked".into()).is_permanent());
        assert!(!DeliveryError::BadRequest("bad markup".into()).is_permanent());
        assert!(!DeliveryError::Other("timeout".into()).is_permanent());
    }

    #[test]
    fn test_fetch_error_converts() {
        let err: EngineError = FetchError::Network("refused".into()).into();
        assert!(matches!(err, EngineError::Fetch(FetchError::Network(_))));
        assert_eq!(err.to_string(), "Fetch failed: Network error: refused");
    }
}
