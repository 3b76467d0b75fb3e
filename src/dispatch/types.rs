//! Dispatch collaborators and cycle reports.

use crate::error::{DeliveryError, FetchError};
use crate::types::{Category, Post, SubscriberId};
use std::time::Duration;

/// A rendered message ready for a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub category: Category,
    pub post_id: String,
    pub text: String,
    pub link: Option<String>,
}

/// Builds outbound messages. Must be pure.
pub trait Renderer: Send + Sync {
    fn render(&self, post: &Post) -> OutboundMessage;
}

/// Minimal renderer: headline, then link.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, post: &Post) -> OutboundMessage {
        let label = match post.category() {
            Category::News => "News",
            Category::Update => "Update",
            Category::External => "External",
        };
        OutboundMessage {
            category: post.category(),
            post_id: post.id().to_string(),
            text: format!("[{}] {}\n\n{}", label, post.title(), post.url()),
            link: Some(post.url().to_string()).filter(|u| !u.is_empty()),
        }
    }
}

/// Delivers messages to a destination.
pub trait Transport: Send + Sync {
    fn deliver(&self, message: &OutboundMessage, destination: SubscriberId) -> Result<(), DeliveryError>;
}

/// Registry consequence of a delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryAction {
    Keep,
    Remove,
}

impl DeliveryAction {
    /// Classify a transport result.
    pub fn classify(result: &Result<(), DeliveryError>) -> Self {
        match result {
            Err(e) if e.is_permanent() => DeliveryAction::Remove,
            _ => DeliveryAction::Keep,
        }
    }
}

/// What happened to one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub subscriber: SubscriberId,
    pub result: Result<(), DeliveryError>,
    pub action: DeliveryAction,
    /// True once the registry removal went through.
    pub removed: bool,
}

impl RecipientOutcome {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Fan-out of one fired category.
#[derive(Clone, Debug)]
pub struct CategoryReport {
    pub category: Category,
    pub post: Post,
    pub outcomes: Vec<RecipientOutcome>,
}

/// How a cycle ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleStatus {
    /// Another cycle was in flight; nothing happened.
    Skipped,
    /// The fetch failed; no state changed.
    FetchFailed(FetchError),
    /// Watermarks could not be persisted; nothing was delivered.
    TrackingFailed(String),
    Completed,
}

/// Result of one dispatch cycle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub fired: Vec<CategoryReport>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub(crate) fn without_fanout(status: CycleStatus, elapsed: Duration) -> Self {
        Self {
            status,
            fired: Vec::new(),
            elapsed,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == CycleStatus::Skipped
    }

    pub fn fired_categories(&self) -> Vec<Category> {
        self.fired.iter().map(|r| r.category).collect()
    }

    /// Every recipient outcome of the cycle.
    pub fn outcomes(&self) -> impl Iterator<Item = &RecipientOutcome> {
        self.fired.iter().flat_map(|r| r.outcomes.iter())
    }

    /// Subscribers removed during the cycle.
    pub fn removed(&self) -> Vec<SubscriberId> {
        self.outcomes()
            .filter(|o| o.removed)
            .map(|o| o.subscriber)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_support::post;

    #[test]
    fn test_classification() {
        assert_eq!(DeliveryAction::classify(&Ok(())), DeliveryAction::Keep);
        assert_eq!(
            DeliveryAction::classify(&Err(DeliveryError::Unreachable("chat not found".into()))),
            DeliveryAction::Remove
        );
        assert_eq!(
            DeliveryAction::classify(&Err(DeliveryError::Forbidden("blocked".into()))),
            DeliveryAction::Remove
        );
        assert_eq!(
            DeliveryAction::classify(&Err(DeliveryError::BadRequest("bad".into()))),
            DeliveryAction::Keep
        );
        assert_eq!(
            DeliveryAction::classify(&Err(DeliveryError::Other("timeout".into()))),
            DeliveryAction::Keep
        );
    }

    #[test]
    fn test_plain_renderer() {
        let msg = PlainRenderer.render(&post("42", 1, &["patchnotes"]));
        assert_eq!(msg.category, Category::Update);
        assert_eq!(msg.post_id, "42");
        assert!(msg.text.starts_with("[Update] Post 42"));
        assert_eq!(msg.link.as_deref(), Some("https://example.com/42"));
    }
}
