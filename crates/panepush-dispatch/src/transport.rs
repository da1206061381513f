//! Delivery transport seam and failure classification.

use async_trait::async_trait;
use panepush_core::types::NotificationSubscription;

/// How the dispatcher reacts to a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Endpoint is gone (404/410). Remove the subscription, no retry.
    Permanent,
    /// 5xx, 429, or no status at all. Retry with backoff.
    Transient,
    /// Any other status. Reported, not retried, subscription kept.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("push delivery failed (status {}): {message}", status_label(.status_code))]
pub struct DeliveryError {
    pub status_code: Option<u16>,
    pub message: String,
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_owned(), |s| s.to_string())
}

impl DeliveryError {
    pub fn status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// Transport-level failure with no HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self.status_code {
            None => FailureKind::Transient,
            Some(404 | 410) => FailureKind::Permanent,
            Some(429) => FailureKind::Transient,
            Some(code) if (500..600).contains(&code) => FailureKind::Transient,
            Some(_) => FailureKind::Rejected,
        }
    }
}

/// Sends one rendered payload to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        subscription: &NotificationSubscription,
        payload_json: &str,
    ) -> Result<(), DeliveryError>;
}
