//! HTTP transport: POST the rendered payload to the subscription endpoint.

use std::time::Duration;

use async_trait::async_trait;
use panepush_core::types::NotificationSubscription;
use panepush_dispatch::{DeliveryError, PushTransport};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct WebhookTransport {
    agent: ureq::Agent,
}

impl WebhookTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for WebhookTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

fn classify(err: ureq::Error) -> DeliveryError {
    match err {
        ureq::Error::StatusCode(code) => DeliveryError::status(code, format!("HTTP {code}")),
        other => DeliveryError::network(other.to_string()),
    }
}

#[async_trait]
impl PushTransport for WebhookTransport {
    async fn send(
        &self,
        subscription: &NotificationSubscription,
        payload_json: &str,
    ) -> Result<(), DeliveryError> {
        let agent = self.agent.clone();
        let endpoint = subscription.endpoint.clone();
        let body = payload_json.to_owned();

        // ureq is synchronous.
        tokio::task::spawn_blocking(move || {
            agent
                .post(&endpoint)
                .header("Content-Type", "application/json")
                .send(body)
                .map(|_| ())
                .map_err(classify)
        })
        .await
        .map_err(|e| DeliveryError::network(format!("delivery task failed: {e}")))?
    }
}
