//! HTTP sink for typed access events.

use async_trait::async_trait;
use keygate_application::{AccessEvent, EventPublisher};
use tracing::warn;

/// Publishes access events to an HTTP event sink.
///
/// Delivery is fire-and-forget: failures are logged and absorbed so an event
/// sink outage never fails the originating operation.
#[derive(Clone)]
pub struct HttpEventPublisher {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpEventPublisher {
    /// Creates a publisher for one event sink endpoint.
    #[must_use]
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: AccessEvent) {
        let event_type = event.event_type();
        let result = self
            .http_client
            .post(self.endpoint.as_str())
            .header("X-Keygate-Event", event_type)
            .json(&event)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                warn!(
                    event_type,
                    status = response.status().as_u16(),
                    "event sink rejected access event"
                );
            }
            Err(error) => {
                warn!(event_type, error = %error, "failed to deliver access event");
            }
        }
    }
}
