use crate::domain::jobs::ProgressEvent;
use crate::ports::notifier::ProgressNotifier;
use crate::ports::PortError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Forwards progress events to an external pub/sub service over HTTP.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ProgressNotifier for WebhookNotifier {
    async fn publish(&self, event: &ProgressEvent) -> Result<(), PortError> {
        let body = json!({
            "channel": event.channel,
            "event": event.event,
            "data": event.data(),
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
