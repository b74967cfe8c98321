//! Outbound webhook for user-sent messages.
//!
//! Every message a signed-in user posts is handed to the automation behind
//! the webhook before it is stored. The automation's reply comes back later
//! through the secret-authenticated ingestion route.

use std::time::Duration;

use thiserror::Error;
use threadrelay_proto::ThreadId;

/// Header naming the thread the forwarded message belongs to.
pub const SESSION_KEY_HEADER: &str = "Session-Key";

/// Errors from [`MessageWebhook`].
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Configured URL could not be parsed.
    #[error("invalid webhook url: {0}")]
    InvalidUrl(String),

    /// Request could not be built, sent, or timed out.
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Webhook answered with a non-success status.
    #[error("webhook answered {0}")]
    Status(reqwest::StatusCode),
}

/// Client for the send-message webhook.
#[derive(Debug, Clone)]
pub struct MessageWebhook {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl MessageWebhook {
    /// Request timeout used by [`MessageWebhook::new`].
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Build a client for `url`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, WebhookError> {
        let url = reqwest::Url::parse(url).map_err(|e| WebhookError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Forward `content` for `thread_id`. Succeeds only on a 2xx answer.
    pub async fn forward(&self, thread_id: &ThreadId, content: &str) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(SESSION_KEY_HEADER, thread_id.as_str())
            .json(&serde_json::json!({ "message": content }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status));
        }

        tracing::debug!(thread_id = %thread_id, %status, "message forwarded to webhook");
        Ok(())
    }
}
