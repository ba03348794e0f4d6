use serde_json::json;
use tracing::{info, warn};

/// Fire-and-forget failure notifications; delivery must never block or fail
/// the request path.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: String);
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _text: String) {}
}

/// Posts failure summaries to the configured Feishu and Matrix webhooks.
pub struct WebhookNotifier {
    client: wreq::Client,
    feishu: Option<String>,
    matrix: Option<String>,
}

impl WebhookNotifier {
    pub fn from_env() -> Result<Self, wreq::Error> {
        let feishu = std::env::var("FEISHU_WEBHOOK").ok().filter(|v| !v.is_empty());
        let matrix = std::env::var("MATRIX_API").ok().filter(|v| !v.is_empty());
        if feishu.is_none() {
            info!(event = "notify_channel_off", channel = "feishu", "FEISHU_WEBHOOK not set");
        }
        if matrix.is_none() {
            info!(event = "notify_channel_off", channel = "matrix", "MATRIX_API not set");
        }
        Ok(Self {
            client: wreq::Client::builder().build()?,
            feishu,
            matrix,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, text: String) {
        if let Some(url) = self.feishu.clone() {
            let payload = json!({"msg_type": "text", "content": {"text": text}}).to_string();
            post_detached(self.client.clone(), url, payload, "feishu");
        }
        if let Some(url) = self.matrix.clone() {
            let payload = json!({"message": "m.text", "body": text}).to_string();
            post_detached(self.client.clone(), url, payload, "matrix");
        }
    }
}

fn post_detached(client: wreq::Client, url: String, payload: String, channel: &'static str) {
    tokio::spawn(async move {
        let result = client
            .post(&url)
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await;
        if let Err(err) = result {
            warn!(event = "notify_failed", channel = channel, error = %err);
        }
    });
}
