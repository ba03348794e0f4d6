use serde::{Deserialize, Serialize};

/// The two fields the gateway needs from an inbound chat body. Everything
/// else is forwarded verbatim, so parse failure is non-fatal and unknown
/// fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequestProbe {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequestProbe {
    pub fn sniff(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// The subset of a Chat Completions request the Replicate adapter
/// translates. Sampling knobs are optional so absent values keep the
/// adapter's defaults instead of collapsing to zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
}
