use serde::{Deserialize, Serialize};

pub const PREDICTIONS_URL_BASE: &str = "https://api.replicate.com/v1/models";

/// Input knobs for a model prediction. Defaults mirror what Replicate's
/// language models expect when the chat request leaves them unset.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub prompt: String,
    pub max_new_tokens: i64,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub prompt_template: String,
}

impl Default for PredictionInput {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            max_new_tokens: 1024,
            temperature: 0.6,
            top_p: 0.9,
            top_k: 50,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            prompt_template: "{prompt}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    pub stream: bool,
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: String,
    #[serde(default)]
    pub stream: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionMetrics {
    #[serde(default)]
    pub input_token_count: i64,
    #[serde(default)]
    pub output_token_count: i64,
}

/// A prediction object, both as returned by the submit call (where `urls`
/// matters) and by the poll endpoint (where `status`/`output` matter).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub urls: PredictionUrls,
    #[serde(default)]
    pub output: Vec<String>,
    #[serde(default)]
    pub metrics: PredictionMetrics,
}

impl Prediction {
    /// The prediction is still being worked on and should be polled again.
    pub fn is_pending(&self) -> bool {
        matches!(self.status.as_str(), "processing" | "starting")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_submit_response() {
        let body = r#"{"id":"p1","model":"meta/llama","urls":{"get":"https://r/get","stream":"https://r/stream"},"status":"starting"}"#;
        let prediction: Prediction = serde_json::from_str(body).unwrap();
        assert_eq!(prediction.urls.stream, "https://r/stream");
        assert!(prediction.is_pending());
    }

    #[test]
    fn decodes_poll_result() {
        let body = r#"{"id":"p1","model":"meta/llama","status":"succeeded","output":["he","llo"],"metrics":{"input_token_count":3,"output_token_count":5}}"#;
        let prediction: Prediction = serde_json::from_str(body).unwrap();
        assert!(!prediction.is_pending());
        assert_eq!(prediction.output.join(""), "hello");
        assert_eq!(prediction.metrics.output_token_count, 5);
    }
}
