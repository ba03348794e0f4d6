use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One SSE chunk of a streaming chat completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatChunk {
    /// A delta chunk carrying assistant text.
    pub fn delta(model: &str, index: i64, content: String) -> Self {
        Self {
            id: String::new(),
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index,
                delta: ChunkDelta {
                    role: Some("assistant".to_string()),
                    content,
                },
                finish_reason: None,
            }],
        }
    }

    /// The terminal chunk closing a stream.
    pub fn stop(model: &str, index: i64) -> Self {
        Self {
            id: String::new(),
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index,
                delta: ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: String::new(),
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_delta_only_chunk() {
        let chunk: ChatChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"he"}}]}"#).unwrap();
        assert_eq!(chunk.choices[0].delta.content, "he");
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn stop_chunk_carries_finish_reason() {
        let encoded = serde_json::to_string(&ChatChunk::stop("m", 2)).unwrap();
        assert!(encoded.contains(r#""finish_reason":"stop""#));
        assert!(encoded.contains(r#""content":"""#));
    }
}
