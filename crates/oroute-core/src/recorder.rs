use std::time::Instant;

use tracing::debug;

use oroute_common::{RequestRecord, MAX_RECORDED_BODY_BYTES};
use oroute_protocol::openai::{ChatChunk, ChatResponse};

/// Fill `record.response` from the (teed) response body, according to the
/// content type the upstream declared.
pub fn apply_body(record: &mut RequestRecord, content_type: &str, body: &[u8]) {
    if content_type.starts_with("text/event-stream") {
        record.response = extract_sse(body);
    } else if content_type.starts_with("application/json") {
        record.response = extract_json(body);
    } else if content_type.starts_with("text") {
        record.response = String::from_utf8_lossy(body).to_string();
    } else {
        debug!(event = "record_skip_body", content_type = %content_type, "no response extraction for content type");
    }
}

/// Final bookkeeping before the record goes to the audit sink.
pub fn seal(record: &mut RequestRecord, started: Instant) {
    record.elapsed_ms = started.elapsed().as_millis() as i64;
    if record.body.len() > MAX_RECORDED_BODY_BYTES {
        record.body.clear();
    }
}

/// Concatenate `choices[0].delta.content` across every well-formed chunk.
/// Blank lines, `[DONE]` and anything else that is not a JSON chunk are
/// skipped.
fn extract_sse(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut out = String::new();
    for line in text.split('\n') {
        let line = line.trim();
        let line = line.strip_prefix("data:").unwrap_or(line).trim();
        if line.is_empty() {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<ChatChunk>(line) else {
            continue;
        };
        if let Some(choice) = chunk.choices.first() {
            out.push_str(&choice.delta.content);
        }
    }
    out
}

fn extract_json(body: &[u8]) -> String {
    if let Ok(response) = serde_json::from_slice::<ChatResponse>(body)
        && let Some(choice) = response.choices.first()
        && !choice.message.content.is_empty()
    {
        return choice.message.content.clone();
    }

    let mut raw = String::from_utf8_lossy(body).to_string();
    if raw.len() > MAX_RECORDED_BODY_BYTES {
        let mut cut = MAX_RECORDED_BODY_BYTES;
        while !raw.is_char_boundary(cut) {
            cut -= 1;
        }
        raw.truncate(cut);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RequestRecord {
        RequestRecord::new("host".to_string(), "127.0.0.1".to_string())
    }

    #[test]
    fn json_body_yields_first_choice_content() {
        let mut record = record();
        apply_body(
            &mut record,
            "application/json",
            br#"{"model":"gpt-4","choices":[{"message":{"role":"assistant","content":"hello"}}]}"#,
        );
        assert_eq!(record.response, "hello");
    }

    #[test]
    fn undecodable_json_stores_raw_body() {
        let mut record = record();
        apply_body(&mut record, "application/json", br#"{"not":"a completion"}"#);
        assert_eq!(record.response, r#"{"not":"a completion"}"#);
    }

    #[test]
    fn sse_chunks_concatenate() {
        let mut record = record();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"he\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        apply_body(&mut record, "text/event-stream", body.as_bytes());
        assert_eq!(record.response, "hello");
    }

    #[test]
    fn sse_ignores_non_json_lines_and_empty_choices() {
        let mut record = record();
        let body = concat!(
            ": comment\n",
            "data: {\"choices\":[]}\n",
            "garbage line\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        apply_body(&mut record, "text/event-stream", body.as_bytes());
        assert_eq!(record.response, "ok");
    }

    #[test]
    fn plain_text_stored_verbatim() {
        let mut record = record();
        apply_body(&mut record, "text/plain; charset=utf-8", b"oops");
        assert_eq!(record.response, "oops");
    }

    #[test]
    fn unknown_content_type_leaves_response_empty() {
        let mut record = record();
        apply_body(&mut record, "application/octet-stream", b"\x00\x01");
        assert_eq!(record.response, "");
    }

    #[test]
    fn seal_clears_oversized_request_body() {
        let mut rec = record();
        rec.body = "x".repeat(MAX_RECORDED_BODY_BYTES + 1);
        seal(&mut rec, Instant::now());
        assert!(rec.body.is_empty());
        let mut rec2 = record();
        rec2.body = "small".to_string();
        seal(&mut rec2, Instant::now());
        assert_eq!(rec2.body, "small");
    }
}
