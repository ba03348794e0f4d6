use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::{info, warn};

use oroute_common::{RequestRecord, Upstream};
use oroute_protocol::openai::{ChatChoice, ChatChunk, ChatMessage, ChatRequest, ChatResponse, ChatUsage};
use oroute_protocol::replicate::{
    Prediction, PredictionInput, PredictionRequest, PREDICTIONS_URL_BASE,
};
use oroute_protocol::sse::{data_frame, SseParser};

use super::{ProxyOutcome, RequestContext};
use crate::cors;
use crate::error::ProxyFailure;
use crate::upstream_client::{collect, UpstreamClient, UpstreamHttpRequest};

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Re-express an OpenAI chat request as a Replicate model prediction:
/// submit, then either follow the prediction's SSE stream or poll its get
/// URL, re-emitting OpenAI-shaped output either way.
pub(super) async fn forward(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    ctx: &RequestContext,
    record: &mut RequestRecord,
) -> Result<ProxyOutcome, ProxyFailure> {
    let chat: ChatRequest = serde_json::from_slice(&ctx.body)
        .map_err(|err| ProxyFailure::Invalid(format!("failed to parse chat request: {err}")))?;

    let mut input = PredictionInput {
        prompt: render_prompt(&chat.messages),
        ..PredictionInput::default()
    };
    if let Some(temperature) = chat.temperature {
        input.temperature = temperature;
    }
    if let Some(frequency_penalty) = chat.frequency_penalty {
        input.frequency_penalty = frequency_penalty;
    }
    if let Some(presence_penalty) = chat.presence_penalty {
        input.presence_penalty = presence_penalty;
    }
    let request = PredictionRequest {
        stream: chat.stream,
        input,
    };
    let payload = serde_json::to_vec(&request)
        .map_err(|err| ProxyFailure::Invalid(format!("failed to encode prediction: {err}")))?;

    let url = format!("{PREDICTIONS_URL_BASE}/{}/predictions", chat.model);
    info!(
        event = "replicate_submit",
        endpoint = %upstream.endpoint,
        model = %chat.model,
        is_stream = chat.stream
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(AUTHORIZATION, token_header(upstream)?);

    let timeout_secs = if chat.stream {
        upstream.stream_timeout
    } else {
        upstream.timeout
    };
    let send = client.send(UpstreamHttpRequest {
        method: Method::POST,
        url,
        headers,
        body: Some(Bytes::from(payload)),
    });
    let mut response = match tokio::time::timeout(Duration::from_secs(timeout_secs), send).await {
        Ok(Ok(response)) => response,
        Ok(Err(failure)) => return Err(failure.into()),
        Err(_) => return Err(ProxyFailure::Timeout),
    };
    record.response_time_ms = ctx.started.elapsed().as_millis() as i64;

    let body = collect(&mut response.body).await;
    if !response.status.is_success() {
        warn!(
            event = "replicate_submit_failed",
            endpoint = %upstream.endpoint,
            status = %response.status.as_u16(),
            body = %String::from_utf8_lossy(&body)
        );
        return Err(ProxyFailure::UpstreamStatus {
            status: response.status,
            headers: response.headers,
            body,
        });
    }
    let prediction: Prediction = serde_json::from_slice(&body)
        .map_err(|err| ProxyFailure::Read(format!("failed to parse prediction: {err}")))?;

    if chat.stream {
        stream_prediction(client, upstream, prediction, record).await
    } else {
        poll_prediction(client, upstream, prediction, record).await
    }
}

/// Follow the prediction's SSE endpoint and translate every `output` event
/// into an OpenAI chat chunk, closing with a `finish_reason: stop` chunk.
async fn stream_prediction(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    prediction: Prediction,
    record: &mut RequestRecord,
) -> Result<ProxyOutcome, ProxyFailure> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, token_header(upstream)?);
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    let mut response = client
        .send(UpstreamHttpRequest {
            method: Method::GET,
            url: prediction.urls.stream.clone(),
            headers,
            body: None,
        })
        .await
        .map_err(ProxyFailure::from)?;
    if !response.status.is_success() {
        let body = collect(&mut response.body).await;
        return Err(ProxyFailure::UpstreamStatus {
            status: response.status,
            headers: response.headers,
            body,
        });
    }

    let mut upstream_rx = response.body;
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(16);
    let model = prediction.model.clone();
    tokio::spawn(async move {
        let mut parser = SseParser::new();
        let mut index = 0i64;
        'read: while let Some(chunk) = upstream_rx.recv().await {
            for event in parser.push_bytes(&chunk) {
                match event.name.as_deref() {
                    Some("output") => {
                        let Some(frame) = data_frame(&ChatChunk::delta(&model, index, event.data))
                        else {
                            continue;
                        };
                        if tx.send(frame).await.is_err() {
                            return;
                        }
                        index += 1;
                    }
                    Some("done") => break 'read,
                    Some("error") => {
                        warn!(event = "replicate_stream_error", data = %event.data);
                    }
                    _ => {}
                }
            }
        }
        if let Some(frame) = data_frame(&ChatChunk::stop(&model, index)) {
            let _ = tx.send(frame).await;
        }
    });

    record.status = StatusCode::OK.as_u16();
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    cors::apply(&mut headers);
    Ok(ProxyOutcome::Streaming {
        status: StatusCode::OK,
        headers,
        content_type: "text/event-stream".to_string(),
        body: rx,
    })
}

/// Poll the prediction's get URL until it leaves `starting`/`processing`,
/// then assemble a single OpenAI chat completion from its output.
async fn poll_prediction(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    prediction: Prediction,
    record: &mut RequestRecord,
) -> Result<ProxyOutcome, ProxyFailure> {
    let result = loop {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, token_header(upstream)?);
        let mut response = client
            .send(UpstreamHttpRequest {
                method: Method::GET,
                url: prediction.urls.get.clone(),
                headers,
                body: None,
            })
            .await
            .map_err(ProxyFailure::from)?;
        let body = collect(&mut response.body).await;
        if !response.status.is_success() {
            return Err(ProxyFailure::UpstreamStatus {
                status: response.status,
                headers: response.headers,
                body,
            });
        }
        let result: Prediction = serde_json::from_slice(&body)
            .map_err(|err| ProxyFailure::Read(format!("failed to parse prediction result: {err}")))?;
        if result.is_pending() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }
        break result;
    };

    let content = result.output.join("");
    let completion = ChatResponse {
        id: result.id,
        model: result.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: ChatUsage {
            prompt_tokens: result.metrics.input_token_count,
            completion_tokens: result.metrics.output_token_count,
            total_tokens: result.metrics.input_token_count + result.metrics.output_token_count,
        },
    };
    let body = serde_json::to_vec(&completion)
        .map_err(|err| ProxyFailure::Invalid(format!("failed to encode chat response: {err}")))?;

    record.status = StatusCode::OK.as_u16();
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    cors::apply(&mut headers);
    Ok(ProxyOutcome::Buffered {
        status: StatusCode::OK,
        headers,
        content_type: "application/json".to_string(),
        body: Bytes::from(body),
    })
}

fn token_header(upstream: &Upstream) -> Result<HeaderValue, ProxyFailure> {
    HeaderValue::from_str(&format!("Token {}", upstream.secret))
        .map_err(|_| ProxyFailure::Invalid("secret is not a valid header value".to_string()))
}

/// Linearize chat messages into the `<s> [INST] user [/INST] assistant </s>`
/// envelope. System text is carried forward and prepended to the next user
/// message; a trailing user message leaves the final `[INST]` block open for
/// the model to complete.
fn render_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    let mut system = String::new();
    let mut user = String::new();

    for message in messages {
        match message.role.as_str() {
            "system" => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&message.content);
            }
            "user" => {
                if !user.is_empty() {
                    user.push('\n');
                }
                user.push_str(&message.content);
                if !system.is_empty() {
                    user = format!("{system}\n{user}");
                    system.clear();
                }
            }
            "assistant" => {
                if !prompt.is_empty() {
                    prompt.push('\n');
                }
                if user.is_empty() {
                    prompt.push_str(&format!("<s> {} </s>", message.content));
                } else {
                    prompt.push_str(&format!(
                        "<s> [INST] {user} [/INST] {} </s>",
                        message.content
                    ));
                }
                user.clear();
            }
            other => {
                warn!(event = "replicate_unknown_role", role = %other);
            }
        }
    }

    if !user.is_empty() {
        prompt.push_str(&format!("<s> [INST] {user} [/INST] "));
    }
    prompt
}
