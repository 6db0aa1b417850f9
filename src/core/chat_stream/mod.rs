//! Streaming generation: raw HTTP bytes in, canonical [`StreamEvent`]s out.

mod decoder;

#[cfg(test)]
mod tests;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use decoder::{StreamEvent, StreamNormalizer, MAX_PENDING_LINE_BYTES};

use crate::core::message::{with_thinking_prefix, Usage};
use crate::core::request::PreparedRequest;

pub const STOPPED_TEXT: &str = "Generation stopped.";

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Render an HTTP error body for display: a one-line summary when the body
/// is JSON with a message, followed by the body itself.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

/// How a pumped stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Cancelled,
}

/// Drive `stream` through `normalizer`, handing every event to `emit`.
/// Cancellation is checked before each chunk; once cancelled nothing more is
/// emitted. A transport error ends the stream with `Error` then `Done`, and
/// so does a line longer than the normalizer's limit.
pub async fn pump_stream<S, B, E>(
    stream: S,
    mut normalizer: StreamNormalizer,
    cancel_token: &CancellationToken,
    mut emit: impl FnMut(StreamEvent),
) -> StreamEnd
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return StreamEnd::Cancelled,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                for event in normalizer.push(chunk.as_ref()) {
                    emit(event);
                }
                if normalizer.is_finished() {
                    return StreamEnd::Completed;
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "Stream transport failed");
                emit(StreamEvent::Error(err.to_string()));
                break;
            }
            None => break,
        }
    }
    for event in normalizer.finish() {
        emit(event);
    }
    StreamEnd::Completed
}

/// Everything a spawned stream needs. The request's `Debug` output omits the
/// API key.
#[derive(Debug)]
pub struct StreamParams {
    pub client: reqwest::Client,
    pub request: PreparedRequest,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamEvent, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx_clone = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                request,
                cancel_token,
                stream_id,
            } = params;
            let send = |event: StreamEvent| {
                let _ = tx_clone.send((event, stream_id));
            };

            tokio::select! {
                _ = async {
                    let http_request = client
                        .post(&request.url)
                        .header("Content-Type", "application/json");
                    let http_request = crate::utils::auth::add_auth_headers(
                        http_request,
                        request.kind,
                        &request.api_key,
                    );

                    debug!(stream_id, family = ?request.family, "Opening stream");
                    match http_request.json(&request.body).send().await {
                        Ok(response) => {
                            if !response.status().is_success() {
                                let error_text = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "<no body>".to_string());
                                send(StreamEvent::Error(format_api_error(&error_text)));
                                send(StreamEvent::Done);
                                return;
                            }

                            let normalizer = StreamNormalizer::new(request.family);
                            let end = pump_stream(
                                response.bytes_stream(),
                                normalizer,
                                &cancel_token,
                                send,
                            )
                            .await;
                            debug!(stream_id, end = ?end, "Stream closed");
                        }
                        Err(e) => {
                            send(StreamEvent::Error(format_api_error(&e.to_string())));
                            send(StreamEvent::Done);
                        }
                    }
                } => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, event: StreamEvent, stream_id: u64) {
        let _ = self.tx.send((event, stream_id));
    }
}

/// Folds canonical events into the final assistant turn.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamAccumulator {
    pub text: String,
    pub thinking: String,
    pub usage: Option<Usage>,
    pub error: Option<String>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta(text) => self.text.push_str(text),
            StreamEvent::ThinkingDelta(thinking) => self.thinking.push_str(thinking),
            StreamEvent::UsageUpdate(update) => {
                self.usage.get_or_insert_with(Usage::default).merge(update)
            }
            StreamEvent::Error(message) => {
                self.error = Some(match self.error.take() {
                    Some(previous) => format!("{previous}\n{message}"),
                    None => message.clone(),
                })
            }
            StreamEvent::Done => self.done = true,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Content of the finished turn. Partial text survives cancellation and
    /// errors; an empty turn gets a status line instead.
    pub fn final_content(&self, cancelled: bool) -> String {
        let body = with_thinking_prefix(&self.thinking, &self.text);
        match &self.error {
            Some(error) if body.is_empty() => format!("Error: {error}"),
            Some(error) => format!("{body}\n\nError: {error}"),
            None if cancelled && body.is_empty() => STOPPED_TEXT.to_string(),
            None => body,
        }
    }
}
