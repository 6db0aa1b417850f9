use memchr::memchr;
use tracing::{debug, warn};

use crate::api::{BlockDelta, ChatResponse, MessagesEvent};
use crate::core::message::Usage;
use crate::core::providers::ProtocolFamily;

/// Canonical stream event, independent of the wire grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ThinkingDelta(String),
    UsageUpdate(Usage),
    Error(String),
    Done,
}

pub(crate) fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Reassembles newline-terminated lines from arbitrary byte chunks. Bytes
/// are kept raw until a full line arrives so a character split across
/// chunks is decoded whole.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset;
            let raw = &self.buffer[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            match std::str::from_utf8(raw) {
                Ok(line) => lines.push(line.to_string()),
                Err(err) => debug!(error = %err, "Skipping stream line with invalid UTF-8"),
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Longest unterminated line kept while waiting for its newline.
pub const MAX_PENDING_LINE_BYTES: usize = 1024 * 1024;

/// Short human-readable text for an in-band error object.
pub(crate) fn error_summary(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[derive(Debug)]
enum FamilyDecoder {
    /// Anthropic events; tracks whether the open content block is thinking.
    Messages { in_thinking_block: bool },
    ChatCompletions,
}

impl FamilyDecoder {
    fn decode(&mut self, payload: &str, out: &mut Vec<StreamEvent>) {
        match self {
            FamilyDecoder::Messages { in_thinking_block } => {
                decode_messages(payload, in_thinking_block, out)
            }
            FamilyDecoder::ChatCompletions => decode_chat_completions(payload, out),
        }
    }
}

fn decode_messages(payload: &str, in_thinking_block: &mut bool, out: &mut Vec<StreamEvent>) {
    let event = match serde_json::from_str::<MessagesEvent>(payload) {
        Ok(event) => event,
        Err(err) => {
            debug!(error = %err, "Skipping unparseable event");
            return;
        }
    };
    match event {
        MessagesEvent::MessageStart { message } => {
            if let Some(usage) = message.usage {
                out.push(StreamEvent::UsageUpdate(usage));
            }
        }
        MessagesEvent::ContentBlockStart { content_block } => {
            *in_thinking_block = content_block.kind == "thinking";
        }
        MessagesEvent::ContentBlockDelta { delta } => match delta {
            BlockDelta::ThinkingDelta { thinking } if *in_thinking_block => {
                if !thinking.is_empty() {
                    out.push(StreamEvent::ThinkingDelta(thinking));
                }
            }
            BlockDelta::TextDelta { text } => {
                if !text.is_empty() {
                    out.push(StreamEvent::TextDelta(text));
                }
            }
            _ => {}
        },
        MessagesEvent::ContentBlockStop => *in_thinking_block = false,
        MessagesEvent::MessageDelta { usage } => {
            if let Some(usage) = usage {
                out.push(StreamEvent::UsageUpdate(usage));
            }
        }
        MessagesEvent::Error { error } => out.push(StreamEvent::Error(error_summary(&error))),
        MessagesEvent::MessageStop | MessagesEvent::Other => {}
    }
}

fn decode_chat_completions(payload: &str, out: &mut Vec<StreamEvent>) {
    if payload == "[DONE]" {
        return;
    }
    let response = match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response,
        Err(err) => {
            debug!(error = %err, "Skipping unparseable chunk");
            return;
        }
    };

    if let Some(error) = &response.error {
        out.push(StreamEvent::Error(error_summary(error)));
    }
    if let Some(choice) = response.choices.into_iter().next() {
        let delta = choice.delta;
        if let Some(thinking) = delta.reasoning_content.or(delta.reasoning) {
            if !thinking.is_empty() {
                out.push(StreamEvent::ThinkingDelta(thinking));
            }
        }
        if let Some(content) = delta.content {
            if !content.is_empty() {
                out.push(StreamEvent::TextDelta(content));
            }
        }
    }
    if let Some(usage) = response.usage {
        out.push(StreamEvent::UsageUpdate(usage.into()));
    }
}

/// Incremental decoder from raw response bytes to [`StreamEvent`]s for one
/// protocol family. Feed chunks with [`push`](Self::push) and call
/// [`finish`](Self::finish) once the body ends; `Done` is emitted exactly
/// once, by `finish`.
#[derive(Debug)]
pub struct StreamNormalizer {
    lines: SseLineBuffer,
    decoder: FamilyDecoder,
    line_limit: usize,
    finished: bool,
}

impl StreamNormalizer {
    pub fn new(family: ProtocolFamily) -> Self {
        Self::with_line_limit(family, MAX_PENDING_LINE_BYTES)
    }

    /// Like [`StreamNormalizer::new`] with a custom cap on a single
    /// unterminated line.
    pub fn with_line_limit(family: ProtocolFamily, line_limit: usize) -> Self {
        let decoder = match family {
            ProtocolFamily::Messages => FamilyDecoder::Messages {
                in_thinking_block: false,
            },
            ProtocolFamily::ChatCompletions => FamilyDecoder::ChatCompletions,
        };
        Self {
            lines: SseLineBuffer::default(),
            decoder,
            line_limit,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        for line in self.lines.push(chunk) {
            if let Some(payload) = extract_data_payload(&line) {
                self.decoder.decode(payload, &mut events);
            }
        }
        let pending = self.lines.pending_len();
        if pending > self.line_limit {
            warn!(bytes = pending, limit = self.line_limit, "Stream line too long");
            self.lines.clear();
            self.finished = true;
            events.push(StreamEvent::Error(format!(
                "Stream line exceeded {} bytes without a line break",
                self.line_limit
            )));
            events.push(StreamEvent::Done);
        }
        events
    }

    /// End of the byte stream. An unterminated trailing line is dropped.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        if self.lines.pending_len() > 0 {
            debug!(bytes = self.lines.pending_len(), "Dropping unterminated stream line");
        }
        vec![StreamEvent::Done]
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
