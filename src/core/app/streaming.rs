use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{App, SendError};
use crate::core::chat::Chat;
use crate::core::chat_stream::{StreamAccumulator, StreamEvent, StreamParams};
use crate::core::message::{Message, MessageContent};
use crate::core::providers::resolve_model;
use crate::core::request::{prepare_request, GenerationSettings};

/// The single in-flight generation.
#[derive(Debug)]
pub(crate) struct ActiveStream {
    pub id: u64,
    pub chat_id: String,
    /// Composite id of the model answering.
    pub model: String,
    cancel_token: CancellationToken,
    accumulator: StreamAccumulator,
}

impl App {
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_current_stream(&self, stream_id: u64) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.id == stream_id)
    }

    fn ensure_current_chat(&mut self) -> String {
        if let Some(chat) = self.state.current_chat() {
            return chat.id.clone();
        }
        let folder_id = self.state.folders.first().map(|folder| folder.id.clone());
        let chat = Chat::new(folder_id);
        let id = chat.id.clone();
        self.state.chats.insert(0, chat);
        self.state.current_chat_id = Some(id.clone());
        id
    }

    /// Append a user turn to the current chat and prepare its stream. The
    /// caller hands the returned parameters to
    /// [`ChatStreamService::spawn_stream`](crate::core::chat_stream::ChatStreamService::spawn_stream).
    pub fn begin_send(
        &mut self,
        content: impl Into<MessageContent>,
        files: Vec<String>,
    ) -> Result<StreamParams, SendError> {
        let content = content.into();
        let empty = match &content {
            MessageContent::Text(text) => text.trim().is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        };
        if empty {
            return Err(SendError::EmptyMessage);
        }
        self.check_can_send()?;

        let chat_id = self.ensure_current_chat();
        if let Some(chat) = self.state.chat_mut(&chat_id) {
            if !chat.messages.iter().any(Message::is_user) {
                if let Some(text) = content.first_text() {
                    chat.title = Chat::title_from_text(text);
                }
            }
            let mut message = Message::user(content);
            message.files = files;
            chat.messages.push(message);
        }
        self.start_stream(chat_id)
    }

    /// Drop the assistant turn at `index` together with the user turn that
    /// prompted it and everything after, then ask again.
    pub fn regenerate(&mut self, index: usize) -> Result<StreamParams, SendError> {
        self.check_can_send()?;
        let chat = self
            .state
            .current_chat_mut()
            .ok_or(SendError::NothingToRegenerate)?;
        let valid = index >= 1
            && chat.messages.get(index).is_some_and(Message::is_assistant)
            && chat.messages[index - 1].is_user();
        if !valid {
            return Err(SendError::NothingToRegenerate);
        }
        let prompt = chat.messages[index - 1].clone();
        chat.messages.truncate(index - 1);
        chat.messages.push(prompt);
        let chat_id = chat.id.clone();
        debug!(chat_id = %chat_id, index, "Regenerating");
        self.start_stream(chat_id)
    }

    /// Regenerate the last assistant turn of the current chat.
    pub fn regenerate_last(&mut self) -> Result<StreamParams, SendError> {
        let index = self
            .state
            .current_chat()
            .and_then(|chat| chat.messages.iter().rposition(Message::is_assistant))
            .ok_or(SendError::NothingToRegenerate)?;
        self.regenerate(index)
    }

    fn check_can_send(&mut self) -> Result<(), SendError> {
        if self.stream.is_some() {
            return Err(SendError::StreamInProgress);
        }
        self.ensure_unlocked().map_err(|_| SendError::Locked)
    }

    fn start_stream(&mut self, chat_id: String) -> Result<StreamParams, SendError> {
        let model = self.state.config.model.clone();
        let prepared = resolve_model(&self.state.providers, &model)
            .map_err(SendError::from)
            .and_then(|resolved| {
                let settings = GenerationSettings::from_state(&self.state, &resolved.model_id);
                let history = self
                    .state
                    .chat(&chat_id)
                    .map(|chat| chat.messages.as_slice())
                    .unwrap_or_default();
                Ok(prepare_request(&resolved, &self.router, history, &settings)?)
            });
        // The user turn stays in the chat even when the request cannot be made.
        self.persist();
        let request = prepared?;

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        let cancel_token = CancellationToken::new();
        self.stream = Some(ActiveStream {
            id: stream_id,
            chat_id,
            model,
            cancel_token: cancel_token.clone(),
            accumulator: StreamAccumulator::new(),
        });
        info!(stream_id, "Generation started");

        Ok(StreamParams {
            client: self.client.clone(),
            request,
            cancel_token,
            stream_id,
        })
    }

    /// Fold one event into the active stream. Events from stale streams are
    /// ignored. Returns true once the stream has been finalized.
    pub fn apply_event(&mut self, stream_id: u64, event: &StreamEvent) -> bool {
        let Some(stream) = self.stream.as_mut().filter(|stream| stream.id == stream_id) else {
            debug!(stream_id, "Ignoring event from stale stream");
            return false;
        };
        stream.accumulator.apply(event);
        if stream.accumulator.is_done() {
            self.finalize_stream(false);
            return true;
        }
        false
    }

    /// Stop the active stream. Text received so far becomes the answer.
    pub fn cancel_stream(&mut self) {
        if let Some(stream) = &self.stream {
            stream.cancel_token.cancel();
            self.finalize_stream(true);
        }
    }

    fn finalize_stream(&mut self, cancelled: bool) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        let content = stream.accumulator.final_content(cancelled);
        let message = Message::assistant(content)
            .with_usage(stream.accumulator.usage)
            .with_model(stream.model);
        match self.state.chat_mut(&stream.chat_id) {
            Some(chat) => chat.messages.push(message),
            None => debug!(chat_id = %stream.chat_id, "Chat removed during generation"),
        }
        info!(stream_id = stream.id, cancelled, "Generation finished");
        self.persist();
    }
}
