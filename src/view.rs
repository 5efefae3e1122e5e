//! Conversation view state - the displayable transcript and its indicators
//!
//! Within one mode the transcript only grows by `append` and changes by
//! id-keyed `update`; a mode switch starts over from the new greeting.
//! Every reset opens a new epoch, and writers that captured an older epoch
//! are turned away by `append_at`.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::llm::Citation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

/// A single turn in the visible transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: String,
    pub role: MessageRole,
    pub content: String,
    /// Encoded image as a data URL
    pub image: Option<String>,
    pub is_loading: bool,
    pub citations: Vec<Citation>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            image: None,
            is_loading: false,
            citations: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(unique_id("user"), MessageRole::User, content)
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::new(unique_id("model"), MessageRole::Model, content)
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn loading(mut self) -> Self {
        self.is_loading = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Change notifications for renderers
#[derive(Debug, Clone)]
pub enum ViewEvent {
    /// Transcript replaced by a fresh one (mode change)
    Reset(Vec<ChatMessage>),
    Appended(ChatMessage),
    Updated(ChatMessage),
    LoadingChanged(bool),
    PlayingChanged(Option<String>),
}

#[derive(Debug, Default)]
struct ViewInner {
    epoch: u64,
    messages: Vec<ChatMessage>,
    is_loading: bool,
    playing: Option<String>,
}

/// Shared, injectable transcript state
#[derive(Debug, Default)]
pub struct ViewState {
    inner: Mutex<ViewInner>,
    event_tx: Option<mpsc::UnboundedSender<ViewEvent>>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(event_tx: mpsc::UnboundedSender<ViewEvent>) -> Self {
        Self {
            inner: Mutex::new(ViewInner::default()),
            event_tx: Some(event_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewInner> {
        // A panic elsewhere must not wedge the transcript
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new transcript containing only `greeting`; returns its epoch
    pub fn reset(&self, greeting: ChatMessage) -> u64 {
        let messages = vec![greeting];
        let epoch = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.messages = messages.clone();
            inner.epoch
        };
        self.emit(ViewEvent::Reset(messages));
        epoch
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Append a message; refused if its id is already present
    pub fn append(&self, message: ChatMessage) -> bool {
        self.push(None, message)
    }

    /// Append only while `epoch` is still the current transcript
    pub fn append_at(&self, epoch: u64, message: ChatMessage) -> bool {
        self.push(Some(epoch), message)
    }

    fn push(&self, epoch: Option<u64>, message: ChatMessage) -> bool {
        {
            let mut inner = self.lock();
            if let Some(epoch) = epoch.filter(|e| *e != inner.epoch) {
                tracing::debug!(
                    id = %message.id,
                    epoch,
                    current = inner.epoch,
                    "Dropping append from a reset transcript"
                );
                return false;
            }
            if inner.messages.iter().any(|m| m.id == message.id) {
                tracing::warn!(id = %message.id, "Refusing to append duplicate message id");
                return false;
            }
            inner.messages.push(message.clone());
        }
        self.emit(ViewEvent::Appended(message));
        true
    }

    /// Mutate the message with `id` in place; false if it no longer exists
    pub fn update(&self, id: &str, f: impl FnOnce(&mut ChatMessage)) -> bool {
        let updated = {
            let mut inner = self.lock();
            match inner.messages.iter_mut().find(|m| m.id == id) {
                Some(message) => {
                    f(message);
                    message.clone()
                }
                None => return false,
            }
        };
        self.emit(ViewEvent::Updated(updated));
        true
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    /// Claim the single in-flight turn slot
    pub(crate) fn try_begin_turn(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.is_loading {
                return false;
            }
            inner.is_loading = true;
        }
        self.emit(ViewEvent::LoadingChanged(true));
        true
    }

    pub(crate) fn end_turn(&self) {
        self.lock().is_loading = false;
        self.emit(ViewEvent::LoadingChanged(false));
    }

    pub fn playing(&self) -> Option<String> {
        self.lock().playing.clone()
    }

    /// Claim the single playback slot for `id`
    pub(crate) fn try_begin_playback(&self, id: &str) -> bool {
        {
            let mut inner = self.lock();
            if inner.playing.is_some() {
                return false;
            }
            inner.playing = Some(id.to_string());
        }
        self.emit(ViewEvent::PlayingChanged(Some(id.to_string())));
        true
    }

    pub(crate) fn end_playback(&self) {
        self.lock().playing = None;
        self.emit(ViewEvent::PlayingChanged(None));
    }

    fn emit(&self, event: ViewEvent) {
        if let Some(ref tx) = self.event_tx {
            // Receiver may have dropped
            let _ = tx.send(event);
        }
    }
}
