//! LLM transport boundary.
//!
//! The engine never talks HTTP. A host implements [`LlmTransport`] and feeds
//! cumulative output through a [`StreamSender`]; the drivers read it back from
//! the paired [`LlmStream`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::region::RequestHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}

/// One event of a streamed completion.
///
/// A stream yields any number of `Delta`s and ends with exactly one of the
/// other variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta { full_text: String },
    Completed { full_text: String },
    Aborted,
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta { .. })
    }
}

/// Something that can send chat requests to a model.
pub trait LlmTransport: Send + Sync {
    /// Name used in error messages.
    fn provider(&self) -> &str;

    /// Start a completion. Implementations spawn their own task and report
    /// through the returned stream.
    fn send_message(&self, request: LlmRequest) -> LlmStream;
}

/// Producer half handed to the transport task.
#[derive(Debug, Clone)]
pub struct StreamSender {
    handle: RequestHandle,
    events: UnboundedSender<StreamEvent>,
}

impl StreamSender {
    /// Report the cumulative output so far. Returns false once nobody listens.
    pub fn delta(&self, full_text: impl Into<String>) -> bool {
        self.send(StreamEvent::Delta {
            full_text: full_text.into(),
        })
    }

    pub fn complete(&self, full_text: impl Into<String>) -> bool {
        self.send(StreamEvent::Completed {
            full_text: full_text.into(),
        })
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.send(StreamEvent::Failed(message.into()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Resolves when the request is cancelled.
    pub async fn cancelled(&self) {
        self.handle.token().cancelled().await
    }

    fn send(&self, event: StreamEvent) -> bool {
        !self.is_cancelled() && self.events.send(event).is_ok()
    }
}

/// Consumer half of a streamed completion.
#[derive(Debug)]
pub struct LlmStream {
    handle: RequestHandle,
    events: UnboundedReceiver<StreamEvent>,
    finished: bool,
}

impl LlmStream {
    pub fn channel() -> (StreamSender, LlmStream) {
        Self::with_handle(RequestHandle::new())
    }

    pub fn with_handle(handle: RequestHandle) -> (StreamSender, LlmStream) {
        let (tx, rx) = unbounded_channel();
        (
            StreamSender {
                handle: handle.clone(),
                events: tx,
            },
            LlmStream {
                handle,
                events: rx,
                finished: false,
            },
        )
    }

    pub fn handle(&self) -> &RequestHandle {
        &self.handle
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Next event, or `None` after the terminal one.
    ///
    /// Cancellation wins over queued deltas and yields `Aborted`. A sender
    /// dropped without a terminal event yields `Failed`.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let token = self.handle.token();
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => StreamEvent::Aborted,
            event = self.events.recv() => event.unwrap_or_else(|| {
                StreamEvent::Failed("stream closed without a final response".to_string())
            }),
        };
        self.finished = event.is_terminal();
        Some(event)
    }
}
