//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use url::Url;
use zonediff::llm::{LlmRequest, LlmStream, LlmTransport, StreamEvent};
use zonediff::patch::{DIVIDER_MARKER, ORIGINAL_MARKER, UPDATED_MARKER};
use zonediff::{Engine, MemoryBuffer};

pub fn test_uri(name: &str) -> Url {
    Url::parse(&format!("file:///test/{}.rs", name)).unwrap()
}

/// Engine with one open in-memory document.
pub fn open_engine(name: &str, text: &str) -> (Engine, Url) {
    let uri = test_uri(name);
    let mut engine = Engine::default();
    engine.open_document(uri.clone(), Box::new(MemoryBuffer::new(text)));
    (engine, uri)
}

/// One complete search/replace block.
pub fn block(search: &str, replace: &str) -> String {
    format!("{ORIGINAL_MARKER}\n{search}\n{DIVIDER_MARKER}\n{replace}\n{UPDATED_MARKER}\n")
}

pub fn delta(text: &str) -> StreamEvent {
    StreamEvent::Delta {
        full_text: text.to_string(),
    }
}

pub fn completed(text: &str) -> StreamEvent {
    StreamEvent::Completed {
        full_text: text.to_string(),
    }
}

/// Transport answering each request with the next canned event sequence.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LlmTransport for ScriptedTransport {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn send_message(&self, request: LlmRequest) -> LlmStream {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![StreamEvent::Failed("script exhausted".into())]);

        let (sender, stream) = LlmStream::channel();
        tokio::spawn(async move {
            for event in script {
                tokio::task::yield_now().await;
                let delivered = match event {
                    StreamEvent::Delta { full_text } => sender.delta(full_text),
                    StreamEvent::Completed { full_text } => sender.complete(full_text),
                    StreamEvent::Failed(message) => sender.fail(message),
                    StreamEvent::Aborted => false,
                };
                if !delivered {
                    // Hang until cancelled, like a stalled connection
                    sender.cancelled().await;
                    return;
                }
            }
        });
        stream
    }
}
