//! Per-turn chunk accumulator.
//!
//! One [`StreamAggregator`] owns the text of one turn. Chunks are appended in
//! arrival order and each append publishes the running total to the caller's
//! [`StreamSink`]. The first terminal transition (complete, fail, cancel) wins;
//! later ones are ignored.

use serde::Serialize;
use uuid::Uuid;

use crate::error::BackendError;
use crate::services::language::Locale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Streaming,
    Complete,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Complete | StreamState::Failed | StreamState::Cancelled)
    }
}

/// What the caller's live view sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Running total so far, not the latest chunk.
    Partial { turn_id: Uuid, text: String },
    Completed { turn_id: Uuid, text: String },
    Fallback { turn_id: Uuid, text: String, reason: String },
    Cancelled { turn_id: Uuid },
}

impl StreamEvent {
    pub fn turn_id(&self) -> Uuid {
        match self {
            StreamEvent::Partial { turn_id, .. }
            | StreamEvent::Completed { turn_id, .. }
            | StreamEvent::Fallback { turn_id, .. }
            | StreamEvent::Cancelled { turn_id } => *turn_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Partial { .. })
    }
}

/// Receiver for [`StreamEvent`]s. Implemented for any `FnMut(StreamEvent) + Send`.
pub trait StreamSink: Send {
    fn emit(&mut self, event: StreamEvent);
}

impl<F> StreamSink for F
where
    F: FnMut(StreamEvent) + Send,
{
    fn emit(&mut self, event: StreamEvent) {
        self(event)
    }
}

/// Final text of a turn that reached `Complete` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResult {
    pub text: String,
    pub fallback: bool,
}

pub struct StreamAggregator<'a> {
    turn_id: Uuid,
    locale: Locale,
    state: StreamState,
    text: String,
    chunks: usize,
    sink: &'a mut dyn StreamSink,
}

impl<'a> StreamAggregator<'a> {
    pub fn new(turn_id: Uuid, locale: Locale, sink: &'a mut dyn StreamSink) -> Self {
        Self {
            turn_id,
            locale,
            state: StreamState::Idle,
            text: String::new(),
            chunks: 0,
            sink,
        }
    }

    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Append a chunk and publish the running total. Ignored after a terminal
    /// transition. Empty chunks move the state to `Streaming` but publish nothing.
    pub fn consume(&mut self, chunk: &str) {
        if self.state.is_terminal() {
            return;
        }
        self.state = StreamState::Streaming;
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);
        self.chunks += 1;
        self.sink.emit(StreamEvent::Partial {
            turn_id: self.turn_id,
            text: self.text.clone(),
        });
    }

    /// Freeze the accumulated text. A stream that produced only whitespace is
    /// treated as [`BackendError::EmptyResponse`].
    pub fn complete(&mut self) -> Option<TurnResult> {
        if self.state.is_terminal() {
            return None;
        }
        if self.text.trim().is_empty() {
            return self.fail(&BackendError::EmptyResponse);
        }
        self.state = StreamState::Complete;
        self.sink.emit(StreamEvent::Completed {
            turn_id: self.turn_id,
            text: self.text.clone(),
        });
        Some(TurnResult {
            text: self.text.clone(),
            fallback: false,
        })
    }

    /// Replace whatever arrived with the localized fallback message.
    pub fn fail(&mut self, error: &BackendError) -> Option<TurnResult> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = StreamState::Failed;
        let text = self.locale.fallback_message().to_string();
        self.sink.emit(StreamEvent::Fallback {
            turn_id: self.turn_id,
            text: text.clone(),
            reason: error.reason().to_string(),
        });
        self.text = text.clone();
        Some(TurnResult { text, fallback: true })
    }

    /// Stop applying chunks. The partial text is kept for inspection but is
    /// never reported as a result.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = StreamState::Cancelled;
        self.sink.emit(StreamEvent::Cancelled { turn_id: self.turn_id });
        true
    }
}

impl std::fmt::Debug for StreamAggregator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAggregator")
            .field("turn_id", &self.turn_id)
            .field("locale", &self.locale)
            .field("state", &self.state)
            .field("chunks", &self.chunks)
            .finish()
    }
}
