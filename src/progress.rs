//! Typed progress events
//!
//! Space generation and the assembly controller report what they are doing as
//! [`ProgressEvent`]s. They emit regardless of whether anything is listening;
//! the sink decides what to keep.

use serde::Serialize;

use crate::controller::Phase;

/// Which step produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Asking for the word list
    Words,
    /// Rating pairwise similarity
    Similarity,
    /// Rating per-word importance
    Importance,
    /// Running the layout engine
    Layout,
    /// The state machine entered or advanced a phase
    Assembly(Phase),
}

/// One progress report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// 0-100
    pub percent: f32,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(stage: Stage, percent: f32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
        }
    }
}

/// Consumer of progress events
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

/// Discards every event
impl ProgressSink for () {
    fn emit(&mut self, _event: ProgressEvent) {}
}

impl ProgressSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}
