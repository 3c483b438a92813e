//! Progress events emitted by the release pipeline.
//!
//! Components never print directly. They report steps through an
//! [`EventSink`] handed to them by the caller, so the CLI can render the
//! events to a terminal while tests simply record them.

use std::sync::Mutex;

/// How a step or progress line concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Completed as expected
    Success,
    /// Failed; usually followed by an error propagating upward
    Failure,
    /// Informational only
    Neutral,
}

/// A single progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Section header for a command
    Title(String),
    /// A step has started
    StepBegin(String),
    /// Detail line within the current step
    StepProgress {
        /// Message text
        message: String,
        /// How this line should be presented
        outcome: StepOutcome,
    },
    /// The current step finished
    StepEnd {
        /// Message text
        message: String,
        /// Result of the step
        outcome: StepOutcome,
    },
    /// Final summary line of a command
    Conclusion(String),
}

impl Event {
    /// Message carried by the event
    pub fn message(&self) -> &str {
        match self {
            Event::Title(m) | Event::StepBegin(m) | Event::Conclusion(m) => m,
            Event::StepProgress { message, .. } | Event::StepEnd { message, .. } => message,
        }
    }
}

/// Observer for pipeline progress
pub trait EventSink: Send + Sync {
    /// Receive one event
    fn emit(&self, event: Event);

    /// Emit [`Event::Title`]
    fn title(&self, message: &str) {
        self.emit(Event::Title(message.to_string()));
    }

    /// Emit [`Event::StepBegin`]
    fn step_begin(&self, message: &str) {
        self.emit(Event::StepBegin(message.to_string()));
    }

    /// Emit a neutral [`Event::StepProgress`]
    fn step_progress(&self, message: &str) {
        self.step_progress_with(message, StepOutcome::Neutral);
    }

    /// Emit [`Event::StepProgress`] with an explicit outcome
    fn step_progress_with(&self, message: &str, outcome: StepOutcome) {
        self.emit(Event::StepProgress {
            message: message.to_string(),
            outcome,
        });
    }

    /// Emit a successful [`Event::StepEnd`]
    fn step_end(&self, message: &str) {
        self.step_end_with(message, StepOutcome::Success);
    }

    /// Emit a failed [`Event::StepEnd`]
    fn step_failed(&self, message: &str) {
        self.step_end_with(message, StepOutcome::Failure);
    }

    /// Emit [`Event::StepEnd`] with an explicit outcome
    fn step_end_with(&self, message: &str, outcome: StepOutcome) {
        self.emit(Event::StepEnd {
            message: message.to_string(),
            outcome,
        });
    }

    /// Emit [`Event::Conclusion`]
    fn conclusion(&self, message: &str) {
        self.emit(Event::Conclusion(message.to_string()));
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Messages of all failed steps and progress lines
    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::StepEnd {
                    message,
                    outcome: StepOutcome::Failure,
                }
                | Event::StepProgress {
                    message,
                    outcome: StepOutcome::Failure,
                } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// True if any recorded message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|e| e.message().contains(needle))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        log::debug!("event: {:?}", event);
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
