//! # Scripted Command Sequences
//!
//! Ordered `(command, delay)` lists played back through the session event
//! queue. Steps are fire-and-forget: there is no cancellation, and each step
//! goes through the normal dispatch path, which re-checks the connection.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::SessionEvent;
use crate::protocol::Command;

/// One step of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub command: Command,
    pub value: Option<i64>,
    /// Pause before the next step fires
    pub delay_after: Duration,
}

/// Named sequence of timed commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScript {
    name: String,
    steps: Vec<ScriptStep>,
}

impl CommandScript {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step without a value
    pub fn then(self, command: Command, delay_after_ms: u64) -> Self {
        self.then_with_value(command, None, delay_after_ms)
    }

    pub fn then_with_value(mut self, command: Command, value: Option<i64>, delay_after_ms: u64) -> Self {
        self.steps.push(ScriptStep {
            command,
            value,
            delay_after: Duration::from_millis(delay_after_ms),
        });
        self
    }

    /// LED on/off/blink exercise ending with a status request
    pub fn connection_test() -> Self {
        Self::new("Connection test")
            .then(Command::LedOn, 500)
            .then(Command::LedOff, 500)
            .then(Command::LedOn, 500)
            .then(Command::LedOff, 500)
            .then(Command::LedBlink, 1000)
            .then(Command::LedBlinkStop, 500)
            .then(Command::Status, 0)
    }

    /// Quick LED light show
    pub fn led_pattern() -> Self {
        Self::new("LED pattern test")
            .then(Command::LedOn, 200)
            .then(Command::LedOff, 200)
            .then(Command::LedOn, 100)
            .then(Command::LedOff, 100)
            .then(Command::LedOn, 100)
            .then(Command::LedOff, 100)
            .then(Command::LedBlink, 300)
            .then(Command::LedBlinkStop, 500)
            .then(Command::LedOn, 1000)
            .then(Command::LedOff, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// When each step fires, relative to the script start
    ///
    /// Step `i` fires at the sum of the delays of steps `0..i`.
    pub fn offsets(&self) -> Vec<Duration> {
        self.steps
            .iter()
            .scan(Duration::ZERO, |elapsed, step| {
                let at = *elapsed;
                *elapsed += step.delay_after;
                Some(at)
            })
            .collect()
    }

    /// When the completion event fires
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|step| step.delay_after).sum()
    }

    /// Play the script into the session event queue
    pub(crate) fn spawn(self, events: mpsc::UnboundedSender<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = Instant::now();
            let offsets = self.offsets();
            let total = self.total_duration();

            for (index, (step, offset)) in self.steps.into_iter().zip(offsets).enumerate() {
                sleep_until(start + offset).await;
                let event = SessionEvent::ScriptStep {
                    script: self.name.clone(),
                    index,
                    command: step.command,
                    value: step.value,
                };
                if events.send(event).is_err() {
                    return;
                }
            }

            sleep_until(start + total).await;
            let _ = events.send(SessionEvent::ScriptFinished { script: self.name });
        })
    }
}
