//! # Presentation Events
//!
//! Everything the core tells the operator goes through a [`PresentationSink`]
//! as a [`DashboardEvent`]. Rendering is the sink's business: the binary uses
//! [`ConsoleSink`], tests use a recording sink.

use std::io::Write;

use chrono::{DateTime, Local, Utc};
use tracing::{debug, warn};

use crate::session::ConnectionState;
use crate::telemetry::recorder::TelemetryRecorder;
use crate::telemetry::snapshot::{LedIndicator, LedSnapshot, TelemetrySnapshot};

/// Severity of an operator notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Outcome of a single command dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Sent,
    Failed { error: String },
}

/// Events emitted by the core for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    /// Connection state machine moved
    ConnectionStateChanged {
        state: ConnectionState,
        reason: String,
    },

    /// A status report was applied
    TelemetryUpdated {
        snapshot: TelemetrySnapshot,
        received_at: DateTime<Utc>,
    },

    /// Non-JSON status text, to be shown verbatim as the movement
    RawStatus { text: String },

    /// An LED report was applied
    LedUpdated { snapshot: LedSnapshot },

    /// Telemetry displays should return to their idle values
    TelemetryReset,

    /// A command was published or failed
    CommandResult {
        command: String,
        status: CommandStatus,
    },

    /// Free-form operator notification
    Notice { level: NoticeLevel, message: String },
}

impl DashboardEvent {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        DashboardEvent::Notice {
            level,
            message: message.into(),
        }
    }
}

/// Consumer of dashboard events
pub trait PresentationSink: Send {
    fn emit(&mut self, event: DashboardEvent);
}

/// Renders dashboard events as text lines
///
/// Optionally records every telemetry and LED update to JSONL.
pub struct ConsoleSink<W: Write + Send> {
    out: W,
    recorder: Option<TelemetryRecorder>,
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, recorder: None }
    }

    pub fn with_recorder(mut self, recorder: TelemetryRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    fn record(&mut self, event: &DashboardEvent) {
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.record(event) {
                warn!("Failed to record telemetry: {}", e);
            }
        }
    }
}

impl<W: Write + Send> PresentationSink for ConsoleSink<W> {
    fn emit(&mut self, event: DashboardEvent) {
        debug!(?event, "dashboard event");
        self.record(&event);

        let line = render(&event);
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("Failed to write to console: {}", e);
        }
    }
}

/// Render one event as a single display line
pub fn render(event: &DashboardEvent) -> String {
    match event {
        DashboardEvent::ConnectionStateChanged { state, reason } => {
            format!("[connection] {} - {}", state, reason)
        }
        DashboardEvent::TelemetryUpdated {
            snapshot,
            received_at,
        } => render_telemetry(snapshot, received_at),
        DashboardEvent::RawStatus { text } => format!("[status] movement: {}", text),
        DashboardEvent::LedUpdated { snapshot } => render_led(snapshot),
        DashboardEvent::TelemetryReset => "[status] --".to_string(),
        DashboardEvent::CommandResult { command, status } => match status {
            CommandStatus::Sent => format!("[command] sent: {}", command),
            CommandStatus::Failed { error } => format!("[command] failed: {} ({})", command, error),
        },
        DashboardEvent::Notice { level, message } => {
            let tag = match level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Error => "error",
            };
            format!("[{}] {}", tag, message)
        }
    }
}

fn render_telemetry(snapshot: &TelemetrySnapshot, received_at: &DateTime<Utc>) -> String {
    let signal = snapshot
        .signal
        .map(|s| format!("{} dBm ({:?})", s.dbm, s.tier))
        .unwrap_or_else(|| "--".to_string());
    let speed = snapshot
        .speed
        .map(|s| s.to_string())
        .unwrap_or_else(|| "--".to_string());
    let broker = snapshot
        .broker
        .map(|b| format!("{:?}", b))
        .unwrap_or_else(|| "--".to_string());

    format!(
        "[status] wifi {} | ip {} | uptime {} | movement {} ({:?}) | speed {} | broker {} | last update {}",
        signal,
        snapshot.ip_address.as_deref().unwrap_or("--"),
        snapshot.uptime.as_deref().unwrap_or("--"),
        snapshot.movement.label,
        snapshot.movement.state.category(),
        speed,
        broker,
        received_at.with_timezone(&Local).format("%H:%M:%S"),
    )
}

fn render_led(snapshot: &LedSnapshot) -> String {
    match snapshot.indicator() {
        LedIndicator::Off => "[led] OFF".to_string(),
        LedIndicator::On => "[led] ON".to_string(),
        LedIndicator::Blinking { interval_ms } => {
            format!("[led] BLINKING every {}ms", interval_ms)
        }
    }
}
