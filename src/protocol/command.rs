//! # Command Vocabulary and Envelope
//!
//! Encodes operator commands into the JSON envelope published on
//! `rover/commands/<id>`.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Commands understood by the rover firmware
///
/// The set is not enforced: anything else travels as [`Command::Other`] so
/// newer firmware commands can be sent without a dashboard release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Ask the rover to publish a fresh status report
    Status,
    /// Reboot the rover
    Restart,
    /// Set drive speed (value required)
    Speed,
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    LedOn,
    LedOff,
    LedToggle,
    LedBlink,
    LedBlinkStop,
    /// Set LED blink interval in milliseconds (value required)
    LedBlinkInterval,
    /// Forward-compatible escape hatch
    Other(String),
}

impl Command {
    /// Wire name of the command
    pub fn as_str(&self) -> &str {
        match self {
            Command::Status => "status",
            Command::Restart => "restart",
            Command::Speed => "speed",
            Command::Forward => "forward",
            Command::Backward => "backward",
            Command::Left => "left",
            Command::Right => "right",
            Command::Stop => "stop",
            Command::LedOn => "led_on",
            Command::LedOff => "led_off",
            Command::LedToggle => "led_toggle",
            Command::LedBlink => "led_blink",
            Command::LedBlinkStop => "led_blink_stop",
            Command::LedBlinkInterval => "led_blink_interval",
            Command::Other(name) => name,
        }
    }
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "status" => Command::Status,
            "restart" => Command::Restart,
            "speed" => Command::Speed,
            "forward" => Command::Forward,
            "backward" => Command::Backward,
            "left" => Command::Left,
            "right" => Command::Right,
            "stop" => Command::Stop,
            "led_on" => Command::LedOn,
            "led_off" => Command::LedOff,
            "led_toggle" => Command::LedToggle,
            "led_blink" => Command::LedBlink,
            "led_blink_stop" => Command::LedBlinkStop,
            "led_blink_interval" => Command::LedBlinkInterval,
            other => Command::Other(other.to_string()),
        })
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(command) => command,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound command message
///
/// Built fresh for every dispatch and never retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl CommandEnvelope {
    /// Stamp a command with the current wall-clock time
    pub fn new(command: &Command, value: Option<i64>) -> Self {
        Self::with_timestamp(command, value, Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(command: &Command, value: Option<i64>, timestamp: i64) -> Self {
        Self {
            command: command.as_str().to_string(),
            value,
            timestamp,
        }
    }

    /// Serialize to the JSON wire payload
    ///
    /// # Examples
    ///
    /// ```
    /// use rover_dashboard::protocol::{Command, CommandEnvelope};
    ///
    /// let envelope = CommandEnvelope::with_timestamp(&Command::Speed, Some(150), 1_700_000_000_000);
    /// let payload = envelope.encode()?;
    /// assert_eq!(
    ///     String::from_utf8(payload).unwrap(),
    ///     r#"{"command":"speed","value":150,"timestamp":1700000000000}"#
    /// );
    /// # Ok::<(), rover_dashboard::error::DashboardError>(())
    /// ```
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
