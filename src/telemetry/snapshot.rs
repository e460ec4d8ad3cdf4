//! # Telemetry Snapshots
//!
//! Last-known rover and LED state, updated field by field as partial
//! reports arrive.
//!
//! ## Update Semantics
//!
//! Reports are sparse: a field present in the report replaces the stored
//! value, an absent field leaves it alone. Applying the same report twice
//! yields the same snapshot as applying it once.
//!
//! ## Field Interpretation
//!
//! | Field | Interpretation |
//! |-------|----------------|
//! | `wifi_rssi` | Strong ≥ -50 dBm, Medium > -70 dBm, Weak otherwise |
//! | `movement` | Capitalized label; case-insensitive category |
//! | `broker` | `connected` or disconnected |
//! | `led_state` | `on` or off |
//! | `led_blinking` | `yes` or no |

use serde::Serialize;
use tracing::warn;

use crate::protocol::telemetry::{LedReport, StatusReport};

/// Default LED blink interval in milliseconds
pub const DEFAULT_BLINK_INTERVAL_MS: u32 = 500;

/// Lower bound (inclusive) of the strong signal tier in dBm
pub const RSSI_STRONG_DBM: i64 = -50;

/// Lower bound (exclusive) of the medium signal tier in dBm
pub const RSSI_MEDIUM_DBM: i64 = -70;

/// Signal strength tier used for colour coding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RssiTier {
    Strong,
    Medium,
    Weak,
}

impl RssiTier {
    pub fn classify(rssi_dbm: i64) -> Self {
        if rssi_dbm >= RSSI_STRONG_DBM {
            RssiTier::Strong
        } else if rssi_dbm > RSSI_MEDIUM_DBM {
            RssiTier::Medium
        } else {
            RssiTier::Weak
        }
    }
}

/// Rover movement as reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementState {
    Forward,
    Backward,
    Left,
    Right,
    Stopped,
    Unknown,
}

impl MovementState {
    /// Case-insensitive token lookup; unrecognized tokens are `Unknown`
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "forward" => MovementState::Forward,
            "backward" => MovementState::Backward,
            "left" => MovementState::Left,
            "right" => MovementState::Right,
            "stopped" => MovementState::Stopped,
            _ => MovementState::Unknown,
        }
    }

    /// Palette category; anything unrecognized renders as stopped
    pub fn category(self) -> Self {
        match self {
            MovementState::Unknown => MovementState::Stopped,
            other => other,
        }
    }
}

/// Movement field: display label plus semantic state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movement {
    pub label: String,
    pub state: MovementState,
}

impl Movement {
    /// Interpret a movement token from a structured report
    pub fn from_token(token: &str) -> Self {
        Self {
            label: capitalize(token),
            state: MovementState::from_token(token),
        }
    }

    /// Raw, non-JSON status text shown verbatim
    pub fn raw(text: &str) -> Self {
        Self {
            label: text.to_string(),
            state: MovementState::Unknown,
        }
    }
}

impl Default for Movement {
    fn default() -> Self {
        Self {
            label: "Stopped".to_string(),
            state: MovementState::Stopped,
        }
    }
}

/// Rover-side broker link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerState {
    Connected,
    Disconnected,
}

impl BrokerState {
    pub fn from_token(token: &str) -> Self {
        if token == "connected" {
            BrokerState::Connected
        } else {
            BrokerState::Disconnected
        }
    }
}

/// Signal strength reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalStrength {
    pub dbm: i64,
    pub tier: RssiTier,
}

impl SignalStrength {
    pub fn new(dbm: i64) -> Self {
        Self {
            dbm,
            tier: RssiTier::classify(dbm),
        }
    }
}

/// Last-known rover status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub signal: Option<SignalStrength>,
    pub ip_address: Option<String>,
    pub uptime: Option<String>,
    pub movement: Movement,
    pub speed: Option<i64>,
    pub broker: Option<BrokerState>,
}

impl TelemetrySnapshot {
    /// Apply a sparse status report
    pub fn apply(&mut self, report: &StatusReport) {
        if let Some(rssi) = report.wifi_rssi {
            self.signal = Some(SignalStrength::new(rssi));
        }
        if let Some(ip) = &report.ip {
            self.ip_address = Some(ip.clone());
        }
        if let Some(uptime) = &report.uptime {
            self.uptime = Some(uptime.display());
        }
        if let Some(movement) = &report.movement {
            self.movement = Movement::from_token(movement);
        }
        if let Some(speed) = report.speed {
            self.speed = Some(speed);
        }
        if let Some(broker) = &report.broker {
            self.broker = Some(BrokerState::from_token(broker));
        }
    }

    /// Show non-JSON status text in the movement field
    pub fn apply_raw(&mut self, text: &str) {
        self.movement = Movement::raw(text);
    }
}

/// What the LED indicator should look like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LedIndicator {
    Off,
    On,
    Blinking { interval_ms: u32 },
}

/// Last-known LED state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedSnapshot {
    pub led_on: bool,
    pub blinking: bool,
    pub blink_interval_ms: u32,
}

impl Default for LedSnapshot {
    fn default() -> Self {
        Self {
            led_on: false,
            blinking: false,
            blink_interval_ms: DEFAULT_BLINK_INTERVAL_MS,
        }
    }
}

impl LedSnapshot {
    /// Apply a sparse LED report
    ///
    /// A blink interval that is not positive is ignored.
    pub fn apply(&mut self, report: &LedReport) {
        if let Some(state) = &report.led_state {
            self.led_on = state == "on";
        }
        if let Some(blinking) = &report.led_blinking {
            self.blinking = blinking == "yes";
        }
        if let Some(interval) = report.blink_interval {
            match u32::try_from(interval) {
                Ok(interval) if interval > 0 => self.blink_interval_ms = interval,
                _ => warn!("Ignoring non-positive blink interval: {}", interval),
            }
        }
    }

    /// Blinking wins over steady on
    pub fn indicator(&self) -> LedIndicator {
        if self.blinking {
            LedIndicator::Blinking {
                interval_ms: self.blink_interval_ms,
            }
        } else if self.led_on {
            LedIndicator::On
        } else {
            LedIndicator::Off
        }
    }
}

/// Uppercase the first character, leave the rest untouched
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
