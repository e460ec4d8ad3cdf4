//! # Telemetry Report Decoder
//!
//! Decodes the JSON reports the rover publishes on its status and LED topics.
//!
//! Every field is optional: a report only carries what changed, and an absent
//! field means "keep the previous value". A payload is rejected only when it
//! is not a JSON object. Inside an object each field is read on its own, so a
//! field of an unexpected type is skipped with a warning while the rest of
//! the report still applies. Integer fields are accepted either as JSON
//! numbers or as numeric strings, since firmware builds differ.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;

/// Partial rover status report (`rover/status/<id>`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusReport {
    /// WiFi signal strength in dBm
    #[serde(deserialize_with = "lenient_int")]
    pub wifi_rssi: Option<i64>,

    /// Rover IP address
    #[serde(deserialize_with = "lenient_string")]
    pub ip: Option<String>,

    /// Uptime, either preformatted text or whole seconds
    #[serde(deserialize_with = "lenient_uptime")]
    pub uptime: Option<Uptime>,

    /// Movement token (`forward`, `backward`, `left`, `right`, `stopped`, ...)
    #[serde(deserialize_with = "lenient_string")]
    pub movement: Option<String>,

    /// Current drive speed
    #[serde(deserialize_with = "lenient_int")]
    pub speed: Option<i64>,

    /// Rover-side broker link (`connected` / anything else)
    #[serde(deserialize_with = "lenient_string")]
    pub broker: Option<String>,
}

/// Partial LED report (`rover/led/<id>`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LedReport {
    /// `"on"` or anything else
    #[serde(deserialize_with = "lenient_string")]
    pub led_state: Option<String>,

    /// `"yes"` or anything else
    #[serde(deserialize_with = "lenient_string")]
    pub led_blinking: Option<String>,

    /// Blink half-period in milliseconds
    #[serde(deserialize_with = "lenient_int")]
    pub blink_interval: Option<i64>,
}

/// Uptime as reported by the rover
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uptime {
    Seconds(u64),
    Text(String),
}

impl Uptime {
    /// Human-readable uptime
    ///
    /// Whole seconds are rendered as `1h 2m 3s`, `2m 3s` or `3s`; text is
    /// passed through untouched.
    pub fn display(&self) -> String {
        match self {
            Uptime::Seconds(seconds) => format_duration(*seconds),
            Uptime::Text(text) => text.clone(),
        }
    }
}

/// Format whole seconds the way the dashboard shows uptime
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Decode a status report
///
/// # Errors
///
/// Returns `Parse` if the payload is not a JSON object
pub fn decode_status(payload: &[u8]) -> Result<StatusReport> {
    decode_object(payload)
}

/// Decode an LED report
///
/// # Errors
///
/// Returns `Parse` if the payload is not a JSON object
pub fn decode_led(payload: &[u8]) -> Result<LedReport> {
    decode_object(payload)
}

/// Check the object shape first, then read the fields leniently
fn decode_object<T>(payload: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let object: Map<String, Value> = serde_json::from_slice(payload)?;
    Ok(serde_json::from_value(Value::Object(object))?)
}

fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Value>::deserialize(deserializer)? {
        Some(value) => value,
        None => return Ok(None),
    };

    let parsed = match &value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(text) => parse_leading_int(text),
        _ => None,
    };
    if parsed.is_none() {
        warn!("Ignoring non-integer telemetry field: {}", value);
    }
    Ok(parsed)
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => {
            warn!("Ignoring non-string telemetry field: {}", other);
            Ok(None)
        }
        None => Ok(None),
    }
}

fn lenient_uptime<'de, D>(deserializer: D) -> std::result::Result<Option<Uptime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Value>::deserialize(deserializer)? {
        Some(value) => value,
        None => return Ok(None),
    };

    let uptime = match &value {
        Value::String(text) => Some(Uptime::Text(text.clone())),
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }).map(Uptime::Seconds),
        _ => None,
    };
    if uptime.is_none() {
        warn!("Ignoring unusable uptime: {}", value);
    }
    Ok(uptime)
}

/// Parse the leading integer of a string (`"-55 dBm"` -> `-55`)
fn parse_leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let digits_start = usize::from(text.starts_with(['-', '+']));
    let digits_len = text[digits_start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();

    if digits_len == 0 {
        return None;
    }
    text[..digits_start + digits_len].parse().ok()
}
