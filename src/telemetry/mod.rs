//! # Telemetry Module
//!
//! Routes inbound broker messages to the status and LED snapshots.
//!
//! This module handles:
//! - Exact topic matching against the active rover's topic set
//! - Decoding reports and applying sparse updates
//! - Raw-text fallback for non-JSON status messages
//! - Recording updates to rotating JSONL files ([`recorder`])

pub mod recorder;
pub mod snapshot;

use chrono::Utc;
use tracing::{debug, warn};

use crate::presentation::DashboardEvent;
use crate::protocol::telemetry::{decode_led, decode_status};
use crate::protocol::TopicSet;
use snapshot::{LedSnapshot, TelemetrySnapshot};

/// Demultiplexes inbound messages into snapshot updates
#[derive(Debug, Default)]
pub struct TelemetryRouter {
    telemetry: TelemetrySnapshot,
    led: LedSnapshot,
}

impl TelemetryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one inbound message
    ///
    /// `topics` must be computed from the rover id active at routing time.
    /// Returns the event to hand to the presentation layer, or `None` when
    /// the message was dropped.
    pub fn route(&mut self, topics: &TopicSet, topic: &str, payload: &[u8]) -> Option<DashboardEvent> {
        if topic == topics.status {
            Some(self.route_status(payload))
        } else if topic == topics.led {
            self.route_led(payload)
        } else {
            debug!("Dropping message on unrelated topic {}", topic);
            None
        }
    }

    fn route_status(&mut self, payload: &[u8]) -> DashboardEvent {
        match decode_status(payload) {
            Ok(report) => {
                self.telemetry.apply(&report);
                DashboardEvent::TelemetryUpdated {
                    snapshot: self.telemetry.clone(),
                    received_at: Utc::now(),
                }
            }
            Err(e) => {
                let text = String::from_utf8_lossy(payload).into_owned();
                debug!("Status payload is not JSON ({}), showing raw text: {}", e, text);
                self.telemetry.apply_raw(&text);
                DashboardEvent::RawStatus { text }
            }
        }
    }

    fn route_led(&mut self, payload: &[u8]) -> Option<DashboardEvent> {
        match decode_led(payload) {
            Ok(report) => {
                self.led.apply(&report);
                Some(DashboardEvent::LedUpdated {
                    snapshot: self.led.clone(),
                })
            }
            Err(e) => {
                warn!("Dropping unparseable LED payload: {}", e);
                None
            }
        }
    }

    /// Return both snapshots to their idle values
    pub fn reset(&mut self) {
        self.telemetry = TelemetrySnapshot::default();
        self.led = LedSnapshot::default();
    }

    pub fn telemetry(&self) -> &TelemetrySnapshot {
        &self.telemetry
    }

    pub fn led(&self) -> &LedSnapshot {
        &self.led
    }
}
