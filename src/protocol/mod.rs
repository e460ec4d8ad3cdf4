//! # Rover Wire Protocol
//!
//! Message contracts shared by the dashboard and the rover firmware.
//!
//! This module handles:
//! - Rover identifiers and the per-rover topic set (`rover/<category>/<id>`)
//! - The command vocabulary and the JSON command envelope
//! - Decoding of status and LED telemetry reports

pub mod command;
pub mod telemetry;
pub mod topics;

pub use command::{Command, CommandEnvelope};
pub use telemetry::{LedReport, StatusReport};
pub use topics::{RoverId, TopicSet};
