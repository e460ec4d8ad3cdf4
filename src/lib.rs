//! # Rover Dashboard Library
//!
//! Drive a rover and watch its telemetry over an MQTT broker.
//!
//! This library provides the session core (connection lifecycle, command
//! dispatch, telemetry routing) behind a transport seam and a presentation
//! seam, so any front end can sit on top of it.

pub mod config;
pub mod console;
pub mod error;
pub mod presentation;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;
