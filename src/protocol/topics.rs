//! # Rover Identifier and Topic Set
//!
//! Every topic the dashboard touches is a pure function of the rover id.

use std::fmt;

use crate::error::{DashboardError, Result};

/// Topic namespace shared by all rover traffic
pub const TOPIC_NAMESPACE: &str = "rover";

/// Category segment for inbound status telemetry
pub const STATUS_CATEGORY: &str = "status";

/// Category segment for inbound LED telemetry
pub const LED_CATEGORY: &str = "led";

/// Category segment for outbound commands
pub const COMMANDS_CATEGORY: &str = "commands";

/// Operator-settable rover identifier
///
/// Always trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoverId(String);

impl RoverId {
    /// Build a rover id from operator input
    ///
    /// # Errors
    ///
    /// Returns `InvalidRoverId` if the input is empty after trimming
    ///
    /// # Examples
    ///
    /// ```
    /// use rover_dashboard::protocol::RoverId;
    ///
    /// let id = RoverId::new("  ROVER_001 ")?;
    /// assert_eq!(id.as_str(), "ROVER_001");
    /// # Ok::<(), rover_dashboard::error::DashboardError>(())
    /// ```
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DashboardError::InvalidRoverId(raw.as_ref().to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three topics belonging to one rover
///
/// Derived on demand and never cached across a rover id change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Inbound status telemetry (`rover/status/<id>`)
    pub status: String,
    /// Inbound LED telemetry (`rover/led/<id>`)
    pub led: String,
    /// Outbound commands (`rover/commands/<id>`)
    pub commands: String,
}

impl TopicSet {
    /// Compute the topic set for a rover
    ///
    /// # Examples
    ///
    /// ```
    /// use rover_dashboard::protocol::{RoverId, TopicSet};
    ///
    /// let topics = TopicSet::for_rover(&RoverId::new("ROVER_001")?);
    /// assert_eq!(topics.status, "rover/status/ROVER_001");
    /// # Ok::<(), rover_dashboard::error::DashboardError>(())
    /// ```
    pub fn for_rover(rover_id: &RoverId) -> Self {
        Self {
            status: topic(STATUS_CATEGORY, rover_id),
            led: topic(LED_CATEGORY, rover_id),
            commands: topic(COMMANDS_CATEGORY, rover_id),
        }
    }
}

fn topic(category: &str, rover_id: &RoverId) -> String {
    format!("{}/{}/{}", TOPIC_NAMESPACE, category, rover_id)
}
