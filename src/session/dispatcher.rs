//! # Command Dispatcher
//!
//! Wraps a command in its envelope and publishes it on the rover's command
//! topic. Every call ends in exactly one `CommandResult` event.

use tracing::{error, info, warn};

use crate::error::{DashboardError, Result};
use crate::presentation::{CommandStatus, DashboardEvent, NoticeLevel, PresentationSink};
use crate::protocol::{Command, CommandEnvelope, TopicSet};
use crate::transport::TransportHandle;

/// Publishes commands at most once, without acknowledgment tracking
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch a command
    ///
    /// # Arguments
    ///
    /// * `link` - The transport, present only while the session is Connected
    /// * `topics` - Topic set for the current rover id
    /// * `command` - Command to send
    /// * `value` - Optional numeric argument
    /// * `sink` - Receives the command result
    ///
    /// # Errors
    ///
    /// - `NotConnected`: no Connected session; nothing is published
    /// - `Publish`: the transport refused the message; not retried
    pub async fn dispatch(
        &self,
        link: Option<&dyn TransportHandle>,
        topics: &TopicSet,
        command: &Command,
        value: Option<i64>,
        sink: &mut dyn PresentationSink,
    ) -> Result<()> {
        let Some(handle) = link else {
            warn!("Command failed (not connected): {}", command);
            sink.emit(DashboardEvent::CommandResult {
                command: command.to_string(),
                status: CommandStatus::Failed {
                    error: DashboardError::NotConnected.to_string(),
                },
            });
            sink.emit(DashboardEvent::notice(
                NoticeLevel::Error,
                "Not connected to rover. Please connect first.",
            ));
            return Err(DashboardError::NotConnected);
        };

        match publish(handle, topics, command, value).await {
            Ok(()) => {
                info!("Command sent: {}", command);
                sink.emit(DashboardEvent::CommandResult {
                    command: command.to_string(),
                    status: CommandStatus::Sent,
                });
                if *command == Command::Restart {
                    sink.emit(DashboardEvent::notice(
                        NoticeLevel::Warning,
                        "Restart requested, the rover will drop off the broker briefly",
                    ));
                }
                Ok(())
            }
            Err(e) => {
                error!("Command failed: {} - {}", command, e);
                sink.emit(DashboardEvent::CommandResult {
                    command: command.to_string(),
                    status: CommandStatus::Failed {
                        error: e.to_string(),
                    },
                });
                sink.emit(DashboardEvent::notice(NoticeLevel::Error, "Failed to send command"));
                Err(e)
            }
        }
    }
}

async fn publish(
    handle: &dyn TransportHandle,
    topics: &TopicSet,
    command: &Command,
    value: Option<i64>,
) -> Result<()> {
    let payload = CommandEnvelope::new(command, value).encode()?;
    handle.publish(&topics.commands, payload).await
}
