//! Trait abstraction for the broker connection to enable testing

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::session::SessionEvent;

/// Identifies one transport handle for the lifetime of a session
pub type SessionId = u64;

/// Lifecycle and inbound-message events reported by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker acknowledged the connection
    Connected,
    /// Inbound publish on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Connection-level failure
    Error(String),
    /// Transport gave up; no further events will follow
    Offline,
    /// Transport is retrying the connection on its own
    Reconnecting,
}

/// Delivers transport events into the session event queue
///
/// Every event is tagged with the session that opened the transport so the
/// controller can drop events from a handle it already tore down.
#[derive(Debug, Clone)]
pub struct TransportEventSender {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl TransportEventSender {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    /// Queue an event; returns false once the controller is gone
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// One open broker connection
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Subscribe to a topic (at-most-once)
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publish a payload (at-most-once, not retained)
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Opens transport handles
pub trait TransportFactory: Send {
    /// Start connecting with the given client id
    ///
    /// Lifecycle events for the new handle are delivered through `events`.
    fn open(&self, client_id: &str, events: TransportEventSender) -> Result<Box<dyn TransportHandle>>;
}
