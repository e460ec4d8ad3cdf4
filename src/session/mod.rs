//! # Session Controller
//!
//! Owns the broker connection lifecycle for one rover at a time.
//!
//! All state changes happen on the caller's task: transport callbacks,
//! timers and script steps arrive as [`SessionEvent`]s on a queue that the
//! caller drains into [`SessionController::handle_event`].
//!
//! ## State machine
//!
//! ```text
//! Disconnected --connect--> Connecting --ack--> Connected
//!      ^                        |  ^                |
//!      |                      error reconnecting    |
//!      +------------------------+  |                |
//!      +---- error / offline / disconnect ----------+
//! ```

pub mod dispatcher;
pub mod script;

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::presentation::{DashboardEvent, NoticeLevel, PresentationSink};
use crate::protocol::{Command, RoverId, TopicSet};
use crate::telemetry::snapshot::{LedSnapshot, TelemetrySnapshot};
use crate::telemetry::TelemetryRouter;
use crate::transport::{SessionId, TransportEvent, TransportEventSender, TransportFactory, TransportHandle};
use dispatcher::CommandDispatcher;
use script::CommandScript;

const CLIENT_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const CLIENT_ID_SUFFIX_LEN: usize = 9;

/// Connection status as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        };
        f.write_str(label)
    }
}

/// Everything the controller reacts to besides direct operator calls
#[derive(Debug)]
pub enum SessionEvent {
    /// Lifecycle or message event from the transport opened by `session`
    Transport {
        session: SessionId,
        event: TransportEvent,
    },

    /// Grace period after `session` connected elapsed
    StatusRefreshDue { session: SessionId },

    /// A script step is due
    ScriptStep {
        script: String,
        index: usize,
        command: Command,
        value: Option<i64>,
    },

    /// A script's last delay elapsed
    ScriptFinished { script: String },
}

/// Receiving end of the session event queue
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

/// Tunables for the controller
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub client_id_prefix: String,
    pub status_request_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            client_id_prefix: "rover-dashboard".to_string(),
            status_request_delay: Duration::from_millis(500),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            client_id_prefix: config.broker.client_id_prefix.clone(),
            status_request_delay: Duration::from_millis(config.session.status_request_delay_ms),
        }
    }
}

struct ActiveTransport {
    session: SessionId,
    handle: Box<dyn TransportHandle>,
}

/// Connection lifecycle, command dispatch and telemetry routing for one rover
pub struct SessionController<F: TransportFactory, S: PresentationSink> {
    factory: F,
    sink: S,
    settings: SessionSettings,
    rover_id: RoverId,
    state: ConnectionState,
    transport: Option<ActiveTransport>,
    next_session: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
    router: TelemetryRouter,
    dispatcher: CommandDispatcher,
}

impl<F: TransportFactory, S: PresentationSink> SessionController<F, S> {
    /// Create a disconnected controller and the queue it expects to be fed from
    pub fn new(factory: F, sink: S, rover_id: RoverId, settings: SessionSettings) -> (Self, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            factory,
            sink,
            settings,
            rover_id,
            state: ConnectionState::Disconnected,
            transport: None,
            next_session: 0,
            events: tx,
            router: TelemetryRouter::new(),
            dispatcher: CommandDispatcher::new(),
        };
        (controller, SessionEvents { rx })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn rover_id(&self) -> &RoverId {
        &self.rover_id
    }

    /// Topics for the current rover id
    pub fn topics(&self) -> TopicSet {
        TopicSet::for_rover(&self.rover_id)
    }

    pub fn telemetry(&self) -> &TelemetrySnapshot {
        self.router.telemetry()
    }

    pub fn led(&self) -> &LedSnapshot {
        self.router.led()
    }

    /// Open a broker connection for the current rover
    ///
    /// A no-op with a notice when already Connected. Any handle left over
    /// from an earlier attempt is closed before the new one is opened.
    pub async fn connect(&mut self) {
        if self.is_connected() {
            info!("Connect requested while already connected");
            self.notice(NoticeLevel::Info, "Already connected to broker!");
            return;
        }

        self.close_transport().await;
        self.set_state(ConnectionState::Connecting, "Connecting...");
        self.notice(NoticeLevel::Info, "Connecting to broker...");

        self.next_session += 1;
        let session = self.next_session;
        let client_id = generate_client_id(&self.settings.client_id_prefix);
        let events = TransportEventSender::new(session, self.events.clone());

        match self.factory.open(&client_id, events) {
            Ok(handle) => {
                debug!("Opened transport for session {} as {}", session, client_id);
                self.transport = Some(ActiveTransport { session, handle });
            }
            Err(e) => {
                error!("Failed to connect: {}", e);
                self.set_state(ConnectionState::Disconnected, "Failed to connect");
                self.notice(NoticeLevel::Error, format!("Failed to connect: {}", e));
            }
        }
    }

    /// Close the connection and reset telemetry to idle
    pub async fn disconnect(&mut self) {
        self.close_transport().await;
        self.set_state(ConnectionState::Disconnected, "Disconnected");
        self.reset_telemetry();
        self.notice(NoticeLevel::Info, "Disconnected from rover");
    }

    /// Switch to another rover
    ///
    /// Tears down any live session first. Does not reconnect.
    pub async fn set_rover_id(&mut self, rover_id: RoverId) {
        if rover_id == self.rover_id {
            return;
        }

        if self.transport.is_some() || self.state != ConnectionState::Disconnected {
            self.disconnect().await;
        }

        info!("Rover ID changed to: {}", rover_id);
        self.rover_id = rover_id;
        self.notice(
            NoticeLevel::Info,
            format!("Rover ID changed to: {}", self.rover_id),
        );
    }

    /// Publish one command to the current rover
    ///
    /// # Errors
    ///
    /// - `NotConnected` unless the session is Connected
    /// - `Publish` when the transport refuses the message
    pub async fn dispatch(&mut self, command: impl Into<Command>, value: Option<i64>) -> Result<()> {
        let command = command.into();
        let topics = self.topics();
        let link = if self.is_connected() {
            self.transport.as_ref().map(|active| active.handle.as_ref())
        } else {
            None
        };

        self.dispatcher
            .dispatch(link, &topics, &command, value, &mut self.sink)
            .await
    }

    /// Start playing a script
    ///
    /// Steps are dispatched through [`Self::dispatch`] as they come due, so a
    /// step that fires after the connection dropped fails like any other
    /// command.
    pub fn run_script(&mut self, script: CommandScript) -> Result<()> {
        if !self.is_connected() {
            warn!("Script {} rejected: not connected", script.name());
            self.notice(NoticeLevel::Error, "Please connect first");
            return Err(DashboardError::NotConnected);
        }

        info!("Starting {}", script.name());
        self.notice(NoticeLevel::Info, format!("Running {}...", script.name()));
        script.spawn(self.events.clone());
        Ok(())
    }

    /// React to one queued event
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport { session, event } => {
                let current = self.transport.as_ref().map(|active| active.session);
                if current != Some(session) {
                    debug!("Ignoring {:?} from stale session {}", event, session);
                    return;
                }
                self.on_transport_event(event).await;
            }
            SessionEvent::StatusRefreshDue { session } => {
                let current = self.transport.as_ref().map(|active| active.session);
                if current != Some(session) || !self.is_connected() {
                    debug!("Skipping initial status request for session {}", session);
                    return;
                }
                if self.dispatch(Command::Status, None).await.is_ok() {
                    info!("Requested initial status from rover");
                }
            }
            SessionEvent::ScriptStep {
                script,
                index,
                command,
                value,
            } => {
                debug!("{} step {}: {}", script, index, command);
                // Failures are reported through the sink
                let _ = self.dispatch(command, value).await;
            }
            SessionEvent::ScriptFinished { script } => {
                info!("{} completed", script);
                self.notice(NoticeLevel::Success, format!("{} completed", script));
            }
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.set_state(ConnectionState::Connected, "Connected to broker");
                self.notice(NoticeLevel::Success, "Connected to broker");
                self.subscribe_rover_topics().await;
                self.schedule_status_refresh();
            }
            TransportEvent::Message { topic, payload } => {
                let topics = self.topics();
                if let Some(event) = self.router.route(&topics, &topic, &payload) {
                    self.sink.emit(event);
                }
            }
            TransportEvent::Error(message) => {
                error!("Connection error: {}", message);
                self.set_state(ConnectionState::Disconnected, "Connection Error");
                self.notice(NoticeLevel::Error, format!("Connection error: {}", message));
            }
            TransportEvent::Offline => {
                warn!("Disconnected from MQTT broker");
                self.transport = None;
                self.set_state(ConnectionState::Disconnected, "Disconnected");
                self.reset_telemetry();
                self.notice(NoticeLevel::Warning, "Disconnected from MQTT broker");
            }
            TransportEvent::Reconnecting => {
                info!("Reconnecting to MQTT broker");
                self.set_state(ConnectionState::Connecting, "Reconnecting...");
            }
        }
    }

    async fn subscribe_rover_topics(&mut self) {
        let topics = self.topics();
        let Some(active) = self.transport.as_ref() else {
            return;
        };

        let mut failures = Vec::new();
        for topic in [&topics.status, &topics.led] {
            match active.handle.subscribe(topic).await {
                Ok(()) => info!("Subscribed to {}", topic),
                Err(e) => {
                    error!("Failed to subscribe to {}: {}", topic, e);
                    failures.push(topic.clone());
                }
            }
        }

        for topic in failures {
            self.notice(NoticeLevel::Error, format!("Failed to subscribe to {}", topic));
        }
    }

    fn schedule_status_refresh(&self) {
        let Some(session) = self.transport.as_ref().map(|active| active.session) else {
            return;
        };
        let events = self.events.clone();
        let delay = self.settings.status_request_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::StatusRefreshDue { session });
        });
    }

    async fn close_transport(&mut self) {
        if let Some(active) = self.transport.take() {
            debug!("Closing transport for session {}", active.session);
            if let Err(e) = active.handle.close().await {
                warn!("Error while closing transport: {}", e);
            }
        }
    }

    fn reset_telemetry(&mut self) {
        self.router.reset();
        self.sink.emit(DashboardEvent::TelemetryReset);
    }

    fn set_state(&mut self, state: ConnectionState, reason: &str) {
        info!("Connection state: {} ({})", state, reason);
        self.state = state;
        self.sink.emit(DashboardEvent::ConnectionStateChanged {
            state,
            reason: reason.to_string(),
        });
    }

    fn notice(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.sink.emit(DashboardEvent::notice(level, message));
    }
}

/// `<prefix>-<9 random base-36 characters>`
pub fn generate_client_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..CLIENT_ID_SUFFIX_LEN)
        .map(|_| CLIENT_ID_ALPHABET[rng.gen_range(0..CLIENT_ID_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::mocks::RecordingSink;
    use crate::presentation::CommandStatus;
    use crate::telemetry::snapshot::{LedIndicator, MovementState, RssiTier};
    use crate::transport::binding::mocks::RecordingFactory;
    use bytes::Bytes;
    use mockall::mock;

    mock! {
        Factory {}

        impl TransportFactory for Factory {
            fn open(&self, client_id: &str, events: TransportEventSender) -> Result<Box<dyn TransportHandle>>;
        }
    }

    type TestController = SessionController<RecordingFactory, RecordingSink>;

    fn controller() -> (TestController, SessionEvents, RecordingFactory, RecordingSink) {
        let factory = RecordingFactory::new();
        let sink = RecordingSink::new();
        let (controller, events) = SessionController::new(
            factory.clone(),
            sink.clone(),
            RoverId::new("ROVER_001").unwrap(),
            SessionSettings::default(),
        );
        (controller, events, factory, sink)
    }

    /// Feed every already-queued event to the controller
    async fn pump(controller: &mut TestController, events: &mut SessionEvents) {
        while let Some(event) = events.try_recv() {
            controller.handle_event(event).await;
        }
    }

    async fn connected() -> (TestController, SessionEvents, RecordingFactory, RecordingSink) {
        let (mut controller, mut events, factory, sink) = controller();
        controller.connect().await;
        factory.emit(TransportEvent::Connected);
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Connected);
        (controller, events, factory, sink)
    }

    fn message(topic: &str, payload: &str) -> TransportEvent {
        TransportEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::from(payload.to_string()),
        }
    }

    fn published_commands(factory: &RecordingFactory) -> Vec<String> {
        factory
            .published()
            .iter()
            .map(|(_, payload)| {
                let json: serde_json::Value = serde_json::from_slice(payload).unwrap();
                json["command"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn test_client_id_format() {
        let id = generate_client_id("rover-dashboard");
        let suffix = id.strip_prefix("rover-dashboard-").unwrap();

        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_connect_then_ack_subscribes() {
        let (mut controller, mut events, factory, sink) = controller();

        controller.connect().await;
        assert_eq!(controller.state(), ConnectionState::Connecting);
        assert_eq!(factory.opened(), 1);
        assert!(factory.client_ids()[0].starts_with("rover-dashboard-"));

        factory.emit(TransportEvent::Connected);
        pump(&mut controller, &mut events).await;

        assert_eq!(controller.state(), ConnectionState::Connected);
        assert_eq!(
            sink.states(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
        assert_eq!(
            factory.subscriptions(),
            vec!["rover/status/ROVER_001", "rover/led/ROVER_001"]
        );
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let (mut controller, _events, factory, sink) = connected().await;

        controller.connect().await;

        assert_eq!(factory.opened(), 1);
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert!(sink.has_notice(NoticeLevel::Info, "Already connected"));
    }

    #[tokio::test]
    async fn test_open_failure_leaves_disconnected() {
        let mut factory = MockFactory::new();
        factory
            .expect_open()
            .times(1)
            .returning(|_, _| Err(DashboardError::Transport("broker unreachable".to_string())));
        let sink = RecordingSink::new();
        let (mut controller, _events) = SessionController::new(
            factory,
            sink.clone(),
            RoverId::new("ROVER_001").unwrap(),
            SessionSettings::default(),
        );

        controller.connect().await;

        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(sink.has_notice(NoticeLevel::Error, "broker unreachable"));
    }

    #[tokio::test]
    async fn test_dispatch_requires_connected() {
        let (mut controller, mut events, factory, _sink) = controller();

        let result = controller.dispatch(Command::Forward, None).await;
        assert!(matches!(result, Err(DashboardError::NotConnected)));

        controller.connect().await;
        pump(&mut controller, &mut events).await;
        let result = controller.dispatch(Command::Forward, None).await;
        assert!(matches!(result, Err(DashboardError::NotConnected)));

        assert!(factory.published().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_publishes_to_current_rover() {
        let (mut controller, _events, factory, sink) = connected().await;

        tokio_test::assert_ok!(controller.dispatch(Command::Speed, Some(200)).await);

        let published = factory.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "rover/commands/ROVER_001");
        assert_eq!(
            sink.command_results(),
            vec![("speed".to_string(), CommandStatus::Sent)]
        );
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_connection() {
        let (mut controller, _events, factory, sink) = connected().await;
        factory.set_publish_error("request queue full");

        let error = tokio_test::assert_err!(controller.dispatch("forward", None).await);

        assert!(matches!(error, DashboardError::Publish(_)));
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert!(matches!(
            sink.command_results().last(),
            Some((_, CommandStatus::Failed { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_request_after_grace_period() {
        let (mut controller, mut events, factory, _sink) = connected().await;

        let early = tokio::time::timeout(Duration::from_millis(499), events.recv()).await;
        assert!(early.is_err());
        assert!(factory.published().is_empty());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::StatusRefreshDue { .. }));
        controller.handle_event(event).await;

        assert_eq!(published_commands(&factory), vec!["status"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_request_skipped_after_disconnect() {
        let (mut controller, mut events, factory, _sink) = connected().await;
        controller.disconnect().await;

        let event = events.recv().await.unwrap();
        controller.handle_event(event).await;

        assert!(factory.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_request_from_replaced_session_ignored() {
        let (mut controller, mut events, factory, _sink) = connected().await;
        controller.disconnect().await;
        controller.connect().await;
        factory.emit(TransportEvent::Connected);
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Connected);

        for _ in 0..2 {
            let event = events.recv().await.unwrap();
            assert!(matches!(event, SessionEvent::StatusRefreshDue { .. }));
            controller.handle_event(event).await;
        }

        assert_eq!(published_commands(&factory), vec!["status"]);
    }

    #[tokio::test]
    async fn test_disconnect_after_error_closes_transport() {
        let (mut controller, mut events, factory, _sink) = connected().await;

        factory.emit(TransportEvent::Error("connection reset".to_string()));
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert_eq!(factory.closed(), 0);

        controller.disconnect().await;
        assert_eq!(factory.closed(), 1);

        controller.disconnect().await;
        assert_eq!(factory.closed(), 1);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_error_then_reconnect_resubscribes() {
        let (mut controller, mut events, factory, sink) = connected().await;

        factory.emit(TransportEvent::Error("connection reset".to_string()));
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(sink.has_notice(NoticeLevel::Error, "connection reset"));

        factory.emit(TransportEvent::Reconnecting);
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Connecting);

        factory.emit(TransportEvent::Connected);
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Connected);
        assert_eq!(factory.opened(), 1);
        assert_eq!(factory.subscriptions().len(), 4);
    }

    #[tokio::test]
    async fn test_reconnecting_does_not_resubscribe() {
        let (mut controller, mut events, factory, sink) = connected().await;
        assert_eq!(factory.subscriptions().len(), 2);

        factory.emit(TransportEvent::Reconnecting);
        pump(&mut controller, &mut events).await;

        assert_eq!(controller.state(), ConnectionState::Connecting);
        assert_eq!(factory.subscriptions().len(), 2);
        assert_eq!(sink.states().last(), Some(&ConnectionState::Connecting));

        factory.emit(TransportEvent::Connected);
        pump(&mut controller, &mut events).await;
        assert_eq!(factory.subscriptions().len(), 4);
    }

    #[tokio::test]
    async fn test_offline_resets_telemetry() {
        let (mut controller, mut events, factory, sink) = connected().await;
        factory.emit(message("rover/status/ROVER_001", r#"{"wifi_rssi": -45}"#));
        pump(&mut controller, &mut events).await;
        assert!(controller.telemetry().signal.is_some());

        factory.emit(TransportEvent::Offline);
        pump(&mut controller, &mut events).await;

        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(controller.telemetry().signal.is_none());
        assert!(sink.events().contains(&DashboardEvent::TelemetryReset));

        // The transport is gone; later events from it are ignored
        factory.emit(TransportEvent::Connected);
        pump(&mut controller, &mut events).await;
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_resets() {
        let (mut controller, mut events, factory, sink) = connected().await;
        factory.emit(message("rover/led/ROVER_001", r#"{"led_state": "on"}"#));
        pump(&mut controller, &mut events).await;
        assert!(controller.led().led_on);

        controller.disconnect().await;

        assert_eq!(factory.closed(), 1);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!controller.led().led_on);
        assert!(sink.events().contains(&DashboardEvent::TelemetryReset));
    }

    #[tokio::test]
    async fn test_events_from_stale_transport_ignored() {
        let (mut controller, mut events, factory, _sink) = controller();

        controller.connect().await;
        controller.disconnect().await;
        controller.connect().await;
        assert_eq!(factory.opened(), 2);

        factory.emit_from(0, TransportEvent::Connected);
        factory.emit_from(0, message("rover/status/ROVER_001", r#"{"wifi_rssi": -30}"#));
        pump(&mut controller, &mut events).await;

        assert_eq!(controller.state(), ConnectionState::Connecting);
        assert!(controller.telemetry().signal.is_none());
        assert!(factory.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_while_connecting_replaces_transport() {
        let (mut controller, _events, factory, _sink) = controller();

        controller.connect().await;
        controller.connect().await;

        assert_eq!(factory.opened(), 2);
        assert_eq!(factory.closed(), 1);
        assert_eq!(controller.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_telemetry_routing() {
        let (mut controller, mut events, factory, sink) = connected().await;

        factory.emit(message(
            "rover/status/ROVER_001",
            r#"{"wifi_rssi": -62, "ip": "10.0.0.7", "uptime": 3725, "movement": "forward", "speed": 180}"#,
        ));
        factory.emit(message(
            "rover/led/ROVER_001",
            r#"{"led_state": "off", "led_blinking": "yes", "blink_interval": 250}"#,
        ));
        factory.emit(message("rover/status/ROVER_002", r#"{"wifi_rssi": -10}"#));
        pump(&mut controller, &mut events).await;

        let telemetry = controller.telemetry();
        assert_eq!(telemetry.signal.as_ref().unwrap().tier, RssiTier::Medium);
        assert_eq!(telemetry.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(telemetry.uptime.as_deref(), Some("1h 2m 5s"));
        assert_eq!(telemetry.movement.state, MovementState::Forward);
        assert_eq!(telemetry.speed, Some(180));
        assert_eq!(
            controller.led().indicator(),
            LedIndicator::Blinking { interval_ms: 250 }
        );

        let updates = sink
            .events()
            .iter()
            .filter(|event| matches!(event, DashboardEvent::TelemetryUpdated { .. }))
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_raw_status_shown_verbatim() {
        let (mut controller, mut events, factory, sink) = connected().await;

        factory.emit(message("rover/status/ROVER_001", "booting"));
        pump(&mut controller, &mut events).await;

        assert!(sink.events().contains(&DashboardEvent::RawStatus {
            text: "booting".to_string()
        }));
        assert_eq!(controller.telemetry().movement.label, "booting");
    }

    #[tokio::test]
    async fn test_set_rover_id_disconnects_first() {
        let (mut controller, _events, factory, sink) = connected().await;
        sink.clear();

        controller
            .set_rover_id(RoverId::new("ROVER_002").unwrap())
            .await;

        assert_eq!(factory.closed(), 1);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert_eq!(controller.rover_id().as_str(), "ROVER_002");
        assert_eq!(controller.topics().commands, "rover/commands/ROVER_002");
        assert_eq!(sink.states(), vec![ConnectionState::Disconnected]);
        assert_eq!(factory.opened(), 1);
    }

    #[tokio::test]
    async fn test_messages_routed_by_current_rover() {
        let (mut controller, mut events, factory, _sink) = controller();
        controller
            .set_rover_id(RoverId::new("ROVER_002").unwrap())
            .await;
        controller.connect().await;
        factory.emit(TransportEvent::Connected);
        factory.emit(message("rover/status/ROVER_001", r#"{"speed": 10}"#));
        factory.emit(message("rover/status/ROVER_002", r#"{"speed": 20}"#));
        pump(&mut controller, &mut events).await;

        assert_eq!(controller.telemetry().speed, Some(20));
        assert_eq!(
            factory.subscriptions(),
            vec!["rover/status/ROVER_002", "rover/led/ROVER_002"]
        );
    }

    #[tokio::test]
    async fn test_script_requires_connection() {
        let (mut controller, _events, factory, sink) = controller();

        let result = controller.run_script(CommandScript::connection_test());

        assert!(matches!(result, Err(DashboardError::NotConnected)));
        assert!(sink.has_notice(NoticeLevel::Error, "Please connect first"));
        assert!(factory.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_test_script_plays_in_order() {
        let (mut controller, mut events, factory, sink) = connected().await;
        let start = tokio::time::Instant::now();

        controller
            .run_script(CommandScript::connection_test())
            .unwrap();

        loop {
            let event = events.recv().await.unwrap();
            let finished = matches!(event, SessionEvent::ScriptFinished { .. });
            controller.handle_event(event).await;
            if finished {
                break;
            }
        }

        assert_eq!(start.elapsed(), Duration::from_millis(3500));
        let commands: Vec<String> = published_commands(&factory)
            .into_iter()
            .filter(|command| command.starts_with("led"))
            .collect();
        assert_eq!(
            commands,
            vec!["led_on", "led_off", "led_on", "led_off", "led_blink", "led_blink_stop"]
        );
        assert!(sink.has_notice(NoticeLevel::Success, "Connection test completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_steps_fail_after_disconnect() {
        let (mut controller, mut events, factory, sink) = connected().await;
        controller
            .run_script(CommandScript::new("short").then(Command::LedOn, 100).then(Command::LedOff, 0))
            .unwrap();

        // First step goes out while still connected
        let first = loop {
            let event = events.recv().await.unwrap();
            if matches!(event, SessionEvent::ScriptStep { .. }) {
                break event;
            }
            controller.handle_event(event).await;
        };
        controller.handle_event(first).await;
        controller.disconnect().await;

        while let Some(event) = events.recv().await {
            let finished = matches!(event, SessionEvent::ScriptFinished { .. });
            controller.handle_event(event).await;
            if finished {
                break;
            }
        }

        assert_eq!(published_commands(&factory), vec!["led_on"]);
        assert!(sink
            .command_results()
            .iter()
            .any(|(command, status)| command == "led_off" && *status != CommandStatus::Sent));
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Connect,
        Disconnect,
        Ack,
        Error,
        Offline,
        Reconnecting,
    }

    const OPS: [Op; 6] = [
        Op::Connect,
        Op::Disconnect,
        Op::Ack,
        Op::Error,
        Op::Offline,
        Op::Reconnecting,
    ];

    #[tokio::test]
    async fn test_state_machine_sequences() {
        for a in OPS {
            for b in OPS {
                for c in OPS {
                    for d in OPS {
                        check_sequence(&[a, b, c, d]).await;
                    }
                }
            }
        }
    }

    /// Run a sequence against the controller and a reference model
    async fn check_sequence(ops: &[Op]) {
        let (mut controller, mut events, factory, _sink) = controller();
        let mut expected = ConnectionState::Disconnected;
        let mut live = false;
        let mut last_terminal_was_ack = false;

        for op in ops {
            match op {
                Op::Connect => {
                    controller.connect().await;
                    if expected != ConnectionState::Connected {
                        live = true;
                        expected = ConnectionState::Connecting;
                    }
                }
                Op::Disconnect => {
                    controller.disconnect().await;
                    live = false;
                    expected = ConnectionState::Disconnected;
                    last_terminal_was_ack = false;
                }
                Op::Ack | Op::Error | Op::Offline | Op::Reconnecting => {
                    let event = match op {
                        Op::Ack => TransportEvent::Connected,
                        Op::Error => TransportEvent::Error("boom".to_string()),
                        Op::Offline => TransportEvent::Offline,
                        _ => TransportEvent::Reconnecting,
                    };
                    if factory.opened() > 0 {
                        factory.emit(event);
                    }
                    pump(&mut controller, &mut events).await;

                    if live {
                        match op {
                            Op::Ack => {
                                expected = ConnectionState::Connected;
                                last_terminal_was_ack = true;
                            }
                            Op::Error => {
                                expected = ConnectionState::Disconnected;
                                last_terminal_was_ack = false;
                            }
                            Op::Offline => {
                                live = false;
                                expected = ConnectionState::Disconnected;
                                last_terminal_was_ack = false;
                            }
                            _ => expected = ConnectionState::Connecting,
                        }
                    }
                }
            }

            assert_eq!(controller.state(), expected, "after {:?}", ops);
            if controller.state() == ConnectionState::Connected {
                assert!(last_terminal_was_ack, "connected without ack: {:?}", ops);
            }
        }
    }
}
