//! # Rover Dashboard
//!
//! Drive a rover and watch its telemetry over an MQTT broker.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, or `config/default.toml`)
//!    - Set up logging to stderr and, optionally, daily log files
//!    - Restore the last rover id
//!
//! 2. **Main Loop**
//!    - Feed session events (transport, timers, scripts) to the controller
//!    - Parse operator lines from stdin into commands
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Close the broker connection
//!
//! Dashboard output goes to stdout, logs to stderr.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rover_dashboard::config::{Config, LoggingConfig, RoverIdStore};
use rover_dashboard::console::{parse_line, OperatorIntent, HELP};
use rover_dashboard::error::DashboardError;
use rover_dashboard::presentation::{ConsoleSink, PresentationSink};
use rover_dashboard::protocol::RoverId;
use rover_dashboard::session::{SessionController, SessionSettings};
use rover_dashboard::telemetry::recorder::TelemetryRecorder;
use rover_dashboard::transport::{MqttTransportFactory, TransportFactory};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const LOG_FILE_PREFIX: &str = "rover-dashboard.log";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let (config, config_found) = load_config(&config_path)?;

    let _log_guard = init_logging(&config.logging)?;
    info!("Rover Dashboard v{} starting...", env!("CARGO_PKG_VERSION"));
    if !config_found {
        warn!("No configuration at {}, using defaults", config_path);
    }

    let store = RoverIdStore::new(&config.rover.state_file);
    let rover_id = initial_rover_id(&config, &store)?;
    info!("Rover ID: {}", rover_id);

    let mut sink = ConsoleSink::new(std::io::stdout());
    if config.telemetry.record {
        let recorder = TelemetryRecorder::new(&config.telemetry)
            .context("Failed to set up telemetry recording")?;
        sink = sink.with_recorder(recorder);
    }

    let factory = MqttTransportFactory::new(config.broker.clone());
    info!("Broker: {}", factory.broker_address());

    let (mut session, mut events) =
        SessionController::new(factory, sink, rover_id, SessionSettings::from(&config));

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                session.handle_event(event).await;
            }

            line = lines.next_line() => {
                match line.context("Failed to read operator input")? {
                    Some(line) => {
                        if !handle_line(&mut session, &store, &line).await {
                            break;
                        }
                    }
                    None => {
                        info!("Operator input closed, shutting down...");
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.disconnect().await;

    Ok(())
}

/// Load configuration, falling back to defaults when the file is missing
///
/// Returns the configuration and whether the file existed.
fn load_config(path: &str) -> Result<(Config, bool)> {
    match Config::load(path) {
        Ok(config) => Ok((config, true)),
        Err(DashboardError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok((Config::default(), false)),
        Err(e) => Err(e).with_context(|| format!("Invalid configuration in {}", path)),
    }
}

/// Console logging plus optional daily-rolling files
///
/// `RUST_LOG` takes precedence over the configured level. The returned guard
/// flushes the file writer on drop.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(Path::new(dir), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            Ok(None)
        }
    }
}

/// Saved rover id if there is one, otherwise the configured default
fn initial_rover_id(config: &Config, store: &RoverIdStore) -> Result<RoverId> {
    match store.load() {
        Ok(Some(rover_id)) => return Ok(rover_id),
        Ok(None) => {}
        Err(e) => warn!("Could not read {}: {}", store.path().display(), e),
    }
    RoverId::new(&config.rover.default_id).context("Invalid default rover id")
}

/// Act on one operator line; returns false when the operator asked to quit
async fn handle_line<F, S>(session: &mut SessionController<F, S>, store: &RoverIdStore, line: &str) -> bool
where
    F: TransportFactory,
    S: PresentationSink,
{
    let intent = match parse_line(line) {
        Ok(Some(intent)) => intent,
        Ok(None) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    match intent {
        OperatorIntent::Connect => session.connect().await,
        OperatorIntent::Disconnect => session.disconnect().await,
        OperatorIntent::SetRover(raw) => match RoverId::new(&raw) {
            Ok(rover_id) => {
                session.set_rover_id(rover_id).await;
                if let Err(e) = store.save(session.rover_id()) {
                    warn!("Failed to save rover id: {}", e);
                }
            }
            Err(e) => println!("{}", e),
        },
        OperatorIntent::Send { command, value } => {
            // Failures are reported through the sink
            let _ = session.dispatch(command, value).await;
        }
        OperatorIntent::RunScript(script) => {
            let _ = session.run_script(script);
        }
        OperatorIntent::Help => println!("{}", HELP),
        OperatorIntent::Quit => return false,
    }

    true
}
