//! Operator console input
//!
//! Turns one typed line into an [`OperatorIntent`] for the binary's main loop.

use thiserror::Error;

use crate::protocol::Command;
use crate::session::script::CommandScript;

pub const HELP: &str = "\
Commands:
  connect                   connect to the broker
  disconnect                disconnect from the broker
  rover <id>                switch to another rover (disconnects)
  status | restart          request status / restart the rover
  forward | backward | left | right | stop
  speed <n>                 set motor speed
  led on|off|toggle|blink|blink-stop
  blink-interval <ms>       set LED blink interval
  test                      run the connection test
  pattern                   run the LED pattern test
  send <command> [value]    send any command
  help                      show this text
  quit                      exit";

/// What the operator asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorIntent {
    Connect,
    Disconnect,
    SetRover(String),
    Send { command: Command, value: Option<i64> },
    RunScript(CommandScript),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("Unknown command: {0} (type 'help')")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a number: {0}")]
    InvalidNumber(String),
}

/// Parse one console line
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<OperatorIntent>, IntentError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let verb = verb.to_ascii_lowercase();

    let intent = match verb.as_str() {
        "connect" => OperatorIntent::Connect,
        "disconnect" => OperatorIntent::Disconnect,
        "rover" => match args.as_slice() {
            [id] => OperatorIntent::SetRover(id.to_string()),
            _ => return Err(IntentError::Usage("rover <id>")),
        },
        "status" => send(Command::Status, None),
        "restart" => send(Command::Restart, None),
        "forward" => send(Command::Forward, None),
        "backward" => send(Command::Backward, None),
        "left" => send(Command::Left, None),
        "right" => send(Command::Right, None),
        "stop" => send(Command::Stop, None),
        "speed" => match args.as_slice() {
            [n] => send(Command::Speed, Some(parse_number(n)?)),
            _ => return Err(IntentError::Usage("speed <n>")),
        },
        "led" => match args.as_slice() {
            ["on"] => send(Command::LedOn, None),
            ["off"] => send(Command::LedOff, None),
            ["toggle"] => send(Command::LedToggle, None),
            ["blink"] => send(Command::LedBlink, None),
            ["blink-stop"] => send(Command::LedBlinkStop, None),
            _ => return Err(IntentError::Usage("led on|off|toggle|blink|blink-stop")),
        },
        "blink-interval" => match args.as_slice() {
            [ms] => send(Command::LedBlinkInterval, Some(parse_number(ms)?)),
            _ => return Err(IntentError::Usage("blink-interval <ms>")),
        },
        "test" => OperatorIntent::RunScript(CommandScript::connection_test()),
        "pattern" => OperatorIntent::RunScript(CommandScript::led_pattern()),
        "send" => match args.as_slice() {
            [command] => send(Command::from(*command), None),
            [command, value] => send(Command::from(*command), Some(parse_number(value)?)),
            _ => return Err(IntentError::Usage("send <command> [value]")),
        },
        "help" | "?" => OperatorIntent::Help,
        "quit" | "exit" => OperatorIntent::Quit,
        _ => return Err(IntentError::Unknown(verb)),
    };

    Ok(Some(intent))
}

fn send(command: Command, value: Option<i64>) -> OperatorIntent {
    OperatorIntent::Send { command, value }
}

fn parse_number(text: &str) -> Result<i64, IntentError> {
    text.parse()
        .map_err(|_| IntentError::InvalidNumber(text.to_string()))
}
