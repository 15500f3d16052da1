//! Command frames and the status vocabulary of their responses.
//!
//! Wire format (host → device):
//! - `$0\n` start streaming
//! - `$1\n` stop streaming
//! - `$2,<rate>,<debug>\n` reconfigure; `debug` is `1` or `0`
//!
//! Responses (device → host) echo the command and append a status:
//! `$0,<status>`, `$1,<status>`, `$2,<rate>,<debug>,<status>`.

use serde::Serialize;
use std::fmt;

/// Wire prefix of the Start command.
pub const START_PREFIX: &str = "$0";
/// Wire prefix of the Stop command.
pub const STOP_PREFIX: &str = "$1";
/// Wire prefix of the Configure command.
pub const CONFIGURE_PREFIX: &str = "$2";

/// Command the host can send to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Begin emitting telemetry.
    Start,
    /// Stop emitting telemetry.
    Stop,
    /// Change sampling rate and debug mode.
    Configure {
        /// Sampling rate parameter, 1..=255.
        sampling_rate: u8,
        /// Debug flag, sent as `1`/`0`.
        debug: bool,
    },
}

impl CommandKind {
    /// Prefix the device echoes in its response.
    pub fn wire_prefix(&self) -> &'static str {
        match self {
            CommandKind::Start => START_PREFIX,
            CommandKind::Stop => STOP_PREFIX,
            CommandKind::Configure { .. } => CONFIGURE_PREFIX,
        }
    }

    /// Full newline-terminated command line.
    pub fn encode(&self) -> String {
        match self {
            CommandKind::Start | CommandKind::Stop => format!("{}\n", self.wire_prefix()),
            CommandKind::Configure {
                sampling_rate,
                debug,
            } => format!(
                "{},{},{}\n",
                CONFIGURE_PREFIX,
                sampling_rate,
                if *debug { 1 } else { 0 }
            ),
        }
    }

    /// `true` for prefixes that belong to a command (`$0`, `$1`, `$2`).
    pub fn is_command_prefix(prefix: &str) -> bool {
        matches!(prefix, START_PREFIX | STOP_PREFIX | CONFIGURE_PREFIX)
    }

    /// `true` if `frame` echoes this command's parameters ahead of its status.
    ///
    /// Start and Stop carry no parameters and always match. A Configure response must
    /// repeat `$2,<rate>,<debug>` exactly before the final status field.
    pub fn echo_matches(&self, frame: &str) -> bool {
        match self {
            CommandKind::Start | CommandKind::Stop => true,
            CommandKind::Configure { .. } => {
                let echoed = frame.rfind(',').map_or(frame, |idx| &frame[..idx]);
                echoed == self.encode().trim_end()
            }
        }
    }

    /// Status text of a response frame that echoes `prefix`.
    ///
    /// Configure responses carry the echoed parameters before the status, so the status
    /// is whatever follows the last comma. Start and Stop carry the status right after
    /// the first comma. A frame without a comma has no status.
    pub fn status_field<'a>(prefix: &str, frame: &'a str) -> &'a str {
        let split = if prefix == CONFIGURE_PREFIX {
            frame.rfind(',')
        } else {
            frame.find(',')
        };
        split.map_or("", |idx| &frame[idx + 1..])
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Start => f.write_str("start"),
            CommandKind::Stop => f.write_str("stop"),
            CommandKind::Configure {
                sampling_rate,
                debug,
            } => write!(f, "configure(rate={sampling_rate}, debug={debug})"),
        }
    }
}

/// Outcome of one command exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Device acknowledged with `ok`.
    Ok,
    /// Device answered `invalid command`.
    InvalidCommand,
    /// A status was present but not one the bridge knows.
    UndefinedStatus,
    /// The response echoed a different command than the one in flight.
    Mismatch,
    /// Nothing matched before the deadline; the device-side outcome is unknown.
    Timeout,
}

impl ResponseStatus {
    /// Classify a raw status field: trimmed, case-insensitive.
    pub fn from_status_text(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "ok" => ResponseStatus::Ok,
            "invalid command" => ResponseStatus::InvalidCommand,
            _ => ResponseStatus::UndefinedStatus,
        }
    }

    /// `true` only for [`ResponseStatus::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseStatus::Ok)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ResponseStatus::Ok => "ok",
            ResponseStatus::InvalidCommand => "invalid command",
            ResponseStatus::UndefinedStatus => "undefined status",
            ResponseStatus::Mismatch => "mismatched response",
            ResponseStatus::Timeout => "timeout",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_start_stop() {
        assert_eq!(CommandKind::Start.encode(), "$0\n");
        assert_eq!(CommandKind::Stop.encode(), "$1\n");
    }

    #[test]
    fn test_encode_configure() {
        let cmd = CommandKind::Configure {
            sampling_rate: 50,
            debug: true,
        };
        assert_eq!(cmd.encode(), "$2,50,1\n");
        assert_eq!(cmd.wire_prefix(), "$2");

        let quiet = CommandKind::Configure {
            sampling_rate: 255,
            debug: false,
        };
        assert_eq!(quiet.encode(), "$2,255,0\n");
    }

    #[test]
    fn test_command_prefixes() {
        assert!(CommandKind::is_command_prefix("$0"));
        assert!(CommandKind::is_command_prefix("$1"));
        assert!(CommandKind::is_command_prefix("$2"));
        assert!(!CommandKind::is_command_prefix("$3"));
        assert!(!CommandKind::is_command_prefix("$0.5"));
        assert!(!CommandKind::is_command_prefix("$12.3"));
    }

    #[test]
    fn test_status_field_start_uses_first_comma() {
        assert_eq!(CommandKind::status_field("$0", "$0,ok"), "ok");
        assert_eq!(CommandKind::status_field("$0", "$0,ok,extra"), "ok,extra");
        assert_eq!(CommandKind::status_field("$1", "$1"), "");
    }

    #[test]
    fn test_status_field_configure_uses_last_comma() {
        assert_eq!(
            CommandKind::status_field("$2", "$2,50,1,invalid command"),
            "invalid command"
        );
        assert_eq!(CommandKind::status_field("$2", "$2"), "");
    }

    #[test]
    fn test_configure_echo_must_repeat_parameters() {
        let cmd = CommandKind::Configure {
            sampling_rate: 50,
            debug: true,
        };
        assert!(cmd.echo_matches("$2,50,1,ok"));
        assert!(cmd.echo_matches("$2,50,1,invalid command"));
        assert!(!cmd.echo_matches("$2,60,0,ok"));
        assert!(!cmd.echo_matches("$2,50,ok"));
        assert!(!cmd.echo_matches("$2"));
        assert!(CommandKind::Start.echo_matches("$0,ok"));
    }

    #[test]
    fn test_status_classification_normalizes() {
        assert_eq!(ResponseStatus::from_status_text(" OK \r"), ResponseStatus::Ok);
        assert_eq!(
            ResponseStatus::from_status_text("Invalid Command"),
            ResponseStatus::InvalidCommand
        );
        assert_eq!(
            ResponseStatus::from_status_text("busy"),
            ResponseStatus::UndefinedStatus
        );
        assert_eq!(
            ResponseStatus::from_status_text(""),
            ResponseStatus::UndefinedStatus
        );
    }
}
