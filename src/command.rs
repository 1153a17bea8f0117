//! User commands.
//!
//! One command per input line: `Register`, `Advertise` or
//! `SendMessage <text>`. Keywords are case-insensitive; the message text is
//! taken verbatim after the first run of whitespace.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a command line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("SendMessage requires a message text")]
    MissingText,
}

/// A user request to the local engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Register with the root.
    Register,
    /// Ask the root for an attachment point.
    Advertise,
    /// Broadcast text across the overlay.
    SendMessage(String),
}

impl Command {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim_start()),
            None => (line, ""),
        };

        if keyword.eq_ignore_ascii_case("register") && rest.is_empty() {
            Ok(Command::Register)
        } else if keyword.eq_ignore_ascii_case("advertise") && rest.is_empty() {
            Ok(Command::Advertise)
        } else if keyword.eq_ignore_ascii_case("sendmessage") {
            if rest.is_empty() {
                Err(CommandError::MissingText)
            } else {
                Ok(Command::SendMessage(rest.to_string()))
            }
        } else {
            Err(CommandError::Unknown(line.to_string()))
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Register => write!(f, "Register"),
            Command::Advertise => write!(f, "Advertise"),
            Command::SendMessage(text) => write!(f, "SendMessage {}", text),
        }
    }
}
