//! Operator console commands.

use std::fmt;

/// A parsed line from the operator console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause(usize),
    Resume(usize),
    Status,
    Quit,
}

/// Reasons a console line was not understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleParseError {
    Empty,
    Unknown(String),
    MissingDevice(&'static str),
    InvalidDevice(String),
}

impl fmt::Display for ConsoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty command"),
            Self::Unknown(word) => write!(
                f,
                "unknown command '{word}' (try: pause <id>, resume <id>, status, quit)"
            ),
            Self::MissingDevice(cmd) => write!(f, "usage: {cmd} <id>"),
            Self::InvalidDevice(arg) => write!(f, "invalid device id '{arg}'"),
        }
    }
}

/// Parse one console line.
///
/// # Errors
///
/// Returns an error for blank lines, unknown verbs, and missing or
/// non-numeric device ids.
pub fn parse_console_command(line: &str) -> Result<ConsoleCommand, ConsoleParseError> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or(ConsoleParseError::Empty)?;
    match verb.to_ascii_lowercase().as_str() {
        "pause" | "p" => parse_device(words.next(), "pause").map(ConsoleCommand::Pause),
        "resume" | "r" => parse_device(words.next(), "resume").map(ConsoleCommand::Resume),
        "status" | "s" => Ok(ConsoleCommand::Status),
        "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
        _ => Err(ConsoleParseError::Unknown(verb.to_string())),
    }
}

fn parse_device(arg: Option<&str>, cmd: &'static str) -> Result<usize, ConsoleParseError> {
    let arg = arg.ok_or(ConsoleParseError::MissingDevice(cmd))?;
    match arg.parse::<usize>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ConsoleParseError::InvalidDevice(arg.to_string())),
    }
}
