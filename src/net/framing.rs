//! Inbound command framing
//!
//! The server usually terminates commands with a newline but sometimes
//! sends bare tokens back to back. Messages are extracted by trying a
//! newline split first, then a known command token at the buffer start.
//! Unterminated bytes that can no longer begin a command are discarded so
//! junk cannot stall later tokens.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Command tokens the server may send without a terminator
pub const KNOWN_COMMANDS: [&str; 7] = [
    "forward", "backward", "left", "right", "stop", "sitdown", "standup",
];

/// A recognised remote command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    SitDown,
    StandUp,
}

impl RemoteCommand {
    /// Wire token
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
            Self::SitDown => "sitdown",
            Self::StandUp => "standup",
        }
    }
}

impl FromStr for RemoteCommand {
    type Err = Error;

    /// Parse a message, ignoring surrounding whitespace and case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "stop" => Ok(Self::Stop),
            "sitdown" => Ok(Self::SitDown),
            "standup" => Ok(Self::StandUp),
            other => Err(Error::Network(format!("unknown command: {other}"))),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Try to take one message from the front of `buffer`
///
/// Returns the trimmed message text and the number of bytes consumed, or
/// `None` when more data is needed.
#[must_use]
pub fn try_extract_one(buffer: &[u8]) -> Option<(String, usize)> {
    if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&buffer[..pos]).trim().to_string();
        return Some((line, pos + 1));
    }

    KNOWN_COMMANDS
        .iter()
        .find(|cmd| buffer.starts_with(cmd.as_bytes()))
        .map(|cmd| ((*cmd).to_string(), cmd.len()))
}

/// Whether a known command token starts at the front of `rest`
///
/// A short `rest` counts if it may still grow into a token. Case is ignored
/// there because a newline-terminated message is parsed case-insensitively.
fn could_begin_command(rest: &[u8]) -> bool {
    KNOWN_COMMANDS.iter().any(|cmd| {
        let cmd = cmd.as_bytes();
        rest.starts_with(cmd)
            || (rest.len() <= cmd.len() && rest.eq_ignore_ascii_case(&cmd[..rest.len()]))
    })
}

/// Accumulates socket reads and yields complete messages
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append bytes read from the socket
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract every complete message, in order
    ///
    /// Empty lines are consumed but not returned. Leading bytes that cannot
    /// begin a command are skipped up to the next possible token; whatever
    /// remains is a prefix of one.
    pub fn drain(&mut self) -> Vec<String> {
        let mut messages = Vec::new();
        loop {
            let mut consumed = 0;
            while let Some((message, len)) = try_extract_one(&self.buffer[consumed..]) {
                consumed += len;
                if !message.is_empty() {
                    messages.push(message);
                }
            }
            self.buffer.drain(..consumed);

            let skip = (0..self.buffer.len())
                .find(|&i| could_begin_command(&self.buffer[i..]))
                .unwrap_or(self.buffer.len());
            if skip == 0 {
                return messages;
            }
            tracing::debug!(bytes = skip, "discarding unframed bytes");
            self.buffer.drain(..skip);
        }
    }

    /// Bytes waiting for more data
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop buffered bytes, e.g. after a reconnect
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
