use std::{error::Error, fmt};

use parse_display::Display;

use crate::Snapshot;

/// Failure of a key's decode function.
///
/// Local to one key: the derived value of that key becomes `None`.
#[derive(Debug, Clone, Display, PartialEq, Eq)]
#[display("cannot decode `{raw}` for key `{key}`: {message}")]
pub struct DecodeError {
    pub key: String,
    pub raw: String,
    pub message: String,
}
impl DecodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            key: String::new(),
            raw: String::new(),
            message: message.into(),
        }
    }
    pub(crate) fn at(mut self, key: &str, raw: &str) -> Self {
        self.key = key.to_string();
        self.raw = raw.to_string();
        self
    }
}
impl Error for DecodeError {}

#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
#[display(style = "kebab-case")]
pub enum WriteBackErrorKind {
    /// The external resource refused the mutation because of its rate limit.
    RateLimited,
    Rejected,
}

/// Failure reported by [`WriteBack::apply`](crate::WriteBack::apply).
#[derive(Debug, Clone, Display, PartialEq, Eq)]
#[display("{kind}: {message}")]
pub struct WriteBackError {
    pub kind: WriteBackErrorKind,
    pub message: String,
}
impl WriteBackError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: WriteBackErrorKind::RateLimited,
            message: message.into(),
        }
    }
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: WriteBackErrorKind::Rejected,
            message: message.into(),
        }
    }
    pub fn is_rate_limited(&self) -> bool {
        self.kind == WriteBackErrorKind::RateLimited
    }
}
impl Error for WriteBackError {}

/// A flush whose write-back failed.
///
/// Carries the snapshot that was attempted. The batch is consumed and is not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushError {
    pub snapshot: Snapshot,
    pub keys: Vec<String>,
    pub source: WriteBackError,
}
impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to flush [{}] to `{}`: {}",
            self.keys.join(","),
            self.snapshot,
            self.source
        )
    }
}
impl Error for FlushError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
