use std::{
    fmt,
    ops::{BitOr, BitOrAssign},
    time::Duration,
};

use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// How a flush affects the history of the external resource.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Display, FromStr, Serialize, Deserialize,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Keep the current history entry and only replace the query.
    #[default]
    Replace,
    /// Create a new history entry.
    Push,
}

/// `Push` is sticky: once any update in a batch asks for it, the batch keeps it.
impl BitOr for HistoryMode {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.max(rhs)
    }
}
impl BitOrAssign for HistoryMode {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Minimum spacing between two flushes.
///
/// `Disabled` stands for an infinite interval and orders above every `Interval`.
/// A batch whose throttle is `Disabled` is never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Throttle {
    Interval(Duration),
    Disabled,
}
impl Throttle {
    pub const fn from_millis(ms: u64) -> Self {
        Throttle::Interval(Duration::from_millis(ms))
    }
    pub fn is_disabled(self) -> bool {
        self == Throttle::Disabled
    }
    pub fn interval(self) -> Option<Duration> {
        match self {
            Throttle::Interval(d) => Some(d),
            Throttle::Disabled => None,
        }
    }

    /// Raise an interval to at least `min`.
    pub fn floor(self, min: Duration) -> Self {
        match self {
            Throttle::Interval(d) => Throttle::Interval(d.max(min)),
            Throttle::Disabled => Throttle::Disabled,
        }
    }
}
impl fmt::Display for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throttle::Interval(d) => write!(f, "{}ms", d.as_millis()),
            Throttle::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Display, PartialEq, Eq)]
#[display("invalid throttle `{0}`")]
pub struct ParseThrottleError(String);

impl std::error::Error for ParseThrottleError {}

impl std::str::FromStr for Throttle {
    type Err = ParseThrottleError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("disabled") || s.eq_ignore_ascii_case("infinity") {
            return Ok(Throttle::Disabled);
        }
        let digits = s.strip_suffix("ms").unwrap_or(s).trim();
        digits
            .parse::<u64>()
            .map(Throttle::from_millis)
            .map_err(|_| ParseThrottleError(s.to_string()))
    }
}
impl TryFrom<String> for Throttle {
    type Error = ParseThrottleError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
impl From<Throttle> for String {
    fn from(value: Throttle) -> Self {
        value.to_string()
    }
}

/// Options attached to a single update.
///
/// Every field is optional so that options can be layered:
/// call-level options over key-level options over binding-level options over context defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallOptions {
    pub history: Option<HistoryMode>,
    pub scroll: Option<bool>,
    pub shallow: Option<bool>,
    pub throttle: Option<Throttle>,
    /// Remove the key when it is set to its default value.
    ///
    /// Only read by [`QueryBinding`](crate::QueryBinding); batches ignore it.
    pub clear_on_default: Option<bool>,
}
impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = Some(history);
        self
    }
    pub fn with_scroll(mut self, scroll: bool) -> Self {
        self.scroll = Some(scroll);
        self
    }
    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = Some(shallow);
        self
    }
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Some(throttle);
        self
    }
    pub fn with_clear_on_default(mut self, clear_on_default: bool) -> Self {
        self.clear_on_default = Some(clear_on_default);
        self
    }

    /// Fill the fields left unset in `self` from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            history: self.history.or(fallback.history),
            scroll: self.scroll.or(fallback.scroll),
            shallow: self.shallow.or(fallback.shallow),
            throttle: self.throttle.or(fallback.throttle),
            clear_on_default: self.clear_on_default.or(fallback.clear_on_default),
        }
    }
}

/// Options shared by every update of the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub history: HistoryMode,
    pub scroll: bool,
    pub shallow: bool,
    pub throttle: Throttle,
    min_throttle: Duration,
}
impl BatchOptions {
    pub fn new(min_throttle: Duration) -> Self {
        Self {
            history: HistoryMode::Replace,
            scroll: false,
            shallow: true,
            throttle: Throttle::Interval(min_throttle),
            min_throttle,
        }
    }
    pub fn min_throttle(&self) -> Duration {
        self.min_throttle
    }
    pub fn reset(&mut self) {
        *self = Self::new(self.min_throttle);
    }
    pub fn resolve(&self) -> ResolvedOptions {
        ResolvedOptions {
            history: self.history,
            scroll: self.scroll,
            shallow: self.shallow,
            throttle: self.throttle,
        }
    }
}

/// Merge the options of one more update into the batch.
///
/// `push` and `scroll` are sticky, the least shallow request wins,
/// and the slowest throttle wins.
impl BitOrAssign<CallOptions> for BatchOptions {
    fn bitor_assign(&mut self, rhs: CallOptions) {
        if let Some(history) = rhs.history {
            self.history |= history;
        }
        if rhs.scroll == Some(true) {
            self.scroll = true;
        }
        if rhs.shallow == Some(false) {
            self.shallow = false;
        }
        let requested = rhs
            .throttle
            .unwrap_or(Throttle::Interval(self.min_throttle))
            .floor(self.min_throttle);
        self.throttle = self.throttle.max(requested);
    }
}
impl BitOr<CallOptions> for BatchOptions {
    type Output = Self;
    fn bitor(mut self, rhs: CallOptions) -> Self {
        self |= rhs;
        self
    }
}

/// Fully merged options handed to [`WriteBack::apply`](crate::WriteBack::apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOptions {
    pub history: HistoryMode,
    pub scroll: bool,
    pub shallow: bool,
    pub throttle: Throttle,
}
