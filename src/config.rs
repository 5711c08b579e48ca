use std::time::Duration;

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use crate::CallOptions;


/// Interval between two writes that the history API of most browsers accepts.
pub const DEFAULT_THROTTLE_MS: u64 = 50;

const SAFARI_17_THROTTLE_MS: u64 = 120;
const SAFARI_THROTTLE_MS: u64 = 320;

/// Settings of a [`QueryContext`](crate::QueryContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[derive_ex(Default)]
#[default(Self::new())]
#[serde(default)]
pub struct QueueConfig {
    /// Floor of every throttle and default batching interval.
    pub min_throttle_ms: u64,
    /// Options used when neither the call nor the binding specifies them.
    pub defaults: CallOptions,
}

impl QueueConfig {
    pub fn new() -> Self {
        Self {
            min_throttle_ms: DEFAULT_THROTTLE_MS,
            defaults: CallOptions::new(),
        }
    }
    pub fn for_user_agent(user_agent: Option<&str>) -> Self {
        Self::new().with_min_throttle(default_throttle(user_agent))
    }
    pub fn with_min_throttle(mut self, min_throttle: Duration) -> Self {
        self.min_throttle_ms = min_throttle.as_millis() as u64;
        self
    }
    pub fn with_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }
    pub fn min_throttle(&self) -> Duration {
        Duration::from_millis(self.min_throttle_ms)
    }
}

/// Minimum batching interval for the browser identified by `user_agent`.
///
/// Safari limits history updates to 100 calls per 30 seconds (per 10 seconds since 17).
pub fn default_throttle(user_agent: Option<&str>) -> Duration {
    let ms = match user_agent.map(str::to_ascii_lowercase) {
        Some(ua) if is_safari(&ua) => match safari_version(&ua) {
            Some(v) if v >= 17.0 => SAFARI_17_THROTTLE_MS,
            _ => SAFARI_THROTTLE_MS,
        },
        _ => DEFAULT_THROTTLE_MS,
    };
    Duration::from_millis(ms)
}

fn is_safari(ua: &str) -> bool {
    ua.contains("safari")
        && !ua.contains("chrome")
        && !ua.contains("chromium")
        && !ua.contains("android")
}

/// Reads `x.y` in `version/x.y[.z] safari`.
fn safari_version(ua: &str) -> Option<f64> {
    let start = ua.find("version/")? + "version/".len();
    let rest = &ua[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    if !rest[end..].trim_start().starts_with("safari") {
        return None;
    }
    let mut parts = rest[..end].split('.');
    let major = parts.next().filter(|s| !s.is_empty())?;
    let number = match parts.next().filter(|s| !s.is_empty()) {
        Some(minor) => format!("{major}.{minor}"),
        None => major.to_string(),
    };
    number.parse().ok()
}
