use std::{cell::Cell, rc::Rc, time::Duration, time::Instant};

use derive_ex::derive_ex;

/// Source of time for throttling.
///
/// Values are measured from an arbitrary, fixed origin.
pub trait Clock: 'static {
    fn now(&self) -> Duration;
}

/// Wall clock measured from its creation.
#[derive(Debug, Clone, Copy)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct SystemClock {
    origin: Instant,
}
impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<Duration>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn advance(&self, d: Duration) {
        self.0.set(self.0.get() + d);
    }
    pub fn advance_millis(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
    pub fn set(&self, now: Duration) {
        self.0.set(now);
    }
}
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}
