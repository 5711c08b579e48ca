use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
    time::Duration,
};

use slabmap::SlabMap;

use crate::{Clock, HistoryMode, ResolvedOptions, Snapshot, Subscription, SystemClock, WriteBackError};


/// Reads and mutates the external resource (for example the URL and its history).
pub trait WriteBack: 'static {
    fn current_snapshot(&self) -> Snapshot;

    /// Writes `snapshot` to the external resource.
    fn apply(&self, snapshot: &Snapshot, options: &ResolvedOptions) -> Result<(), WriteBackError>;

    /// Scale applied to the throttle wait computed by the scheduler.
    fn rate_limit_factor(&self) -> f64 {
        1.0
    }

    /// Registers `f` to be called when the resource changes out of band,
    /// such as on back/forward navigation.
    fn on_navigate(&self, f: Rc<dyn Fn()>) -> Subscription {
        let _ = f;
        Subscription::empty()
    }
}

/// Maximum number of writes accepted in any rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_calls: usize,
    pub window: Duration,
}

/// A write accepted by [`MemoryWriteBack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedWrite {
    pub snapshot: Snapshot,
    pub options: ResolvedOptions,
    pub at: Duration,
}

struct History {
    entries: Vec<Snapshot>,
    index: usize,
}
impl History {
    fn current(&self) -> &Snapshot {
        &self.entries[self.index]
    }
    fn push(&mut self, snapshot: Snapshot) {
        self.entries.truncate(self.index + 1);
        self.entries.push(snapshot);
        self.index = self.entries.len() - 1;
    }
    fn replace(&mut self, snapshot: Snapshot) {
        self.entries[self.index] = snapshot;
    }
}

type Listeners = Rc<RefCell<SlabMap<Rc<dyn Fn()>>>>;

/// In-memory history used as the external resource.
///
/// Records every accepted write and can emulate the mutation rate limit of browsers.
pub struct MemoryWriteBack {
    history: RefCell<History>,
    applied: RefCell<Vec<AppliedWrite>>,
    clock: Rc<dyn Clock>,
    rate_limit: Option<RateLimit>,
    calls: RefCell<VecDeque<Duration>>,
    rate_limit_factor: f64,
    fail_next: RefCell<Option<WriteBackError>>,
    attempts: Cell<usize>,
    listeners: Listeners,
}

impl MemoryWriteBack {
    pub fn new(initial: Snapshot) -> Self {
        Self::with_clock(initial, SystemClock::new())
    }
    pub fn with_clock(initial: Snapshot, clock: impl Clock) -> Self {
        Self {
            history: RefCell::new(History {
                entries: vec![initial],
                index: 0,
            }),
            applied: RefCell::new(Vec::new()),
            clock: Rc::new(clock),
            rate_limit: None,
            calls: RefCell::new(VecDeque::new()),
            rate_limit_factor: 1.0,
            fail_next: RefCell::new(None),
            attempts: Cell::new(0),
            listeners: Rc::new(RefCell::new(SlabMap::new())),
        }
    }
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
    pub fn with_rate_limit_factor(mut self, factor: f64) -> Self {
        self.rate_limit_factor = factor;
        self
    }

    /// Makes the next call to `apply` fail.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.borrow_mut() = Some(WriteBackError::rejected(message));
    }

    pub fn applied(&self) -> Vec<AppliedWrite> {
        self.applied.borrow().clone()
    }
    pub fn apply_count(&self) -> usize {
        self.applied.borrow().len()
    }
    /// Number of calls to `apply`, including rejected ones.
    pub fn attempt_count(&self) -> usize {
        self.attempts.get()
    }
    pub fn history_len(&self) -> usize {
        self.history.borrow().entries.len()
    }

    pub fn back(&self) -> bool {
        self.go(-1)
    }
    pub fn forward(&self) -> bool {
        self.go(1)
    }
    fn go(&self, delta: isize) -> bool {
        let moved = {
            let mut h = self.history.borrow_mut();
            match h.index.checked_add_signed(delta) {
                Some(index) if index < h.entries.len() => {
                    h.index = index;
                    true
                }
                _ => false,
            }
        };
        if moved {
            self.notify_navigate();
        }
        moved
    }

    /// Pushes `snapshot` as if the user navigated to it.
    pub fn navigate(&self, snapshot: Snapshot) {
        self.history.borrow_mut().push(snapshot);
        self.notify_navigate();
    }

    fn notify_navigate(&self) {
        let listeners: Vec<_> = self.listeners.borrow().values().cloned().collect();
        for f in listeners {
            f();
        }
    }

    fn check_rate_limit(&self, now: Duration) -> Result<(), WriteBackError> {
        let Some(limit) = self.rate_limit else {
            return Ok(());
        };
        let mut calls = self.calls.borrow_mut();
        while calls
            .front()
            .is_some_and(|&at| now.saturating_sub(at) >= limit.window)
        {
            calls.pop_front();
        }
        if calls.len() >= limit.max_calls {
            return Err(WriteBackError::rate_limited(format!(
                "more than {} updates in {}ms",
                limit.max_calls,
                limit.window.as_millis()
            )));
        }
        calls.push_back(now);
        Ok(())
    }
}

impl WriteBack for MemoryWriteBack {
    fn current_snapshot(&self) -> Snapshot {
        self.history.borrow().current().clone()
    }

    fn apply(&self, snapshot: &Snapshot, options: &ResolvedOptions) -> Result<(), WriteBackError> {
        self.attempts.set(self.attempts.get() + 1);
        if let Some(e) = self.fail_next.borrow_mut().take() {
            return Err(e);
        }
        let now = self.clock.now();
        self.check_rate_limit(now)?;
        let mut h = self.history.borrow_mut();
        match options.history {
            HistoryMode::Push => h.push(snapshot.clone()),
            HistoryMode::Replace => h.replace(snapshot.clone()),
        }
        self.applied.borrow_mut().push(AppliedWrite {
            snapshot: snapshot.clone(),
            options: *options,
            at: now,
        });
        Ok(())
    }

    fn rate_limit_factor(&self) -> f64 {
        self.rate_limit_factor
    }

    fn on_navigate(&self, f: Rc<dyn Fn()>) -> Subscription {
        let key = self.listeners.borrow_mut().insert(f);
        Subscription::from_weak_fn(Rc::downgrade(&self.listeners), move |listeners| {
            listeners.borrow_mut().remove(key);
        })
    }
}
