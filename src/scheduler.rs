use std::{cell::RefCell, rc::Rc, time::Duration};

use crate::{Clock, FlushError, FlushHandle, UpdateQueue, WriteBack};


/// Timer of the in-flight flush.
///
/// A flush first waits for the next tick so that every update issued in the current turn
/// has merged its options, then waits for the throttle interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTimer {
    Deferred { due: Duration },
    Waiting { due: Duration },
    /// The flush has already settled; the slot is released on the next tick.
    Releasing { due: Duration },
}
impl FlushTimer {
    pub fn due(self) -> Duration {
        match self {
            FlushTimer::Deferred { due }
            | FlushTimer::Waiting { due }
            | FlushTimer::Releasing { due } => due,
        }
    }
}

struct InFlight {
    handle: FlushHandle,
    timer: FlushTimer,
    armed_tick: u64,
    write_back: Rc<dyn WriteBack>,
    rate_limit_factor: f64,
}

struct FlushState {
    last_flush: Option<Duration>,
    in_flight: Option<InFlight>,
    tick: u64,
}

enum Step {
    Release,
    Arm(FlushTimer),
    Skip(InFlight),
    Flush(InFlight),
}

/// Turns the update queue into at most one in-flight write-back.
///
/// Requests made while a flush is in flight share its [`FlushHandle`].
pub struct FlushScheduler {
    state: RefCell<FlushState>,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(FlushState {
                last_flush: None,
                in_flight: None,
                tick: 0,
            }),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().in_flight.is_some()
    }
    pub fn timer(&self) -> Option<FlushTimer> {
        self.state.borrow().in_flight.as_ref().map(|f| f.timer)
    }
    pub fn last_flush(&self) -> Option<Duration> {
        self.state.borrow().last_flush
    }
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timer().map(FlushTimer::due)
    }

    /// Requests a flush of `queue` through `write_back`.
    ///
    /// Nothing is written before the next call to [`run_due`](Self::run_due).
    /// If the batch throttle is [`Throttle::Disabled`](crate::Throttle::Disabled),
    /// the queue is dropped and the returned handle is already settled with the current snapshot.
    ///
    /// While a flush is in flight, its handle is returned and nothing new is armed.
    /// This includes a flush skipped because of a disabled throttle: its slot stays taken
    /// until the next [`run_due`](Self::run_due), and updates queued before then stay in the queue
    /// until a later `schedule` picks them up.
    pub fn schedule(
        &self,
        queue: &RefCell<UpdateQueue>,
        clock: &dyn Clock,
        write_back: Rc<dyn WriteBack>,
    ) -> FlushHandle {
        if let Some(f) = &self.state.borrow().in_flight {
            return f.handle.clone();
        }
        let now = clock.now();
        let is_disabled = queue.borrow().options().throttle.is_disabled();
        let handle = FlushHandle::new();
        let timer = if is_disabled {
            FlushTimer::Releasing { due: now }
        } else {
            FlushTimer::Deferred { due: now }
        };
        let rate_limit_factor = write_back.rate_limit_factor();
        {
            let mut s = self.state.borrow_mut();
            let armed_tick = s.tick;
            s.in_flight = Some(InFlight {
                handle: handle.clone(),
                timer,
                armed_tick,
                write_back: write_back.clone(),
                rate_limit_factor,
            });
        }
        if is_disabled {
            tracing::debug!("skipping flush, throttle is disabled");
            queue.borrow_mut().drain_and_reset();
            handle.settle(Ok(write_back.current_snapshot()));
        }
        handle
    }

    /// Advances the in-flight flush through every timer state that is due.
    ///
    /// Timers armed during this call fire on a later call at the earliest,
    /// except that a zero throttle wait flushes right away.
    /// Returns `true` if anything happened.
    pub fn run_due(&self, queue: &RefCell<UpdateQueue>, clock: &dyn Clock) -> bool {
        let tick = {
            let mut s = self.state.borrow_mut();
            s.tick += 1;
            s.tick
        };
        let mut handled = false;
        loop {
            let now = clock.now();
            let step = {
                let mut state = self.state.borrow_mut();
                let s = &mut *state;
                let Some(f) = &s.in_flight else {
                    break;
                };
                if f.armed_tick >= tick || f.timer.due() > now {
                    break;
                }
                let timer = f.timer;
                let rate_limit_factor = f.rate_limit_factor;
                match timer {
                    FlushTimer::Releasing { .. } => Step::Release,
                    FlushTimer::Waiting { .. } => Step::Flush(take_in_flight(s)),
                    FlushTimer::Deferred { .. } => {
                        let throttle = queue.borrow().options().throttle;
                        match throttle.interval() {
                            None => Step::Skip(take_in_flight(s)),
                            Some(throttle) => {
                                let elapsed = s
                                    .last_flush
                                    .map_or(throttle, |last| now.saturating_sub(last));
                                let wait = scale(throttle.saturating_sub(elapsed), rate_limit_factor);
                                tracing::debug!(
                                    wait_ms = wait.as_millis() as u64,
                                    throttle_ms = throttle.as_millis() as u64,
                                    "scheduling flush"
                                );
                                if wait.is_zero() {
                                    Step::Flush(take_in_flight(s))
                                } else {
                                    Step::Arm(FlushTimer::Waiting { due: now + wait })
                                }
                            }
                        }
                    }
                }
            };
            handled = true;
            match step {
                Step::Release => {
                    self.state.borrow_mut().in_flight = None;
                }
                Step::Arm(timer) => {
                    if let Some(f) = &mut self.state.borrow_mut().in_flight {
                        f.timer = timer;
                        f.armed_tick = tick;
                    }
                }
                Step::Skip(f) => {
                    tracing::debug!("skipping flush, throttle is disabled");
                    queue.borrow_mut().drain_and_reset();
                    f.handle.settle(Ok(f.write_back.current_snapshot()));
                }
                Step::Flush(f) => self.flush(f, queue, clock),
            }
        }
        handled
    }

    fn flush(&self, f: InFlight, queue: &RefCell<UpdateQueue>, clock: &dyn Clock) {
        self.state.borrow_mut().last_flush = Some(clock.now());
        let batch = queue.borrow_mut().drain_and_reset();
        let mut snapshot = f.write_back.current_snapshot();
        if batch.is_empty() {
            f.handle.settle(Ok(snapshot));
            return;
        }
        tracing::debug!(
            entries = ?batch.entries,
            options = ?batch.options,
            "flushing"
        );
        batch.apply_to(&mut snapshot);
        match f.write_back.apply(&snapshot, &batch.options) {
            Ok(()) => f.handle.settle(Ok(snapshot)),
            Err(source) => {
                let keys = batch.keys();
                tracing::error!(keys = %keys.join(","), error = %source, "failed to write back");
                f.handle.settle(Err(FlushError {
                    snapshot,
                    keys,
                    source,
                }));
            }
        }
    }
}

impl Default for FlushScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the slot so that a request made during the write-back starts a new cycle.
fn take_in_flight(s: &mut FlushState) -> InFlight {
    match s.in_flight.take() {
        Some(f) => f,
        None => unreachable!("no flush in flight"),
    }
}

fn scale(d: Duration, factor: f64) -> Duration {
    let factor = if factor.is_finite() { factor.max(0.0) } else { 1.0 };
    Duration::try_from_secs_f64(d.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
