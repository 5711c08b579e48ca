use std::{
    cell::{Ref, RefCell},
    rc::Rc,
    thread,
    time::Duration,
};

use crate::{
    BatchOptions, CallOptions, Clock, FlushHandle, FlushScheduler, QueueConfig, SyncBus,
    SyncEvent, SystemClock, UpdateQueue, WriteBack,
};

#[cfg(test)]
mod tests;

struct ContextData {
    config: QueueConfig,
    queue: RefCell<UpdateQueue>,
    scheduler: FlushScheduler,
    bus: Rc<SyncBus<String, SyncEvent>>,
    clock: Rc<dyn Clock>,
}

/// Update queue, flush scheduler and sync bus shared by every binding of one application.
///
/// Clones refer to the same context. Independent contexts share nothing.
#[derive(Clone)]
pub struct QueryContext(Rc<ContextData>);

impl QueryContext {
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
    pub fn with_clock(config: QueueConfig, clock: impl Clock) -> Self {
        Self(Rc::new(ContextData {
            queue: RefCell::new(UpdateQueue::new(config.min_throttle())),
            config,
            scheduler: FlushScheduler::new(),
            bus: Rc::new(SyncBus::new()),
            clock: Rc::new(clock),
        }))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.0.config
    }
    pub fn now(&self) -> Duration {
        self.0.clock.now()
    }

    /// Serializes `value` and queues it under `key`.
    ///
    /// Options left unset fall back to the context defaults.
    pub fn enqueue<V: ?Sized>(
        &self,
        key: &str,
        value: Option<&V>,
        serialize: impl FnOnce(&V) -> String,
        options: CallOptions,
    ) -> Option<String> {
        let value = value.map(serialize);
        self.enqueue_raw(key, value, options)
    }
    pub fn enqueue_raw(&self, key: &str, value: Option<String>, options: CallOptions) -> Option<String> {
        let options = options.or(self.0.config.defaults);
        self.0.queue.borrow_mut().enqueue_raw(key, value, options)
    }

    /// Pending value of `key`: `None` if nothing is queued, `Some(None)` for a queued removal.
    pub fn peek(&self, key: &str) -> Option<Option<String>> {
        self.0
            .queue
            .borrow()
            .peek(key)
            .map(|v| v.map(str::to_string))
    }
    pub fn pending_len(&self) -> usize {
        self.0.queue.borrow().len()
    }
    pub fn batch_options(&self) -> BatchOptions {
        *self.0.queue.borrow().options()
    }
    pub(crate) fn queue(&self) -> Ref<'_, UpdateQueue> {
        self.0.queue.borrow()
    }

    /// Requests a flush of the queue through `write_back`.
    ///
    /// Requests made before the flush starts share the returned handle.
    pub fn schedule(&self, write_back: Rc<dyn WriteBack>) -> FlushHandle {
        self.0
            .scheduler
            .schedule(&self.0.queue, &*self.0.clock, write_back)
    }
    pub fn is_flush_in_flight(&self) -> bool {
        self.0.scheduler.is_in_flight()
    }
    pub fn last_flush(&self) -> Option<Duration> {
        self.0.scheduler.last_flush()
    }

    pub fn bus(&self) -> &Rc<SyncBus<String, SyncEvent>> {
        &self.0.bus
    }
    /// Notifies the bindings listening on `event.key`.
    pub fn publish(&self, event: &SyncEvent) -> usize {
        tracing::debug!(key = %event.key, query = ?event.query, "publish");
        self.0.bus.publish(&event.key, event)
    }

    /// Fires every scheduler timer that is due. Returns `true` if anything happened.
    pub fn run_due(&self) -> bool {
        self.0.scheduler.run_due(&self.0.queue, &*self.0.clock)
    }
    pub fn next_deadline(&self) -> Option<Duration> {
        self.0.scheduler.next_deadline()
    }

    /// Drives the scheduler until no flush is in flight, sleeping the thread between deadlines.
    ///
    /// Only meaningful with a clock that advances by itself, such as [`SystemClock`].
    pub fn run_blocking(&self) {
        loop {
            self.run_due();
            let Some(deadline) = self.next_deadline() else {
                return;
            };
            let now = self.now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}
