use std::{
    any::Any,
    borrow::Borrow,
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    hash::Hash,
    rc::Rc,
};

use crate::Subscription;

#[cfg(test)]
mod tests;

/// Identifies a handler registered on a [`SyncBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

struct Handler<E> {
    id: HandlerId,
    is_active: Cell<bool>,
    f: Box<dyn Fn(&E)>,
}

/// Per-key fan-out of values that have been set but not necessarily flushed yet.
///
/// Handlers run synchronously, in subscription order.
/// A handler removed while an event is being published is not called for that event,
/// and a handler added during publication only sees later events.
pub struct SyncBus<K, E> {
    handlers: RefCell<HashMap<K, Vec<Rc<Handler<E>>>>>,
    next_id: Cell<usize>,
}

impl<K, E> SyncBus<K, E>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    E: 'static,
{
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn subscribe(&self, key: K, f: impl Fn(&E) + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        tracing::debug!(key = ?key, id = id.0, "subscribe");
        self.handlers
            .borrow_mut()
            .entry(key)
            .or_default()
            .push(Rc::new(Handler {
                id,
                is_active: Cell::new(true),
                f: Box::new(f),
            }));
        id
    }

    /// Like [`subscribe`](Self::subscribe), but unsubscribes when the returned value is dropped.
    pub fn subscribe_scoped(self: &Rc<Self>, key: K, f: impl Fn(&E) + 'static) -> Subscription {
        let id = self.subscribe(key.clone(), f);
        Subscription::from_weak_fn(Rc::downgrade(self), move |this| {
            this.unsubscribe(&key, id);
        })
    }

    /// Returns `false` if `id` was not subscribed to `key`.
    pub fn unsubscribe<Q>(&self, key: &Q, id: HandlerId) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + fmt::Debug + ?Sized,
    {
        let mut handlers = self.handlers.borrow_mut();
        let Some(list) = handlers.get_mut(key) else {
            return false;
        };
        let Some(index) = list.iter().position(|h| h.id == id) else {
            return false;
        };
        list.remove(index).is_active.set(false);
        if list.is_empty() {
            handlers.remove(key);
        }
        tracing::debug!(key = ?key, id = id.0, "unsubscribe");
        true
    }

    /// Calls every handler subscribed to `key` when publication starts.
    ///
    /// Returns the number of handlers called.
    pub fn publish<Q>(&self, key: &Q, event: &E) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let targets = match self.handlers.borrow().get(key) {
            Some(list) => list.clone(),
            None => return 0,
        };
        let mut count = 0;
        for h in targets {
            if h.is_active.get() {
                (h.f)(event);
                count += 1;
            }
        }
        count
    }

    pub fn subscriber_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.handlers.borrow().get(key).map_or(0, |list| list.len())
    }
    pub fn is_empty(&self) -> bool {
        self.handlers.borrow().is_empty()
    }
}

impl<K, E> Default for SyncBus<K, E>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    E: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Value published on the bus of a [`QueryContext`](crate::QueryContext) when a key is set.
///
/// Sent before the flush: receivers must not assume the external resource has been updated.
#[derive(Clone)]
pub struct SyncEvent {
    pub key: String,
    /// Serialized value, `None` for a removal.
    pub query: Option<String>,
    /// Decoded value as seen by the publisher, if any.
    pub state: Option<Rc<dyn Any>>,
}
impl SyncEvent {
    pub fn new(key: impl Into<String>, query: Option<String>) -> Self {
        Self {
            key: key.into(),
            query,
            state: None,
        }
    }
    pub fn with_state<T: 'static>(mut self, state: T) -> Self {
        self.state = Some(Rc::new(state));
        self
    }
    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.as_ref()?.downcast_ref()
    }
}
impl fmt::Debug for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEvent")
            .field("key", &self.key)
            .field("query", &self.query)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}
