use std::{
    cell::RefCell,
    fmt::Display,
    rc::{Rc, Weak},
    str::FromStr,
};

use derive_ex::derive_ex;

use crate::{
    BindingCache, CallOptions, DecodeError, DepsEffect, Derived, FlushHandle, KeySpec,
    QueryContext, Subscription, SyncEvent, WriteBack,
};


pub type EncodeFn<V> = Rc<dyn Fn(&V) -> String>;
pub type EqFn<V> = Rc<dyn Fn(&V, &V) -> bool>;

/// A key of a [`QueryBinding`], with how to read and write it.
#[derive(Clone)]
pub struct BindingKey<V> {
    spec: KeySpec<V>,
    encode: EncodeFn<V>,
    default: Option<V>,
    eq: Option<EqFn<V>>,
    options: CallOptions,
}

impl<V> BindingKey<V> {
    pub fn new(
        key: impl Into<String>,
        decode: impl Fn(&str) -> Result<V, DecodeError> + 'static,
        encode: impl Fn(&V) -> String + 'static,
    ) -> Self {
        Self {
            spec: KeySpec::new(key, decode),
            encode: Rc::new(encode),
            default: None,
            eq: None,
            options: CallOptions::new(),
        }
    }

    /// Key whose value is read with [`FromStr`] and written with [`Display`].
    pub fn parse(key: impl Into<String>) -> Self
    where
        V: FromStr + Display,
        V::Err: Display,
    {
        Self::new(
            key,
            |raw| raw.parse().map_err(|e: V::Err| DecodeError::new(e.to_string())),
            |value| value.to_string(),
        )
    }

    /// Stores the value under `url_key` in the external resource instead of under the key name.
    pub fn with_url_key(mut self, url_key: impl Into<String>) -> Self {
        self.spec = self.spec.with_url_key(url_key);
        self
    }
    pub fn with_default(mut self, default: V) -> Self {
        self.default = Some(default);
        self
    }
    /// Compares values with `eq` instead of [`PartialEq`] when checking for the default.
    pub fn with_eq(mut self, eq: impl Fn(&V, &V) -> bool + 'static) -> Self {
        self.eq = Some(Rc::new(eq));
        self
    }
    /// Layers `options` over the options set so far.
    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options.or(self.options);
        self
    }
    /// Overrides [`BindingOptions::clear_on_default`] for this key.
    pub fn with_clear_on_default(mut self, clear_on_default: bool) -> Self {
        self.options.clear_on_default = Some(clear_on_default);
        self
    }

    pub fn spec(&self) -> &KeySpec<V> {
        &self.spec
    }
    pub fn state_key(&self) -> &str {
        &self.spec.state_key
    }
    pub fn url_key(&self) -> &str {
        &self.spec.url_key
    }
    pub fn default_value(&self) -> Option<&V> {
        self.default.as_ref()
    }
    pub fn encode(&self, value: &V) -> String {
        (self.encode)(value)
    }
    pub fn is_default(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        match (&self.default, &self.eq) {
            (Some(default), Some(eq)) => eq(default, value),
            (Some(default), None) => default == value,
            (None, _) => false,
        }
    }
}

/// Settings shared by every key of a [`QueryBinding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct BindingOptions {
    /// Used for the options a call and its key leave unset.
    pub call: CallOptions,
    /// Remove a key from the external resource when it is set to its default value.
    pub clear_on_default: bool,
}
impl BindingOptions {
    pub fn new() -> Self {
        Self {
            call: CallOptions::new(),
            clear_on_default: true,
        }
    }
    pub fn with_call(mut self, call: CallOptions) -> Self {
        self.call = call;
        self
    }
    pub fn with_clear_on_default(mut self, clear_on_default: bool) -> Self {
        self.clear_on_default = clear_on_default;
        self
    }
}

struct BindingData<V> {
    keys: Vec<BindingKey<V>>,
    cache: BindingCache<V>,
    bus_subscription: DepsEffect<Vec<String>>,
}

struct BindingNode<V> {
    ctx: QueryContext,
    write_back: Rc<dyn WriteBack>,
    options: BindingOptions,
    data: RefCell<BindingData<V>>,
    _navigate: Subscription,
}

/// A set of keys of the external resource, read as typed values and updated through the shared queue.
///
/// Values set by any binding of the same context are visible to every other binding
/// bound to the same key before they are flushed.
#[derive_ex(Clone, bound())]
pub struct QueryBinding<V: 'static>(Rc<BindingNode<V>>);

impl<V> QueryBinding<V>
where
    V: Clone + PartialEq + 'static,
{
    pub fn new(
        ctx: &QueryContext,
        write_back: Rc<dyn WriteBack>,
        keys: Vec<BindingKey<V>>,
        options: BindingOptions,
    ) -> Self {
        let node = Rc::new_cyclic(|this: &Weak<BindingNode<V>>| {
            let this = this.clone();
            let navigate = write_back.on_navigate(Rc::new(move || {
                if let Some(node) = this.upgrade() {
                    node.sync();
                }
            }));
            BindingNode {
                ctx: ctx.clone(),
                write_back,
                options,
                data: RefCell::new(BindingData {
                    keys,
                    cache: BindingCache::new(),
                    bus_subscription: DepsEffect::new(),
                }),
                _navigate: navigate,
            }
        });
        node.subscribe_bus();
        node.sync();
        Self(node)
    }

    /// Binding of a single key.
    pub fn single(
        ctx: &QueryContext,
        write_back: Rc<dyn WriteBack>,
        key: BindingKey<V>,
        options: BindingOptions,
    ) -> Self {
        Self::new(ctx, write_back, vec![key], options)
    }

    pub fn context(&self) -> &QueryContext {
        &self.0.ctx
    }

    /// Current values without defaults. The same `Rc` is returned as long as nothing changed.
    pub fn current(&self) -> Rc<Derived<V>> {
        self.0.data.borrow().cache.derived().clone()
    }

    /// Current value of `state_key`, or its default.
    pub fn get(&self, state_key: &str) -> Option<V> {
        let d = self.0.data.borrow();
        let key = d.keys.iter().find(|k| k.state_key() == state_key)?;
        d.cache
            .derived()
            .get(state_key)
            .or(key.default.as_ref())
            .cloned()
    }

    /// Current values of every key, defaults applied.
    pub fn values(&self) -> Derived<V> {
        let d = self.0.data.borrow();
        let derived = d.cache.derived();
        d.keys
            .iter()
            .map(|k| {
                let value = derived.get(k.state_key()).or(k.default.as_ref()).cloned();
                (k.state_key().to_string(), value)
            })
            .collect()
    }

    /// Sets the given keys and requests a flush.
    ///
    /// `None` removes a key. Unknown keys are ignored.
    /// Every binding of the context sees the new values before this returns.
    pub fn set<K: AsRef<str>>(
        &self,
        values: impl IntoIterator<Item = (K, Option<V>)>,
        options: CallOptions,
    ) -> FlushHandle {
        let events = self.0.enqueue(values, options);
        for e in &events {
            self.0.ctx.publish(e);
        }
        self.0.ctx.schedule(self.0.write_back.clone())
    }
    pub fn set_one(&self, state_key: &str, value: Option<V>, options: CallOptions) -> FlushHandle {
        self.set([(state_key, value)], options)
    }

    /// Sets the values returned by `f`, which receives the current values with defaults applied.
    pub fn update<K: AsRef<str>>(
        &self,
        f: impl FnOnce(&Derived<V>) -> Vec<(K, Option<V>)>,
        options: CallOptions,
    ) -> FlushHandle {
        let values = self.values();
        self.set(f(&values), options)
    }

    /// Removes every key.
    pub fn clear(&self, options: CallOptions) -> FlushHandle {
        let keys: Vec<String> = self
            .0
            .data
            .borrow()
            .keys
            .iter()
            .map(|k| k.state_key().to_string())
            .collect();
        self.set(keys.into_iter().map(|k| (k, None)), options)
    }

    /// Reads the external resource again. Returns `true` if any value changed.
    pub fn sync(&self) -> bool {
        self.0.sync()
    }

    /// Replaces the bound keys.
    pub fn set_keys(&self, keys: Vec<BindingKey<V>>) {
        self.0.data.borrow_mut().keys = keys;
        self.0.subscribe_bus();
        self.0.sync();
    }
}

impl<V> BindingNode<V>
where
    V: Clone + PartialEq + 'static,
{
    fn subscribe_bus(self: &Rc<Self>) {
        let this = Rc::downgrade(self);
        let bus = self.ctx.bus().clone();
        let mut d = self.data.borrow_mut();
        let d = &mut *d;
        let mut url_keys: Vec<String> = Vec::with_capacity(d.keys.len());
        for k in &d.keys {
            if !url_keys.iter().any(|u| u == k.url_key()) {
                url_keys.push(k.url_key().to_string());
            }
        }
        d.bus_subscription.run(url_keys, |url_keys| {
            tracing::debug!(keys = ?url_keys, "subscribing to sync bus");
            let subscriptions: Vec<Subscription> = url_keys
                .iter()
                .map(|url_key| {
                    let this = this.clone();
                    bus.subscribe_scoped(url_key.clone(), move |e: &SyncEvent| {
                        if let Some(node) = this.upgrade() {
                            node.on_sync(e);
                        }
                    })
                })
                .collect();
            Subscription::from_fn(move || drop(subscriptions))
        });
    }

    fn sync(&self) -> bool {
        let snapshot = self.write_back.current_snapshot();
        let queue = self.ctx.queue();
        let mut d = self.data.borrow_mut();
        let d = &mut *d;
        let specs: Vec<KeySpec<V>> = d.keys.iter().map(|k| k.spec.clone()).collect();
        let diff = d.cache.diff(&specs, &snapshot, &queue);
        if diff.changed {
            tracing::debug!(snapshot = %snapshot, "synced from external resource");
        }
        diff.changed
    }

    fn enqueue<K: AsRef<str>>(
        &self,
        values: impl IntoIterator<Item = (K, Option<V>)>,
        options: CallOptions,
    ) -> Vec<SyncEvent> {
        let d = self.data.borrow();
        let mut events = Vec::new();
        for (state_key, value) in values {
            let state_key = state_key.as_ref();
            let Some(key) = d.keys.iter().find(|k| k.state_key() == state_key) else {
                tracing::debug!(key = state_key, "ignoring unknown key");
                continue;
            };
            let options = options.or(key.options).or(self.options.call);
            let clear_on_default = options
                .clear_on_default
                .unwrap_or(self.options.clear_on_default);
            let value = match value {
                Some(v) if clear_on_default && key.is_default(&v) => None,
                value => value,
            };
            let query = self.ctx.enqueue(key.url_key(), value.as_ref(), |v| key.encode(v), options);
            events.push(SyncEvent::new(key.url_key(), query).with_state(value));
        }
        events
    }

    fn on_sync(&self, e: &SyncEvent) {
        let mut d = self.data.borrow_mut();
        let d = &mut *d;
        for key in d.keys.iter().filter(|k| k.url_key() == e.key) {
            let value = match e.state::<Option<V>>() {
                Some(value) => value.clone(),
                None => e.query.as_deref().and_then(|q| key.spec.decode(q)),
            };
            tracing::debug!(key = %e.key, query = ?e.query, "cross-key sync");
            d.cache
                .accept(key.state_key(), key.url_key(), e.query.clone(), value);
        }
    }
}
