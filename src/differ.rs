use std::{collections::HashMap, fmt, rc::Rc};

use derive_ex::derive_ex;

use crate::{DecodeError, Snapshot, UpdateQueue};


pub type DecodeFn<V> = Rc<dyn Fn(&str) -> Result<V, DecodeError>>;

/// A bound key: the name the binding exposes, the key in the external resource, and how to decode it.
#[derive_ex(Clone, bound())]
pub struct KeySpec<V> {
    pub state_key: String,
    pub url_key: String,
    decode: DecodeFn<V>,
}

impl<V> KeySpec<V> {
    pub fn new(key: impl Into<String>, decode: impl Fn(&str) -> Result<V, DecodeError> + 'static) -> Self {
        let state_key = key.into();
        Self {
            url_key: state_key.clone(),
            state_key,
            decode: Rc::new(decode),
        }
    }
    pub fn with_url_key(mut self, url_key: impl Into<String>) -> Self {
        self.url_key = url_key.into();
        self
    }

    /// Decodes `raw`. A failure is reported and yields `None`.
    pub fn decode(&self, raw: &str) -> Option<V> {
        match (self.decode)(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let e = e.at(&self.url_key, raw);
                tracing::warn!(key = %self.url_key, raw, error = %e, "failed to decode");
                None
            }
        }
    }
}
impl<V> fmt::Debug for KeySpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySpec")
            .field("state_key", &self.state_key)
            .field("url_key", &self.url_key)
            .finish()
    }
}

/// Derived values of a binding, in key order.
///
/// Never mutated once shared: a change produces a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive_ex(Default, bound())]
pub struct Derived<V> {
    entries: Vec<(String, Option<V>)>,
}

impl<V> Derived<V> {
    pub fn get(&self, state_key: &str) -> Option<&V> {
        self.entry(state_key)?.as_ref()
    }
    pub fn contains_key(&self, state_key: &str) -> bool {
        self.entry(state_key).is_some()
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&V>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, state_key: &str) -> Option<&Option<V>> {
        self.entries
            .iter()
            .find(|(k, _)| k == state_key)
            .map(|(_, v)| v)
    }
}
impl<V: Clone> Derived<V> {
    /// Copy with the value of `state_key` replaced. An unknown key is appended.
    pub fn with(&self, state_key: &str, value: Option<V>) -> Self {
        let mut entries = self.entries.clone();
        match entries.iter_mut().find(|(k, _)| k == state_key) {
            Some(e) => e.1 = value,
            None => entries.push((state_key.to_string(), value)),
        }
        Self { entries }
    }
}
impl<V> FromIterator<(String, Option<V>)> for Derived<V> {
    fn from_iter<T: IntoIterator<Item = (String, Option<V>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Result of [`BindingCache::diff`].
#[derive(Debug)]
pub struct Diff<V> {
    pub derived: Rc<Derived<V>>,
    pub changed: bool,
}

/// Raw values and derived values last seen by one binding.
///
/// Owned by that binding only.
pub struct BindingCache<V> {
    raw: HashMap<String, Option<String>>,
    derived: Rc<Derived<V>>,
    is_primed: bool,
}

impl<V: Clone> BindingCache<V> {
    pub fn new() -> Self {
        Self {
            raw: HashMap::new(),
            derived: Rc::new(Derived::default()),
            is_primed: false,
        }
    }

    pub fn derived(&self) -> &Rc<Derived<V>> {
        &self.derived
    }

    /// Last raw value seen for `url_key`.
    ///
    /// `None` if the key was never seen, `Some(None)` if it was absent.
    pub fn raw(&self, url_key: &str) -> Option<Option<&str>> {
        self.raw.get(url_key).map(|v| v.as_deref())
    }

    /// Recomputes the derived values of `specs`.
    ///
    /// A key's raw value is its pending value in `queue` if any, its value in `snapshot` otherwise.
    /// Only keys whose raw value changed are decoded again.
    /// When nothing changed and the key set is the same, the previous container is returned as is.
    pub fn diff(&mut self, specs: &[KeySpec<V>], snapshot: &Snapshot, queue: &UpdateQueue) -> Diff<V> {
        let mut changed = false;
        let mut raw = HashMap::with_capacity(specs.len());
        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let current = match queue.peek(&spec.url_key) {
                Some(pending) => pending.map(str::to_string),
                None => snapshot.get(&spec.url_key).map(str::to_string),
            };
            let cached = self.raw.get(&spec.url_key);
            let value = match (cached, self.derived.entry(&spec.state_key)) {
                (Some(cached), Some(value)) if *cached == current => value.clone(),
                _ => {
                    changed = true;
                    current.as_deref().and_then(|r| spec.decode(r))
                }
            };
            entries.push((spec.state_key.clone(), value));
            raw.insert(spec.url_key.clone(), current);
        }
        if !changed {
            changed = !self.is_primed
                || self.derived.len() != specs.len()
                || specs.iter().any(|s| !self.derived.contains_key(&s.state_key));
        }
        if !changed {
            return Diff {
                derived: self.derived.clone(),
                changed: false,
            };
        }
        self.raw = raw;
        self.derived = Rc::new(Derived { entries });
        self.is_primed = true;
        Diff {
            derived: self.derived.clone(),
            changed: true,
        }
    }

    /// Records a value received from another binding without decoding it.
    pub fn accept(&mut self, state_key: &str, url_key: &str, raw: Option<String>, value: Option<V>) -> Rc<Derived<V>> {
        self.raw.insert(url_key.to_string(), raw);
        self.derived = Rc::new(self.derived.with(state_key, value));
        self.derived.clone()
    }
}

impl<V: Clone> Default for BindingCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
