use crate::Subscription;

#[cfg(test)]
mod tests;

/// Runs a body each time its dependencies change.
///
/// The [`Subscription`] returned by the body is dropped before the next run and when the effect is dropped.
pub struct DepsEffect<D> {
    deps: Option<D>,
    cleanup: Subscription,
    is_lazy: bool,
}

impl<D: PartialEq> DepsEffect<D> {
    pub fn new() -> Self {
        Self {
            deps: None,
            cleanup: Subscription::empty(),
            is_lazy: false,
        }
    }

    /// Creates an effect whose first run only records the dependencies.
    pub fn lazy() -> Self {
        Self {
            is_lazy: true,
            ..Self::new()
        }
    }

    pub fn deps(&self) -> Option<&D> {
        self.deps.as_ref()
    }

    /// Calls `body` if `deps` differs from the dependencies of the previous call.
    ///
    /// Returns `true` if `body` was called.
    pub fn run(&mut self, deps: D, body: impl FnOnce(&D) -> Subscription) -> bool {
        match &self.deps {
            Some(old) if *old == deps => return false,
            None if self.is_lazy => {
                self.deps = Some(deps);
                return false;
            }
            _ => {}
        }
        self.cleanup = Subscription::empty();
        self.cleanup = body(&deps);
        self.deps = Some(deps);
        true
    }

    /// Drops the last cleanup and forgets the dependencies, so the next [`run`](Self::run) always calls its body.
    pub fn reset(&mut self) {
        self.cleanup = Subscription::empty();
        self.deps = None;
        self.is_lazy = false;
    }
}

impl<D: PartialEq> Default for DepsEffect<D> {
    fn default() -> Self {
        Self::new()
    }
}
