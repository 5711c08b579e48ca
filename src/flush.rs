use std::{
    cell::RefCell,
    fmt,
    future::Future,
    mem::take,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use slabmap::SlabMap;

use crate::{FlushError, Snapshot};

pub type FlushResult = Result<Snapshot, FlushError>;

struct FlushSlot {
    result: Option<FlushResult>,
    wakers: SlabMap<Waker>,
}

/// Outcome of a flush, shared by every caller whose request was coalesced into it.
///
/// All clones observe the same result. Awaiting a handle resolves once the flush settles.
pub struct FlushHandle {
    slot: Rc<RefCell<FlushSlot>>,
    key: Option<usize>,
}

impl FlushHandle {
    pub(crate) fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(FlushSlot {
                result: None,
                wakers: SlabMap::new(),
            })),
            key: None,
        }
    }
    /// Stores the result and wakes every waiting task. Only the first call has an effect.
    pub(crate) fn settle(&self, result: FlushResult) {
        let wakers = {
            let mut d = self.slot.borrow_mut();
            if d.result.is_some() {
                return;
            }
            d.result = Some(result);
            take(&mut d.wakers)
        };
        for (_, waker) in wakers {
            waker.wake();
        }
    }

    pub fn result(&self) -> Option<FlushResult> {
        self.slot.borrow().result.clone()
    }
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().result.is_some()
    }
    /// Returns `true` if both handles belong to the same flush.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Clone for FlushHandle {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            key: None,
        }
    }
}

impl Future for FlushHandle {
    type Output = FlushResult;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut d = this.slot.borrow_mut();
        if let Some(result) = &d.result {
            let result = result.clone();
            if let Some(key) = this.key.take() {
                d.wakers.remove(key);
            }
            return Poll::Ready(result);
        }
        match this.key {
            Some(key) => d.wakers[key].clone_from(cx.waker()),
            None => this.key = Some(d.wakers.insert(cx.waker().clone())),
        }
        Poll::Pending
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            if let Ok(mut d) = self.slot.try_borrow_mut() {
                d.wakers.remove(key);
            }
        }
    }
}

impl fmt::Debug for FlushHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.try_borrow() {
            Ok(d) => f.debug_tuple("FlushHandle").field(&d.result).finish(),
            Err(_) => write!(f, "FlushHandle(<borrowed>)"),
        }
    }
}
