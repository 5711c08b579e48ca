//! Batching, throttling and cross-binding synchronization of URL query state.
//!
//! Updates go into the [`UpdateQueue`] of a [`QueryContext`], are published right away to every
//! [`QueryBinding`] bound to the same key, and are written to the external resource by at most one
//! in-flight flush at a time.

mod binding;
mod clock;
mod config;
mod context;
mod differ;
mod effect;
mod error;
mod flush;
mod options;
mod queue;
mod scheduler;
mod snapshot;
mod subscription;
mod sync_bus;
mod write_back;

#[cfg(doctest)]
mod tests_readme;

pub use binding::*;
pub use clock::*;
pub use config::*;
pub use context::*;
pub use differ::*;
pub use effect::*;
pub use error::*;
pub use flush::*;
pub use options::*;
pub use queue::*;
pub use scheduler::*;
pub use snapshot::*;
pub use subscription::*;
pub use sync_bus::*;
pub use write_back::*;
