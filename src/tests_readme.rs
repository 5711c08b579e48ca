// #![include_doc("../README.md", start)]
//! # query-sync
//!
//! [![Crates.io](https://img.shields.io/crates/v/query-sync.svg)](https://crates.io/crates/query-sync)
//! [![Docs.rs](https://docs.rs/query-sync/badge.svg)](https://docs.rs/query-sync/)
//!
//! A single-threaded coordination core for state stored in a URL query string.
//!
//! - Updates to any number of keys made in the same turn are merged into one batch and written back once.
//! - Write-backs are throttled, so the mutation rate limit of the history API is not exceeded.
//! - Every binding to a key sees a new value immediately, before it reaches the URL.
//! - Derived values keep their identity while their raw values do not change.
//!
//! ## Example
//!
//! ```rust
//! use std::rc::Rc;
//! use query_sync::*;
//!
//! let ctx = QueryContext::new(QueueConfig::for_user_agent(None));
//! let history = Rc::new(MemoryWriteBack::new([("page", "2")].into_iter().collect()));
//! let page = QueryBinding::single(
//!     &ctx,
//!     history.clone(),
//!     BindingKey::<u32>::parse("page").with_default(1),
//!     BindingOptions::new(),
//! );
//!
//! page.set_one("page", Some(3), CallOptions::new().with_history(HistoryMode::Push));
//! assert_eq!(page.get("page"), Some(3));
//!
//! ctx.run_blocking();
//! assert_eq!(history.current_snapshot().get("page"), Some("3"));
//! ```
//!
//! The host drives time: call `QueryContext::run_due` whenever `QueryContext::next_deadline` is reached,
//! or `run_blocking` to sleep the current thread until the pending flush has completed.
//!
//! ## License
//!
//! This project is dual licensed under Apache-2.0/MIT.
//!
//! ## Contribution
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.
// #![include_doc("../README.md", end)]
