use std::{cell::Cell, rc::Rc, time::Duration};

use assert_call::{call, CallRecorder};
use pretty_assertions::assert_eq;

use super::*;
use crate::{HistoryMode, ManualClock, MemoryWriteBack, Snapshot, Throttle};

fn context() -> (QueryContext, ManualClock) {
    let clock = ManualClock::new();
    (QueryContext::with_clock(QueueConfig::new(), clock.clone()), clock)
}

#[test]
fn enqueue_and_peek() {
    let (ctx, _) = context();
    assert_eq!(ctx.enqueue("page", Some(&3), |v| v.to_string(), CallOptions::new()).as_deref(), Some("3"));
    ctx.enqueue_raw("q", None, CallOptions::new());
    assert_eq!(ctx.peek("page"), Some(Some("3".to_string())));
    assert_eq!(ctx.peek("q"), Some(None));
    assert_eq!(ctx.peek("other"), None);
    assert_eq!(ctx.pending_len(), 2);
}

#[test]
fn defaults_apply_to_unset_options() {
    let clock = ManualClock::new();
    let config = QueueConfig::new().with_defaults(
        CallOptions::new()
            .with_history(HistoryMode::Push)
            .with_throttle(Throttle::from_millis(200)),
    );
    let ctx = QueryContext::with_clock(config, clock);
    ctx.enqueue_raw("a", Some("1".into()), CallOptions::new().with_throttle(Throttle::from_millis(70)));
    let o = ctx.batch_options();
    assert_eq!(o.history, HistoryMode::Push);
    assert_eq!(o.throttle, Throttle::from_millis(70));
}

#[test]
fn min_throttle_comes_from_config() {
    let ctx = QueryContext::with_clock(
        QueueConfig::new().with_min_throttle(Duration::from_millis(120)),
        ManualClock::new(),
    );
    assert_eq!(ctx.batch_options().min_throttle(), Duration::from_millis(120));
    ctx.enqueue_raw("a", Some("1".into()), CallOptions::new().with_throttle(Throttle::from_millis(10)));
    assert_eq!(ctx.batch_options().throttle, Throttle::from_millis(120));
}

#[test]
fn schedule_and_run_due() {
    let (ctx, clock) = context();
    let wb = Rc::new(MemoryWriteBack::with_clock(Snapshot::new(), clock.clone()));
    ctx.enqueue_raw("a", Some("1".into()), CallOptions::new());
    let handle = ctx.schedule(wb.clone());
    assert!(ctx.is_flush_in_flight());
    assert_eq!(ctx.next_deadline(), Some(Duration::ZERO));
    assert!(ctx.run_due());
    assert!(handle.is_settled());
    assert_eq!(ctx.pending_len(), 0);
    assert_eq!(ctx.last_flush(), Some(Duration::ZERO));
    assert_eq!(wb.current_snapshot(), [("a", "1")].into_iter().collect::<Snapshot>());
    assert_eq!(ctx.next_deadline(), None);
}

#[test]
fn clones_share_state() {
    let (ctx, _) = context();
    let other = ctx.clone();
    other.enqueue_raw("a", Some("1".into()), CallOptions::new());
    assert_eq!(ctx.pending_len(), 1);
}

#[test]
fn independent_contexts() {
    let (a, _) = context();
    let (b, _) = context();
    a.enqueue_raw("a", Some("1".into()), CallOptions::new());
    assert_eq!(b.pending_len(), 0);
}

#[test]
fn publish_reaches_key_subscribers() {
    let mut cr = CallRecorder::new();
    let (ctx, _) = context();
    let _s = ctx
        .bus()
        .subscribe_scoped("a".into(), |e: &SyncEvent| call!("a {:?}", e.query));
    assert_eq!(ctx.publish(&SyncEvent::new("a", Some("1".into()))), 1);
    assert_eq!(ctx.publish(&SyncEvent::new("b", None)), 0);
    cr.verify("a Some(\"1\")");
}

#[test]
fn run_blocking_with_system_clock() {
    let ctx = QueryContext::new(QueueConfig::new().with_min_throttle(Duration::from_millis(5)));
    let wb = Rc::new(MemoryWriteBack::new(Snapshot::new()));
    ctx.enqueue_raw("a", Some("1".into()), CallOptions::new());
    ctx.schedule(wb.clone());
    ctx.run_blocking();

    ctx.enqueue_raw("a", Some("2".into()), CallOptions::new());
    let handle = ctx.schedule(wb.clone());
    ctx.run_blocking();
    assert!(handle.is_settled());
    assert!(!ctx.is_flush_in_flight());
    assert_eq!(wb.apply_count(), 2);
}

#[test]
fn reentrant_enqueue_from_handler() {
    let (ctx, _) = context();
    let count = Rc::new(Cell::new(0));
    let _s = ctx.bus().subscribe_scoped("a".into(), {
        let ctx = ctx.clone();
        let count = count.clone();
        move |e: &SyncEvent| {
            count.set(count.get() + 1);
            ctx.enqueue_raw("b", e.query.clone(), CallOptions::new());
        }
    });
    ctx.enqueue_raw("a", Some("1".into()), CallOptions::new());
    ctx.publish(&SyncEvent::new("a", Some("1".into())));
    assert_eq!(count.get(), 1);
    assert_eq!(ctx.peek("b"), Some(Some("1".into())));
}
