use std::cell::RefCell;

use assert_call::{call, CallRecorder};

use super::*;

#[test]
fn unsubscribes_on_drop() {
    let mut cr = CallRecorder::new();
    let s = Subscription::from_fn(|| call!("unsubscribe"));
    assert!(!s.is_empty());
    cr.verify(());
    drop(s);
    cr.verify("unsubscribe");
}

#[test]
fn empty_subscription() {
    let mut cr = CallRecorder::new();
    let s = Subscription::default();
    assert!(s.is_empty());
    assert_eq!(format!("{s:?}"), "Subscription(empty)");
    drop(s);
    cr.verify(());
}

#[test]
fn weak_target_alive() {
    let listeners = Rc::new(RefCell::new(vec!["a", "b"]));
    let s = Subscription::from_weak_fn(Rc::downgrade(&listeners), |l| {
        l.borrow_mut().retain(|x| *x != "a");
    });
    drop(s);
    assert_eq!(*listeners.borrow(), vec!["b"]);
}

#[test]
fn weak_target_dropped() {
    let mut cr = CallRecorder::new();
    let listeners = Rc::new(RefCell::new(Vec::<&str>::new()));
    let s = Subscription::from_weak_fn(Rc::downgrade(&listeners), |_| call!("unsubscribe"));
    drop(listeners);
    drop(s);
    cr.verify(());
}

#[test]
fn replacing_runs_previous() {
    let mut cr = CallRecorder::new();
    let mut s = Subscription::from_fn(|| call!("first"));
    s = Subscription::from_fn(|| call!("second"));
    cr.verify("first");
    drop(s);
    cr.verify("second");
}
