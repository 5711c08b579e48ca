use std::{cell::Cell, rc::Rc};

use assert_call::{call, CallRecorder};

use super::*;

type Bus = SyncBus<String, String>;

#[test]
fn publish_in_subscription_order() {
    let mut cr = CallRecorder::new();
    let bus = Bus::new();
    bus.subscribe("q".into(), |e| call!("a {e}"));
    bus.subscribe("q".into(), |e| call!("b {e}"));
    bus.subscribe("other".into(), |e| call!("c {e}"));

    assert_eq!(bus.publish("q", &"x".to_string()), 2);
    cr.verify(["a x", "b x"]);
}

#[test]
fn publish_without_subscribers() {
    let mut cr = CallRecorder::new();
    let bus = Bus::new();
    assert_eq!(bus.publish("q", &"x".to_string()), 0);
    cr.verify(());
}

#[test]
fn late_subscriber_does_not_see_past_events() {
    let mut cr = CallRecorder::new();
    let bus = Bus::new();
    bus.publish("q", &"x".to_string());
    bus.subscribe("q".into(), |e| call!("{e}"));
    cr.verify(());
    bus.publish("q", &"y".to_string());
    cr.verify("y");
}

#[test]
fn unsubscribe() {
    let mut cr = CallRecorder::new();
    let bus = Bus::new();
    let a = bus.subscribe("q".into(), |e| call!("a {e}"));
    bus.subscribe("q".into(), |e| call!("b {e}"));
    assert!(bus.unsubscribe("q", a));
    assert!(!bus.unsubscribe("q", a));
    bus.publish("q", &"x".to_string());
    cr.verify("b x");
    assert_eq!(bus.subscriber_count("q"), 1);
}

#[test]
fn unsubscribe_self_during_publish() {
    let mut cr = CallRecorder::new();
    let bus = Rc::new(Bus::new());
    let id = Rc::new(Cell::new(None));
    let a = bus.subscribe("q".into(), {
        let bus = Rc::downgrade(&bus);
        let id = id.clone();
        move |e| {
            call!("a {e}");
            if let (Some(bus), Some(id)) = (bus.upgrade(), id.get()) {
                assert!(bus.unsubscribe("q", id));
            }
        }
    });
    id.set(Some(a));
    bus.subscribe("q".into(), |e| call!("b {e}"));

    bus.publish("q", &"1".to_string());
    cr.verify(["a 1", "b 1"]);
    bus.publish("q", &"2".to_string());
    cr.verify("b 2");
}

#[test]
fn handler_removed_mid_publish_is_skipped() {
    let mut cr = CallRecorder::new();
    let bus = Rc::new(Bus::new());
    let victim = Rc::new(Cell::new(None));
    bus.subscribe("q".into(), {
        let bus = Rc::downgrade(&bus);
        let victim = victim.clone();
        move |e| {
            call!("a {e}");
            if let (Some(bus), Some(id)) = (bus.upgrade(), victim.get()) {
                bus.unsubscribe("q", id);
            }
        }
    });
    victim.set(Some(bus.subscribe("q".into(), |e| call!("b {e}"))));
    bus.subscribe("q".into(), |e| call!("c {e}"));

    assert_eq!(bus.publish("q", &"x".to_string()), 2);
    cr.verify(["a x", "c x"]);
}

#[test]
fn handler_added_mid_publish_waits_for_next_event() {
    let mut cr = CallRecorder::new();
    let bus = Rc::new(Bus::new());
    let added = Rc::new(Cell::new(false));
    bus.subscribe("q".into(), {
        let bus = Rc::downgrade(&bus);
        let added = added.clone();
        move |e| {
            call!("a {e}");
            if !added.replace(true) {
                if let Some(bus) = bus.upgrade() {
                    bus.subscribe("q".into(), |e| call!("new {e}"));
                }
            }
        }
    });
    bus.publish("q", &"1".to_string());
    cr.verify("a 1");
    bus.publish("q", &"2".to_string());
    cr.verify(["a 2", "new 2"]);
}

#[test]
fn scoped_subscription_unsubscribes_on_drop() {
    let mut cr = CallRecorder::new();
    let bus = Rc::new(Bus::new());
    let s = bus.subscribe_scoped("q".into(), |e| call!("{e}"));
    bus.publish("q", &"1".to_string());
    cr.verify("1");
    drop(s);
    bus.publish("q", &"2".to_string());
    cr.verify(());
    assert!(bus.is_empty());
}

#[test]
fn sync_event_state_downcast() {
    let e = SyncEvent::new("page", Some("2".into())).with_state(2_i64);
    assert_eq!(e.state::<i64>(), Some(&2));
    assert_eq!(e.state::<String>(), None);
}
