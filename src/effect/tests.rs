use assert_call::{call, CallRecorder};

use super::*;

fn body(deps: &Vec<&'static str>) -> Subscription {
    let name = deps.join(",");
    call!("run {name}");
    Subscription::from_fn(move || call!("cleanup {name}"))
}

#[test]
fn runs_on_first_call() {
    let mut cr = CallRecorder::new();
    let mut e = DepsEffect::new();
    assert!(e.run(vec!["a"], body));
    cr.verify("run a");
}

#[test]
fn same_deps_do_not_rerun() {
    let mut cr = CallRecorder::new();
    let mut e = DepsEffect::new();
    e.run(vec!["a"], body);
    cr.verify("run a");
    assert!(!e.run(vec!["a"], body));
    cr.verify(());
}

#[test]
fn cleanup_runs_before_next_body() {
    let mut cr = CallRecorder::new();
    let mut e = DepsEffect::new();
    e.run(vec!["a"], body);
    cr.verify("run a");
    e.run(vec!["a", "b"], body);
    cr.verify(["cleanup a", "run a,b"]);
}

#[test]
fn cleanup_on_drop() {
    let mut cr = CallRecorder::new();
    let mut e = DepsEffect::new();
    e.run(vec!["a"], body);
    cr.verify("run a");
    drop(e);
    cr.verify("cleanup a");
}

#[test]
fn lazy_skips_first_run() {
    let mut cr = CallRecorder::new();
    let mut e = DepsEffect::lazy();
    assert!(!e.run(vec!["a"], body));
    cr.verify(());
    assert_eq!(e.deps(), Some(&vec!["a"]));
    assert!(!e.run(vec!["a"], body));
    assert!(e.run(vec!["b"], body));
    cr.verify("run b");
}

#[test]
fn reset_forces_next_run() {
    let mut cr = CallRecorder::new();
    let mut e = DepsEffect::new();
    e.run(vec!["a"], body);
    cr.verify("run a");
    e.reset();
    cr.verify("cleanup a");
    assert!(e.run(vec!["a"], body));
    cr.verify("run a");
}
