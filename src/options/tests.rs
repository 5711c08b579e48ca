use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

const MIN: Duration = Duration::from_millis(50);

#[test]
fn batch_defaults() {
    let b = BatchOptions::new(MIN);
    assert_eq!(b.history, HistoryMode::Replace);
    assert!(!b.scroll);
    assert!(b.shallow);
    assert_eq!(b.throttle, Throttle::from_millis(50));
}

#[test]
fn push_is_sticky() {
    let mut b = BatchOptions::new(MIN);
    b |= CallOptions::new().with_history(HistoryMode::Push);
    b |= CallOptions::new().with_history(HistoryMode::Replace);
    assert_eq!(b.history, HistoryMode::Push);
}

#[test]
fn scroll_and_shallow_merge() {
    let b = BatchOptions::new(MIN)
        | CallOptions::new().with_scroll(true).with_shallow(true)
        | CallOptions::new().with_scroll(false).with_shallow(false)
        | CallOptions::new().with_shallow(true);
    assert!(b.scroll);
    assert!(!b.shallow);
}

#[rstest]
#[case(&[50, 300], 300)]
#[case(&[300, 50], 300)]
#[case(&[10], 50)]
#[case(&[], 50)]
fn slowest_throttle_wins(#[case] requested: &[u64], #[case] expected: u64) {
    let mut b = BatchOptions::new(MIN);
    for &ms in requested {
        b |= CallOptions::new().with_throttle(Throttle::from_millis(ms));
    }
    assert_eq!(b.throttle, Throttle::from_millis(expected));
}

#[test]
fn disabled_throttle_dominates() {
    let b = BatchOptions::new(MIN)
        | CallOptions::new().with_throttle(Throttle::Disabled)
        | CallOptions::new().with_throttle(Throttle::from_millis(1000));
    assert_eq!(b.throttle, Throttle::Disabled);
}

#[test]
fn reset_keeps_floor() {
    let mut b = BatchOptions::new(Duration::from_millis(120))
        | CallOptions::new()
            .with_history(HistoryMode::Push)
            .with_throttle(Throttle::from_millis(500));
    b.reset();
    assert_eq!(b, BatchOptions::new(Duration::from_millis(120)));
}

#[test]
fn call_options_or() {
    let call = CallOptions::new().with_scroll(true);
    let key = CallOptions::new()
        .with_scroll(false)
        .with_history(HistoryMode::Push);
    let merged = call.or(key);
    assert_eq!(merged.scroll, Some(true));
    assert_eq!(merged.history, Some(HistoryMode::Push));
    assert_eq!(merged.shallow, None);
    assert_eq!(merged.clear_on_default, None);
}

#[test]
fn clear_on_default_does_not_affect_batch() {
    let b = BatchOptions::new(Duration::from_millis(50))
        | CallOptions::new().with_clear_on_default(false);
    assert_eq!(b, BatchOptions::new(Duration::from_millis(50)));
}

#[rstest]
#[case("50ms", Throttle::from_millis(50))]
#[case("300", Throttle::from_millis(300))]
#[case("disabled", Throttle::Disabled)]
#[case("Infinity", Throttle::Disabled)]
fn parse_throttle(#[case] s: &str, #[case] expected: Throttle) {
    assert_eq!(s.parse::<Throttle>(), Ok(expected));
}

#[test]
fn parse_throttle_error() {
    assert!("soon".parse::<Throttle>().is_err());
}

#[test]
fn history_mode_text() {
    assert_eq!(HistoryMode::Push.to_string(), "push");
    assert_eq!("replace".parse::<HistoryMode>().ok(), Some(HistoryMode::Replace));
}

#[test]
fn call_options_from_json() {
    let o: CallOptions =
        serde_json::from_str(r#"{ "history": "push", "throttle": "300ms" }"#).unwrap();
    assert_eq!(
        o,
        CallOptions::new()
            .with_history(HistoryMode::Push)
            .with_throttle(Throttle::from_millis(300))
    );
}
