// Control tick periods derived from `control_hz`.
use diffbot_core::util::{period_ms, period_us};
use rstest::rstest;

#[rstest]
#[case(1, 1_000_000, 1_000)]
#[case(50, 20_000, 20)]
#[case(100, 10_000, 10)]
#[case(333, 3_003, 3)]
#[case(1_000, 1_000, 1)]
// Sub-millisecond ticks still report a 1 ms period.
#[case(4_000, 250, 1)]
#[case(1_000_000, 1, 1)]
#[case(u32::MAX, 1, 1)]
fn tick_period_for_rate(#[case] hz: u32, #[case] us: u64, #[case] ms: u64) {
    assert_eq!(period_us(hz), us);
    assert_eq!(period_ms(hz), ms);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "control_hz must be > 0")]
fn zero_rate_is_a_debug_assertion() {
    let _ = period_us(0);
}
