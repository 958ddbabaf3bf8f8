#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (f64, f64)| {
    let (speed, turn) = input;
    let (left, right) = diffbot_core::mix(speed, turn);
    assert!(left.is_finite() && right.is_finite());
    assert!(left.abs() <= 255.0 && right.abs() <= 255.0, "{speed} {turn} -> {left} {right}");
});
