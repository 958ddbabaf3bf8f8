//! Common time/period and power helpers for diffbot_core.

use diffbot_traits::{POWER_MAX, POWER_MIN};

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Compute the period in microseconds for a given loop rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    debug_assert!(hz > 0, "control_hz must be > 0");
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Compute the period in milliseconds for a given loop rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    debug_assert!(hz > 0, "control_hz must be > 0");
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Clamp a power value into `[-limit, limit]`, where `limit` itself is capped
/// to the device range.
#[inline]
pub fn clamp_power(power: i32, limit: i32) -> i32 {
    let limit = limit.clamp(0, POWER_MAX);
    power.clamp(POWER_MIN.max(-limit), limit)
}

/// Round a floating-point power to the nearest integer inside `[-limit, limit]`.
/// NaN maps to 0.
#[inline]
pub fn power_from_f64(power: f64, limit: i32) -> i32 {
    if power.is_nan() {
        return 0;
    }
    let limit_f = f64::from(limit.clamp(0, POWER_MAX));
    power.clamp(-limit_f, limit_f).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_power_caps_to_device_range() {
        assert_eq!(clamp_power(300, 255), 255);
        assert_eq!(clamp_power(-300, 255), -255);
        assert_eq!(clamp_power(120, 100), 100);
        assert_eq!(clamp_power(-120, 100), -100);
        assert_eq!(clamp_power(50, 1_000), 50);
        assert_eq!(clamp_power(i32::MIN, 1_000), POWER_MIN);
    }

    #[test]
    fn power_from_f64_rounds_and_clamps() {
        assert_eq!(power_from_f64(181.6, 255), 182);
        assert_eq!(power_from_f64(-181.4, 255), -181);
        assert_eq!(power_from_f64(1e12, 255), 255);
        assert_eq!(power_from_f64(f64::NEG_INFINITY, 200), -200);
        assert_eq!(power_from_f64(f64::NAN, 255), 0);
    }
}
