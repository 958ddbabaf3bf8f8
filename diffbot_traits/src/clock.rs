use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Microsecond timestamp read from a [`PulseClock`].
///
/// Timestamps are opaque: only differences between two of them carry meaning,
/// and differences are always taken with [`elapsed_us`] so a wrapped counter
/// still yields a sane result.
pub type Micros = u64;

/// Differences larger than this are treated as a timestamp taken *after* `now`.
const HALF_RANGE: u64 = u64::MAX / 2;

/// Microseconds from `since` to `now`, tolerating wraparound of the counter.
///
/// A `since` that lies in the future of `now` (a non-monotonic read, or a
/// producer timestamp written after `now` was sampled) clamps to 0.
#[inline]
pub fn elapsed_us(now: Micros, since: Micros) -> u64 {
    let d = now.wrapping_sub(since);
    if d > HALF_RANGE { 0 } else { d }
}

/// Saturating conversion of a `Duration` into whole microseconds.
#[inline]
pub fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Monotonic microsecond time source shared by the pulse producer and the
/// control loop.
///
/// - now_us(): monotonic (possibly wrapping) microseconds
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - elapsed_since(): microseconds elapsed since an earlier `now_us()` reading
pub trait PulseClock {
    fn now_us(&self) -> Micros;
    fn sleep(&self, d: Duration);

    /// Microseconds elapsed since `since`, clamped at 0 for future timestamps.
    fn elapsed_since(&self, since: Micros) -> u64 {
        elapsed_us(self.now_us(), since)
    }
}

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Real-time clock backed by `std::time::Instant`.
///
/// All instances share one process-wide origin, so timestamps taken by an
/// encoder and by the wheel reading it are comparable.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        let _ = process_epoch();
        Self
    }
}

impl PulseClock for MonotonicClock {
    #[inline]
    fn now_us(&self) -> Micros {
        duration_us(Instant::now().saturating_duration_since(process_epoch()))
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time is advanced by hand.
///
/// Clones share the same time, so a test can hold one handle while the
/// encoder and wheel hold others. `sleep(d)` advances time by `d` without
/// blocking.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at an arbitrary raw reading (useful for wraparound tests).
    pub fn starting_at(us: Micros) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(us)),
        }
    }

    /// Advance the clock by the given duration (wrapping).
    pub fn advance(&self, d: Duration) {
        self.advance_us(duration_us(d));
    }

    pub fn advance_us(&self, us: u64) {
        self.now.fetch_add(us, Ordering::AcqRel);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms.saturating_mul(1_000));
    }

    /// Set the raw reading.
    pub fn set_us(&self, us: Micros) {
        self.now.store(us, Ordering::Release);
    }
}

impl PulseClock for ManualClock {
    fn now_us(&self) -> Micros {
        self.now.load(Ordering::Acquire)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

impl<C: PulseClock + ?Sized> PulseClock for Arc<C> {
    fn now_us(&self) -> Micros {
        (**self).now_us()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d);
    }
}
