//! Pulse capture and speed estimation for one wheel encoder.
//!
//! The encoder is a single-producer/single-consumer structure. The producer is
//! the interrupt-like context that calls [`Encoder::record_pulse`] once per
//! edge; the consumer is the control loop reading [`Encoder::speed`] and
//! [`Encoder::count`]. All shared state is atomic. Multi-field snapshots
//! (count and the newest and oldest ring entries) are taken under a sequence counter:
//! the writer makes the counter odd while it mutates and even when done, and
//! the reader retries when it observes an odd or changed counter.
//!
//! Speed is derived from the span of the last [`PULSE_WINDOW`] timestamps, so
//! a single late or early edge only moves the estimate by a fraction. A pulse
//! arriving after more than the stop timeout of silence starts a new window;
//! pulses from before the stop never count toward the restarted estimate.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use std::time::Duration;

use diffbot_traits::clock::{Micros, PulseClock, duration_us, elapsed_us};
use diffbot_traits::PulseSink;

use crate::config::EncoderCfg;

/// Number of pulse timestamps kept for speed estimation.
pub const PULSE_WINDOW: usize = 9;

/// Default time without a pulse after which the wheel reads as stopped.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(100);

const NO_CHANNEL: u32 = u32::MAX;
const SNAPSHOT_RETRIES: usize = 16;

/// Consistent view of the producer-side state.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    count: u64,
    newest: Micros,
    oldest: Micros,
    buffered: u64,
}

pub struct Encoder {
    clock: Arc<dyn PulseClock + Send + Sync>,
    channel: AtomicU32,
    count: AtomicU64,
    times: [AtomicU64; PULSE_WINDOW],
    seq: AtomicU64,
    /// Index of the first pulse of the current run.
    window_start: AtomicU64,
    stop_timeout_us: AtomicU64,
}

impl Encoder {
    /// Create an unattached encoder. `valid()` is false until `attach`.
    pub fn new(clock: Arc<dyn PulseClock + Send + Sync>) -> Self {
        Self {
            clock,
            channel: AtomicU32::new(NO_CHANNEL),
            count: AtomicU64::new(0),
            times: std::array::from_fn(|_| AtomicU64::new(0)),
            seq: AtomicU64::new(0),
            window_start: AtomicU64::new(0),
            stop_timeout_us: AtomicU64::new(duration_us(DEFAULT_STOP_TIMEOUT)),
        }
    }

    pub fn with_config(clock: Arc<dyn PulseClock + Send + Sync>, cfg: &EncoderCfg) -> Self {
        let enc = Self::new(clock);
        enc.set_stop_timeout(cfg.stop_timeout());
        enc
    }

    /// Bind the encoder to an input channel and enable pulse delivery.
    pub fn attach(&self, channel: u8) {
        let prev = self.channel.swap(u32::from(channel), Ordering::AcqRel);
        if prev != NO_CHANNEL && prev != u32::from(channel) {
            tracing::debug!(from = prev, to = channel, "encoder channel rebound");
        } else {
            tracing::debug!(channel, "encoder attached");
        }
    }

    /// Disable pulse delivery. Counts and timestamps are kept.
    pub fn detach(&self) {
        if self.channel.swap(NO_CHANNEL, Ordering::AcqRel) != NO_CHANNEL {
            tracing::debug!("encoder detached");
        }
    }

    pub fn valid(&self) -> bool {
        self.channel.load(Ordering::Acquire) != NO_CHANNEL
    }

    pub fn channel(&self) -> Option<u8> {
        u8::try_from(self.channel.load(Ordering::Acquire)).ok()
    }

    /// Total pulses recorded since construction. Never decreases.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn set_stop_timeout(&self, timeout: Duration) {
        self.stop_timeout_us
            .store(duration_us(timeout), Ordering::Relaxed);
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_micros(self.stop_timeout_us.load(Ordering::Relaxed))
    }

    pub fn clock(&self) -> &Arc<dyn PulseClock + Send + Sync> {
        &self.clock
    }

    /// Record one edge at the current clock time.
    ///
    /// Producer side only. Ignored while detached. Never blocks.
    pub fn record_pulse(&self) {
        if !self.valid() {
            return;
        }
        let now = self.clock.now_us();

        let s = self.seq.load(Ordering::Relaxed);
        self.seq.store(s.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        let n = self.count.load(Ordering::Relaxed);
        if n > 0 {
            let prev = self.times[((n - 1) % PULSE_WINDOW as u64) as usize].load(Ordering::Relaxed);
            if elapsed_us(now, prev) > self.stop_timeout_us.load(Ordering::Relaxed) {
                self.window_start.store(n, Ordering::Relaxed);
            }
        }
        let slot = (n % PULSE_WINDOW as u64) as usize;
        self.times[slot].store(now, Ordering::Relaxed);
        self.count.store(n.wrapping_add(1), Ordering::Release);

        self.seq.store(s.wrapping_add(2), Ordering::Release);
    }

    /// Read count and the window bounds without tearing.
    ///
    /// Returns `None` if the producer kept writing through every retry.
    fn snapshot(&self) -> Option<Snapshot> {
        for _ in 0..SNAPSHOT_RETRIES {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let count = self.count.load(Ordering::Relaxed);
            let start = self.window_start.load(Ordering::Relaxed);
            let buffered = count.saturating_sub(start).min(PULSE_WINDOW as u64);
            let (newest, oldest) = if buffered == 0 {
                (0, 0)
            } else {
                let newest_slot = ((count - 1) % PULSE_WINDOW as u64) as usize;
                let oldest_slot = ((count - buffered) % PULSE_WINDOW as u64) as usize;
                (
                    self.times[newest_slot].load(Ordering::Relaxed),
                    self.times[oldest_slot].load(Ordering::Relaxed),
                )
            };

            fence(Ordering::Acquire);
            let s2 = self.seq.load(Ordering::Relaxed);
            if s1 == s2 {
                return Some(Snapshot {
                    count,
                    newest,
                    oldest,
                    buffered,
                });
            }
            std::hint::spin_loop();
        }
        None
    }

    /// Smoothed speed in pulses per second, always finite and `>= 0`.
    ///
    /// Zero when detached, before two pulses of the current run are buffered,
    /// or when the last pulse is older than the stop timeout.
    pub fn speed(&self) -> f64 {
        if !self.valid() {
            return 0.0;
        }
        let Some(snap) = self.snapshot() else {
            tracing::trace!("encoder snapshot contended, reporting zero speed");
            return 0.0;
        };
        if snap.count == 0 {
            return 0.0;
        }

        let now = self.clock.now_us();
        let idle = elapsed_us(now, snap.newest);
        if idle > self.stop_timeout_us.load(Ordering::Relaxed) {
            return 0.0;
        }
        if snap.buffered < 2 {
            return 0.0;
        }

        let span = elapsed_us(snap.newest, snap.oldest);
        if span == 0 {
            return 0.0;
        }
        let speed = (snap.buffered - 1) as f64 * 1_000_000.0 / span as f64;
        if speed.is_finite() { speed } else { 0.0 }
    }

    /// Whether a pulse arrived within the stop timeout.
    pub fn is_moving(&self) -> bool {
        self.speed() > 0.0
    }
}

impl PulseSink for Encoder {
    fn record_pulse(&self) {
        Encoder::record_pulse(self);
    }

    fn detach(&self) {
        Encoder::detach(self);
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("channel", &self.channel())
            .field("count", &self.count())
            .field("stop_timeout", &self.stop_timeout())
            .finish_non_exhaustive()
    }
}
