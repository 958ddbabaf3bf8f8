//! Fixed-rate control loop with a separate telemetry cadence.
//!
//! Each tick steps both wheels. Telemetry is emitted whenever a wheel wrote
//! power, and at least every `telemetry_ms` while either wheel is moving.
//! The loop ends on the shutdown flag or after `duration`, and always stops
//! both wheels on exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use diffbot_traits::MotorSink;
use diffbot_traits::clock::{PulseClock, duration_us, elapsed_us};

use crate::config::LoopCfg;
use crate::drive::DriveController;
use crate::error::{BuildError, Result};
use crate::telemetry::TelemetrySink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Duration,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    /// Ticks on which at least one wheel wrote motor power.
    pub writes: u64,
    pub telemetry: u64,
    /// Telemetry records the sink refused.
    pub dropped: u64,
    /// Ticks that started later than their deadline.
    pub missed_deadlines: u64,
    pub stop_reason: StopReason,
}

#[inline]
fn telemetry_due(wrote: bool, moving: bool, since_last_us: u64, telemetry_us: u64) -> bool {
    wrote || (moving && since_last_us >= telemetry_us)
}

/// Run the drive until `shutdown` is set or `duration` elapses.
pub fn run<M, S>(
    drive: &mut DriveController<M>,
    clock: &dyn PulseClock,
    cfg: &LoopCfg,
    duration: Option<Duration>,
    shutdown: &AtomicBool,
    sink: &mut S,
) -> Result<RunStats>
where
    M: MotorSink,
    S: TelemetrySink + ?Sized,
{
    if cfg.control_hz == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "control_hz must be > 0",
        )));
    }
    if cfg.telemetry_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "telemetry_ms must be > 0",
        )));
    }

    let period_us = crate::util::period_us(cfg.control_hz);
    let telemetry_us = cfg.telemetry_ms.saturating_mul(1_000);
    let limit_us = duration.map(duration_us);

    let start = clock.now_us();
    let mut deadline = start;
    let mut last_emit = start;
    let mut stats = RunStats {
        ticks: 0,
        writes: 0,
        telemetry: 0,
        dropped: 0,
        missed_deadlines: 0,
        stop_reason: StopReason::Duration,
    };

    tracing::info!(control_hz = cfg.control_hz, telemetry_ms = cfg.telemetry_ms, ?duration, "control loop start");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            stats.stop_reason = StopReason::Shutdown;
            break;
        }
        let now = clock.now_us();
        if limit_us.is_some_and(|limit| elapsed_us(now, start) >= limit) {
            break;
        }

        let wrote = drive.step();
        stats.ticks += 1;
        if wrote {
            stats.writes += 1;
        }

        if telemetry_due(wrote, drive.is_moving(), elapsed_us(now, last_emit), telemetry_us) {
            let snapshot = drive.telemetry(now / 1_000);
            if sink.emit(&snapshot) {
                stats.telemetry += 1;
            } else {
                stats.dropped += 1;
            }
            last_emit = now;
        }

        deadline = deadline.wrapping_add(period_us);
        let after = clock.now_us();
        let late_by = elapsed_us(after, deadline);
        if late_by > 0 {
            stats.missed_deadlines += 1;
            tracing::trace!(late_us = late_by, "control tick overran its period");
            deadline = after;
        } else {
            clock.sleep(Duration::from_micros(elapsed_us(deadline, after)));
        }
    }

    drive.stop();
    tracing::info!(
        ticks = stats.ticks,
        writes = stats.writes,
        telemetry = stats.telemetry,
        dropped = stats.dropped,
        missed = stats.missed_deadlines,
        reason = ?stats.stop_reason,
        "control loop stopped"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::telemetry_due;

    #[test]
    fn telemetry_due_on_write_or_interval_while_moving() {
        assert!(telemetry_due(true, false, 0, 500_000));
        assert!(!telemetry_due(false, true, 499_999, 500_000));
        assert!(telemetry_due(false, true, 500_000, 500_000));
        assert!(!telemetry_due(false, false, 10_000_000, 500_000));
    }
}
