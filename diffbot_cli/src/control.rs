//! Command execution: drive, power, tune and self-check.
//!
//! Every command assembles a fresh `Rig`, runs the core runner on the calling
//! thread, and prints telemetry from a separate printer thread fed through a
//! bounded channel so a slow stdout never stalls the control loop.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use diffbot_config::Config;
use diffbot_core::{ChannelSink, LoopCfg, Pair, RunStats, StopReason, Telemetry, WheelState, run};
use eyre::WrapErr;
use serde_json::{Value, json};

use crate::rig::{Rig, assemble};

fn pair<T: Into<Value> + Copy>(p: &Pair<T>) -> Value {
    json!({ "left": p.left.into(), "right": p.right.into() })
}

/// One telemetry record as a JSON object.
pub fn telemetry_json(t: &Telemetry) -> Value {
    json!({
        "time_ms": t.time_ms,
        "set_speed": pair(&t.set_speed),
        "speed": pair(&t.speed),
        "power": pair(&t.power),
        "counts": pair(&t.counts),
        "state": { "left": t.state.left.as_str(), "right": t.state.right.as_str() },
    })
}

pub const fn stop_reason_name(r: StopReason) -> &'static str {
    match r {
        StopReason::Duration => "duration",
        StopReason::Shutdown => "shutdown",
    }
}

/// Print records as JSON lines until the sending side is dropped.
/// Returns how many lines were written.
fn spawn_printer(rx: Receiver<Telemetry>) -> JoinHandle<u64> {
    std::thread::spawn(move || {
        let stdout = std::io::stdout();
        let mut printed = 0;
        for t in rx {
            let mut out = stdout.lock();
            if writeln!(out, "{}", telemetry_json(&t)).is_err() {
                // stdout closed; keep draining so the sink never reports full
                continue;
            }
            printed += 1;
        }
        printed
    })
}

/// Run `rig.drive` to completion, streaming telemetry to stdout.
fn run_streaming(
    rig: &mut Rig,
    cfg: &Config,
    duration: Option<Duration>,
    shutdown: &AtomicBool,
) -> eyre::Result<RunStats> {
    let loop_cfg: LoopCfg = (&cfg.runner).into();
    let (mut sink, rx) = ChannelSink::bounded(cfg.runner.telemetry_buffer);
    let printer = spawn_printer(rx);

    let result = run(&mut rig.drive, rig.clock.as_ref(), &loop_cfg, duration, shutdown, &mut sink);
    drop(sink);

    match printer.join() {
        Ok(n) => tracing::debug!(printed = n, "telemetry printer finished"),
        Err(e) => tracing::warn!(?e, "telemetry printer panicked"),
    }
    let stats = result?;
    if stats.dropped > 0 {
        tracing::warn!(dropped = stats.dropped, "telemetry records dropped; raise runner.telemetry_buffer");
    }
    Ok(stats)
}

pub fn drive(
    cfg: &Config,
    speed: f64,
    turn: f64,
    duration: Option<Duration>,
    shutdown: &AtomicBool,
) -> eyre::Result<RunStats> {
    let mut rig = assemble(cfg)?;
    let targets = rig.drive.run(speed, turn);
    tracing::info!(speed, turn, left = targets.left, right = targets.right, "drive start");
    run_streaming(&mut rig, cfg, duration, shutdown)
}

pub fn power(
    cfg: &Config,
    left: i32,
    right: i32,
    duration: Option<Duration>,
    shutdown: &AtomicBool,
) -> eyre::Result<RunStats> {
    let mut rig = assemble(cfg)?;
    let applied = rig.drive.set_powers(left, right);
    tracing::info!(left = applied.left, right = applied.right, "open-loop power");
    run_streaming(&mut rig, cfg, duration, shutdown)
}

/// Step-response gains; `None` keeps the configured value.
#[derive(Debug, Clone, Copy, Default)]
pub struct GainOverrides {
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
}

/// Outcome of a `tune` run on the left wheel.
#[derive(Debug, Clone)]
pub struct TuneReport {
    pub target: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub samples: u64,
    pub final_speed: f64,
    /// Largest measured speed magnitude seen during the run.
    pub peak_speed: f64,
    /// Time from start until the speed first reached 90% of the target.
    pub rise_ms: Option<u64>,
    pub final_state: WheelState,
    pub stats: RunStats,
}

impl TuneReport {
    /// Peak overshoot in percent of the target, 0 when the target was never exceeded.
    pub fn overshoot_pct(&self) -> f64 {
        let target = self.target.abs();
        if target == 0.0 || self.peak_speed <= target {
            return 0.0;
        }
        (self.peak_speed - target) / target * 100.0
    }

    pub fn to_json(&self) -> Value {
        json!({
            "event": "tune",
            "target": self.target,
            "gains": { "kp": self.kp, "ki": self.ki, "kd": self.kd },
            "samples": self.samples,
            "final_speed": self.final_speed,
            "peak_speed": self.peak_speed,
            "overshoot_pct": self.overshoot_pct(),
            "rise_ms": self.rise_ms,
            "final_state": self.final_state.as_str(),
            "stop_reason": stop_reason_name(self.stats.stop_reason),
        })
    }
}

/// Drive the left wheel at `target` and record its step response.
///
/// Telemetry is sampled every control tick while the wheel moves. With `csv`
/// set, each sample is written as one row.
pub fn tune(
    cfg: &Config,
    target: f64,
    gains: GainOverrides,
    duration: Duration,
    csv: Option<&Path>,
    shutdown: &AtomicBool,
) -> eyre::Result<TuneReport> {
    let mut cfg = cfg.clone();
    if let Some(kp) = gains.kp {
        cfg.pid.kp = kp;
    }
    if let Some(ki) = gains.ki {
        cfg.pid.ki = ki;
    }
    if let Some(kd) = gains.kd {
        cfg.pid.kd = kd;
    }

    let mut writer = match csv {
        Some(path) => {
            let mut w = csv::Writer::from_path(path)
                .wrap_err_with(|| format!("create trace file {}", path.display()))?;
            w.write_record(["time_ms", "target", "speed", "power", "counts", "state"])?;
            Some(w)
        }
        None => None,
    };

    let mut rig = assemble(&cfg)?;
    let mut loop_cfg: LoopCfg = (&cfg.runner).into();
    loop_cfg.telemetry_ms = diffbot_core::util::period_ms(loop_cfg.control_hz);

    rig.drive.left_mut().set_target_speed(target);
    let threshold = 0.9 * target.abs();
    tracing::info!(target, kp = cfg.pid.kp, ki = cfg.pid.ki, kd = cfg.pid.kd, "tune start");

    let mut start_ms = None;
    let mut samples = 0_u64;
    let mut peak_speed = 0.0_f64;
    let mut rise_ms = None;
    let mut last: Option<Telemetry> = None;
    let mut write_err: Option<csv::Error> = None;

    let mut sink = |t: &Telemetry| {
        let t0 = *start_ms.get_or_insert(t.time_ms);
        let speed = t.speed.left;
        samples += 1;
        peak_speed = peak_speed.max(speed.abs());
        if rise_ms.is_none() && threshold > 0.0 && speed.abs() >= threshold {
            rise_ms = Some(t.time_ms.saturating_sub(t0));
        }
        if let Some(w) = writer.as_mut() {
            let row = [
                t.time_ms.saturating_sub(t0).to_string(),
                t.set_speed.left.to_string(),
                format!("{speed:.3}"),
                t.power.left.to_string(),
                t.counts.left.to_string(),
                t.state.left.as_str().to_string(),
            ];
            if let Err(e) = w.write_record(&row) {
                write_err.get_or_insert(e);
            }
        }
        last = Some(t.clone());
    };
    let stats = run(&mut rig.drive, rig.clock.as_ref(), &loop_cfg, Some(duration), shutdown, &mut sink)?;

    if let Some(e) = write_err {
        return Err(e).wrap_err("write tune trace");
    }
    if let Some(mut w) = writer {
        w.flush().wrap_err("flush tune trace")?;
    }

    let (final_speed, final_state) = last
        .as_ref()
        .map_or((0.0, WheelState::Idle), |t| (t.speed.left, t.state.left));
    Ok(TuneReport {
        target,
        kp: cfg.pid.kp,
        ki: cfg.pid.ki,
        kd: cfg.pid.kd,
        samples,
        final_speed,
        peak_speed,
        rise_ms,
        final_state,
        stats,
    })
}

/// Result of `self-check`.
#[derive(Debug, Clone)]
pub struct SelfCheck {
    pub backend: &'static str,
    pub pulse_sources: usize,
    pub left_pin: Option<u8>,
    pub right_pin: Option<u8>,
}

/// Build the drive from config and confirm both wheels can be stopped.
pub fn self_check(cfg: &Config) -> eyre::Result<SelfCheck> {
    let mut rig = assemble(cfg)?;
    rig.drive.stop();
    let left = rig.drive.left();
    let right = rig.drive.right();
    for wheel in [left, right] {
        if !wheel.encoder().valid() {
            eyre::bail!("{} encoder is not attached", wheel.name());
        }
        if wheel.power() != 0 {
            eyre::bail!("{} motor did not accept a stop command", wheel.name());
        }
    }
    Ok(SelfCheck {
        backend: rig.backend(),
        pulse_sources: rig.pulse_sources(),
        left_pin: left.encoder().channel(),
        right_pin: right.encoder().channel(),
    })
}
