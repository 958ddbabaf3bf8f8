//! Configuration types for the wheel controller.
//!
//! These are the runtime configuration structs used by `Encoder`, `PidController`,
//! `Wheel`, `DriveController` and the runner. They are separate from the
//! TOML-deserialized config in `diffbot_config`.

use std::time::Duration;

/// Encoder speed estimation settings.
#[derive(Debug, Clone)]
pub struct EncoderCfg {
    /// With no pulse for longer than this, the wheel is considered stopped.
    pub stop_timeout_ms: u64,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 100,
        }
    }
}

impl EncoderCfg {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// PID gains, output bounds and update rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Lower bound on every returned output.
    pub output_min: f64,
    /// Upper bound on every returned output.
    pub output_max: f64,
    /// Minimum time between two accepted updates (ms). 0 accepts every call.
    pub sample_ms: u64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 0.3,
            ki: 0.0,
            kd: 0.0,
            output_min: -255.0,
            output_max: 255.0,
            sample_ms: 200,
        }
    }
}

/// Wheel start-up sequencing and power range.
#[derive(Debug, Clone)]
pub struct WheelCfg {
    /// Power applied from rest until the first pulse arrives (magnitude).
    pub kick_power: i32,
    /// Power held after the first pulse until the PID takes over (magnitude).
    /// Must be below `kick_power`.
    pub settle_power: i32,
    /// Time from kick start until closed-loop control begins (ms).
    pub settle_ms: u64,
    /// Linear kick ramp while no pulse has been seen, in power units per second.
    /// 0.0 holds the kick power constant.
    pub kick_ramp_per_sec: f64,
    /// Targets with `|v| < deadband` are treated as stop.
    pub deadband: f64,
    /// Largest power magnitude the wheel writes (<= 255).
    pub power_limit: i32,
}

impl Default for WheelCfg {
    fn default() -> Self {
        Self {
            kick_power: 250,
            settle_power: 180,
            settle_ms: 1_000,
            kick_ramp_per_sec: 0.0,
            deadband: 0.001,
            power_limit: 255,
        }
    }
}

/// Drive mixing settings.
#[derive(Debug, Clone)]
pub struct DriveCfg {
    /// Wheel target speed (pulses/s) per unit of mixed drive command.
    pub speed_scale: f64,
}

impl Default for DriveCfg {
    fn default() -> Self {
        Self { speed_scale: 1.0 }
    }
}

/// Scheduler cadence.
#[derive(Debug, Clone)]
pub struct LoopCfg {
    /// Rate at which `Wheel::step()` is called.
    pub control_hz: u32,
    /// While a wheel is moving, emit telemetry at least this often (ms).
    pub telemetry_ms: u64,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            control_hz: 100,
            telemetry_ms: 500,
        }
    }
}
