//! `From` implementations bridging `diffbot_config` types to `diffbot_core` types.

use crate::config::{DriveCfg, EncoderCfg, LoopCfg, PidCfg, WheelCfg};

// ── EncoderCfg ───────────────────────────────────────────────────────────────

impl From<&diffbot_config::EncoderCfg> for EncoderCfg {
    fn from(c: &diffbot_config::EncoderCfg) -> Self {
        Self {
            stop_timeout_ms: c.stop_timeout_ms,
        }
    }
}

// ── PidCfg ───────────────────────────────────────────────────────────────────

impl From<&diffbot_config::PidCfg> for PidCfg {
    fn from(c: &diffbot_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            output_min: c.output_min,
            output_max: c.output_max,
            sample_ms: c.sample_ms,
        }
    }
}

// ── WheelCfg ─────────────────────────────────────────────────────────────────

impl From<&diffbot_config::WheelCfg> for WheelCfg {
    fn from(c: &diffbot_config::WheelCfg) -> Self {
        Self {
            kick_power: c.kick_power,
            settle_power: c.settle_power,
            settle_ms: c.settle_ms,
            kick_ramp_per_sec: c.kick_ramp_per_sec,
            deadband: c.deadband,
            power_limit: c.power_limit,
        }
    }
}

// ── DriveCfg ─────────────────────────────────────────────────────────────────

impl From<&diffbot_config::DriveCfg> for DriveCfg {
    fn from(c: &diffbot_config::DriveCfg) -> Self {
        Self {
            speed_scale: c.speed_scale,
        }
    }
}

// ── LoopCfg ──────────────────────────────────────────────────────────────────

impl From<&diffbot_config::RunnerCfg> for LoopCfg {
    fn from(c: &diffbot_config::RunnerCfg) -> Self {
        Self {
            control_hz: c.control_hz,
            telemetry_ms: c.telemetry_ms,
        }
    }
}
