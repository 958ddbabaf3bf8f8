#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the differential-drive controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Only `[pins]` is required; every other section falls back to defaults
//!   that match the stock robot.
use serde::Deserialize;

/// GPIO numbers (BCM) for both wheels.
#[derive(Debug, Deserialize, Clone)]
pub struct Pins {
    pub left_encoder: u8,
    pub right_encoder: u8,
    pub left_forward: u8,
    pub left_reverse: u8,
    pub left_enable: u8,
    pub right_forward: u8,
    pub right_reverse: u8,
    pub right_enable: u8,
}

impl Pins {
    fn all(&self) -> [(&'static str, u8); 8] {
        [
            ("pins.left_encoder", self.left_encoder),
            ("pins.right_encoder", self.right_encoder),
            ("pins.left_forward", self.left_forward),
            ("pins.left_reverse", self.left_reverse),
            ("pins.left_enable", self.left_enable),
            ("pins.right_forward", self.right_forward),
            ("pins.right_reverse", self.right_reverse),
            ("pins.right_enable", self.right_enable),
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EncoderCfg {
    /// No pulse for longer than this means the wheel has stopped (ms)
    pub stop_timeout_ms: u64,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            stop_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub output_min: f64,
    pub output_max: f64,
    /// Minimum interval between PID updates (ms)
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WheelCfg {
    pub kick_power: i32,
    pub settle_power: i32,
    /// Time from kick start until PID takes over (ms)
    pub settle_ms: u64,
    /// Kick ramp while the wheel has not moved yet, power units per second (0 disables)
    pub kick_ramp_per_sec: f64,
    pub deadband: f64,
    pub power_limit: i32,
}

impl Default for WheelCfg {
    fn default() -> Self {
        Self {
            kick_power: 250,
            settle_power: 180,
            settle_ms: 1000,
            kick_ramp_per_sec: 0.0,
            deadband: 0.001,
            power_limit: 255,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DriveCfg {
    /// Wheel target in pulses/s per drive command unit
    pub speed_scale: f64,
}

impl Default for DriveCfg {
    fn default() -> Self {
        Self { speed_scale: 1.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MotorCfg {
    /// Software PWM frequency for the H-bridge enable pins (Hz)
    pub pwm_hz: f64,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self { pwm_hz: 100.0 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    /// Wheel step rate (Hz)
    pub control_hz: u32,
    /// Telemetry interval while moving (ms)
    pub telemetry_ms: u64,
    /// Telemetry records buffered between the control loop and the printer
    pub telemetry_buffer: usize,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            control_hz: 100,
            telemetry_ms: 500,
            telemetry_buffer: 64,
        }
    }
}

/// Simulated plant used when no hardware backend is built in.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimCfg {
    /// Pulses per second per unit of power above stiction
    pub pulses_per_power: f64,
    /// Power magnitude below which the simulated wheel does not turn
    pub stiction: i32,
    /// Right wheel rate relative to the left (models mismatched motors)
    pub right_ratio: f64,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            pulses_per_power: 1.0,
            stiction: 60,
            right_ratio: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub encoder: EncoderCfg,
    #[serde(default)]
    pub pid: PidCfg,
    #[serde(default)]
    pub wheel: WheelCfg,
    #[serde(default)]
    pub drive: DriveCfg,
    #[serde(default)]
    pub motor: MotorCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub sim: SimCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

const LOG_ROTATIONS: [&str; 3] = ["never", "daily", "hourly"];

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let pins = self.pins.all();
        for (i, (name, pin)) in pins.iter().enumerate() {
            if *pin > 27 {
                eyre::bail!("{name} must be a BCM GPIO number in 0..=27, got {pin}");
            }
            if let Some((other, _)) = pins[..i].iter().find(|(_, p)| p == pin) {
                eyre::bail!("{name} reuses GPIO {pin} already assigned to {other}");
            }
        }

        // Encoder
        if self.encoder.stop_timeout_ms == 0 {
            eyre::bail!("encoder.stop_timeout_ms must be >= 1");
        }
        if self.encoder.stop_timeout_ms > 60_000 {
            eyre::bail!("encoder.stop_timeout_ms is unreasonably large (>60s)");
        }

        // PID
        for (name, v) in [("pid.kp", self.pid.kp), ("pid.ki", self.pid.ki), ("pid.kd", self.pid.kd)] {
            if !v.is_finite() {
                eyre::bail!("{name} must be finite");
            }
        }
        if !self.pid.output_min.is_finite() || !self.pid.output_max.is_finite() {
            eyre::bail!("pid.output_min and pid.output_max must be finite");
        }
        if self.pid.output_min > self.pid.output_max {
            eyre::bail!("pid.output_min must be <= pid.output_max");
        }
        if self.pid.output_min > 0.0 || self.pid.output_max < 0.0 {
            eyre::bail!("pid output range [output_min, output_max] must contain 0");
        }

        // Wheel
        if !(1..=255).contains(&self.wheel.power_limit) {
            eyre::bail!("wheel.power_limit must be in 1..=255");
        }
        if self.wheel.kick_power > self.wheel.power_limit {
            eyre::bail!("wheel.kick_power must be <= wheel.power_limit");
        }
        if self.wheel.settle_power <= 0 {
            eyre::bail!("wheel.settle_power must be > 0");
        }
        if self.wheel.settle_power >= self.wheel.kick_power {
            eyre::bail!("wheel.settle_power must be < wheel.kick_power");
        }
        if !(self.wheel.kick_ramp_per_sec.is_finite() && self.wheel.kick_ramp_per_sec >= 0.0) {
            eyre::bail!("wheel.kick_ramp_per_sec must be >= 0");
        }
        if !(self.wheel.deadband.is_finite() && self.wheel.deadband > 0.0) {
            eyre::bail!("wheel.deadband must be > 0");
        }

        // Drive
        if !(self.drive.speed_scale.is_finite() && self.drive.speed_scale > 0.0) {
            eyre::bail!("drive.speed_scale must be > 0");
        }

        // Motor
        if !(self.motor.pwm_hz.is_finite() && self.motor.pwm_hz > 0.0) {
            eyre::bail!("motor.pwm_hz must be > 0");
        }

        // Runner
        if self.runner.control_hz == 0 {
            eyre::bail!("runner.control_hz must be > 0");
        }
        if self.runner.control_hz > 10_000 {
            eyre::bail!("runner.control_hz must be <= 10000");
        }
        if self.runner.telemetry_ms == 0 {
            eyre::bail!("runner.telemetry_ms must be >= 1");
        }
        if self.runner.telemetry_buffer == 0 {
            eyre::bail!("runner.telemetry_buffer must be >= 1");
        }

        // Sim
        if !(self.sim.pulses_per_power.is_finite() && self.sim.pulses_per_power >= 0.0) {
            eyre::bail!("sim.pulses_per_power must be >= 0");
        }
        if !(0..=255).contains(&self.sim.stiction) {
            eyre::bail!("sim.stiction must be in 0..=255");
        }
        if !(self.sim.right_ratio.is_finite() && self.sim.right_ratio > 0.0) {
            eyre::bail!("sim.right_ratio must be > 0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !LOG_ROTATIONS.contains(&rot.to_ascii_lowercase().as_str())
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        Ok(())
    }
}
