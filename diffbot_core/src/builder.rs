//! Type-state builder for `Wheel` and generic `build_wheel` constructor.
//!
//! The builder enforces at compile time that an encoder and a motor are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use diffbot_traits::clock::PulseClock;
use diffbot_traits::{MotorSink, POWER_MAX};

use crate::config::{PidCfg, WheelCfg};
use crate::encoder::Encoder;
use crate::error::{BuildError, Result};
use crate::pid::PidController;
use crate::wheel::{Wheel, WheelState};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for a boxed-motor `Wheel`. All fields are validated on `build()`.
pub struct WheelBuilder<E, M> {
    name: String,
    encoder: Option<Arc<Encoder>>,
    motor: Option<Box<dyn MotorSink + Send>>,
    pid: Option<PidCfg>,
    wheel: Option<WheelCfg>,
    clock: Option<Arc<dyn PulseClock + Send + Sync>>,
    _e: PhantomData<E>,
    _m: PhantomData<M>,
}

impl Default for WheelBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            name: "wheel".to_string(),
            encoder: None,
            motor: None,
            pid: None,
            wheel: None,
            clock: None,
            _e: PhantomData,
            _m: PhantomData,
        }
    }
}

impl Wheel {
    /// Start building a Wheel.
    pub fn builder() -> WheelBuilder<Missing, Missing> {
        WheelBuilder::default()
    }
}

/// Validate configuration and construct a `Wheel`.
///
/// Shared by `WheelBuilder::try_build()` and `build_wheel()`.
fn validate_and_build<M: MotorSink>(
    name: String,
    motor: M,
    encoder: Arc<Encoder>,
    pid: PidCfg,
    cfg: WheelCfg,
    clock: Option<Arc<dyn PulseClock + Send + Sync>>,
) -> Result<Wheel<M>> {
    // ── Validation ───────────────────────────────────────────────────────────
    if !(cfg.deadband.is_finite() && cfg.deadband > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "deadband must be > 0",
        )));
    }
    if !(1..=POWER_MAX).contains(&cfg.power_limit) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "power_limit must be in 1..=255",
        )));
    }
    if cfg.kick_power > cfg.power_limit {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "kick_power must be <= power_limit",
        )));
    }
    if cfg.settle_power <= 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "settle_power must be > 0",
        )));
    }
    if cfg.settle_power >= cfg.kick_power {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "settle_power must be < kick_power",
        )));
    }
    if !(cfg.kick_ramp_per_sec.is_finite() && cfg.kick_ramp_per_sec >= 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "kick_ramp_per_sec must be >= 0",
        )));
    }
    if pid.output_min > 0.0 || pid.output_max < 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pid output range must contain 0",
        )));
    }

    // ── Assemble ─────────────────────────────────────────────────────────────
    let clock = clock.unwrap_or_else(|| Arc::clone(encoder.clock()));
    let pid = PidController::new(pid, Arc::clone(&clock))?;
    let start_us = clock.now_us();
    let start_pulse_count = encoder.count();

    tracing::debug!(wheel = %name, channel = ?encoder.channel(), "wheel built");

    Ok(Wheel {
        name,
        motor,
        encoder,
        pid,
        clock,
        cfg,
        state: WheelState::Idle,
        target_speed: 0.0,
        start_us,
        start_pulse_count,
        pid_power: 0.0,
    })
}

impl<E, M> WheelBuilder<E, M> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Wheel> {
        let encoder = self
            .encoder
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEncoder))?;
        let motor = self
            .motor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;

        validate_and_build(
            self.name,
            motor,
            encoder,
            self.pid.unwrap_or_default(),
            self.wheel.unwrap_or_default(),
            self.clock,
        )
    }
}

/// Chainable setters that do not affect type-state.
impl<E, M> WheelBuilder<E, M> {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
    pub fn with_pid(mut self, pid: PidCfg) -> Self {
        self.pid = Some(pid);
        self
    }
    pub fn with_wheel(mut self, wheel: WheelCfg) -> Self {
        self.wheel = Some(wheel);
        self
    }
    /// Provide a custom clock; defaults to the encoder's clock.
    pub fn with_clock(mut self, clock: Arc<dyn PulseClock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<M> WheelBuilder<Missing, M> {
    pub fn with_encoder(self, encoder: Arc<Encoder>) -> WheelBuilder<Set, M> {
        WheelBuilder {
            name: self.name,
            encoder: Some(encoder),
            motor: self.motor,
            pid: self.pid,
            wheel: self.wheel,
            clock: self.clock,
            _e: PhantomData,
            _m: PhantomData,
        }
    }
}

impl<E> WheelBuilder<E, Missing> {
    pub fn with_motor(self, motor: impl MotorSink + Send + 'static) -> WheelBuilder<E, Set> {
        WheelBuilder {
            name: self.name,
            encoder: self.encoder,
            motor: Some(Box::new(motor)),
            pid: self.pid,
            wheel: self.wheel,
            clock: self.clock,
            _e: PhantomData,
            _m: PhantomData,
        }
    }
}

impl WheelBuilder<Set, Set> {
    /// Validate and build the Wheel. Only available when encoder and motor are set.
    pub fn build(self) -> Result<Wheel> {
        self.try_build()
    }
}

/// Build a statically-dispatched `Wheel<M>` from a concrete motor.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_wheel<M: MotorSink>(
    name: impl Into<String>,
    motor: M,
    encoder: Arc<Encoder>,
    pid: PidCfg,
    wheel: WheelCfg,
    clock: Option<Arc<dyn PulseClock + Send + Sync>>,
) -> Result<Wheel<M>> {
    validate_and_build(name.into(), motor, encoder, pid, wheel, clock)
}
