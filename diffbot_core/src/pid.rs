//! Error-driven PID block with bounded output.
//!
//! Updates are rate-limited by `sample_ms`: calls arriving sooner than one
//! sample interval after the last accepted update return `None` and leave the
//! controller untouched. The integral contribution and the summed output are
//! both clamped to `[output_min, output_max]`.
//!
//! The integral step never spans more than one sample interval, so a late
//! update after an idle gap behaves like an on-time one.

use std::sync::Arc;

use diffbot_traits::clock::{Micros, PulseClock, elapsed_us};

use crate::config::PidCfg;
use crate::error::ControlError;

pub struct PidController {
    cfg: PidCfg,
    clock: Arc<dyn PulseClock + Send + Sync>,
    last_error: f64,
    integral: f64,
    last_update_us: Option<Micros>,
    last_output: f64,
}

impl PidController {
    pub fn new(cfg: PidCfg, clock: Arc<dyn PulseClock + Send + Sync>) -> Result<Self, ControlError> {
        validate_gains(cfg.kp, cfg.ki, cfg.kd)?;
        validate_limits(cfg.output_min, cfg.output_max)?;
        Ok(Self {
            cfg,
            clock,
            last_error: 0.0,
            integral: 0.0,
            last_update_us: None,
            last_output: 0.0,
        })
    }

    /// Run one control step for `error = target - actual`.
    ///
    /// Returns `None` if the sample interval has not elapsed since the last
    /// accepted step or if the error is not finite. The first call after
    /// construction or `reset` is always accepted and integrates over one
    /// nominal sample interval.
    pub fn update(&mut self, target: f64, actual: f64) -> Option<f64> {
        let error = target - actual;
        if !error.is_finite() {
            tracing::trace!(target, actual, "pid: non-finite error ignored");
            return None;
        }

        let now = self.clock.now_us();
        let sample_us = self.cfg.sample_ms.saturating_mul(1_000);
        let dt_us = match self.last_update_us {
            Some(last) => {
                let dt = elapsed_us(now, last);
                if dt < sample_us {
                    return None;
                }
                if sample_us > 0 { dt.min(sample_us) } else { dt }
            }
            None => sample_us,
        };
        let dt = dt_us as f64 / 1_000_000.0;

        let (min, max) = (self.cfg.output_min, self.cfg.output_max);

        let i_term = if self.cfg.ki == 0.0 {
            self.integral = 0.0;
            0.0
        } else {
            self.integral += error * dt;
            let raw = self.cfg.ki * self.integral;
            let clamped = raw.clamp(min, max);
            if clamped != raw {
                // Back-compute so the stored integral matches the clamped term.
                self.integral = clamped / self.cfg.ki;
            }
            clamped
        };

        let p_term = self.cfg.kp * error;
        let d_term = self.cfg.kd * (error - self.last_error);
        let sum = p_term + i_term + d_term;
        let output = if sum.is_nan() { 0.0_f64.clamp(min, max) } else { sum.clamp(min, max) };

        tracing::trace!(error, p_term, i_term, d_term, output, "pid update");

        self.last_error = error;
        self.last_update_us = Some(now);
        self.last_output = output;
        Some(output)
    }

    /// Replace the gains. Rejects non-finite values and keeps the old gains.
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) -> Result<(), ControlError> {
        validate_gains(kp, ki, kd)?;
        if ki == 0.0 {
            self.integral = 0.0;
        } else if self.cfg.ki != 0.0 {
            // Keep the integral contribution continuous across a ki change.
            self.integral *= self.cfg.ki / ki;
        }
        self.cfg.kp = kp;
        self.cfg.ki = ki;
        self.cfg.kd = kd;
        Ok(())
    }

    /// Replace the output bounds. Rejects `min > max` or non-finite values.
    pub fn set_limits(&mut self, min: f64, max: f64) -> Result<(), ControlError> {
        validate_limits(min, max)?;
        self.cfg.output_min = min;
        self.cfg.output_max = max;
        self.last_output = self.last_output.clamp(min, max);
        Ok(())
    }

    /// Clear the error memory, the integral accumulator and the sample timer.
    ///
    /// The next update is accepted immediately, as on a fresh controller.
    pub fn reset(&mut self) {
        self.last_error = 0.0;
        self.integral = 0.0;
        self.last_update_us = None;
    }

    pub fn gains(&self) -> (f64, f64, f64) {
        (self.cfg.kp, self.cfg.ki, self.cfg.kd)
    }

    pub fn limits(&self) -> (f64, f64) {
        (self.cfg.output_min, self.cfg.output_max)
    }

    /// Last accepted output.
    pub fn output(&self) -> f64 {
        self.last_output
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn cfg(&self) -> &PidCfg {
        &self.cfg
    }
}

impl std::fmt::Debug for PidController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PidController")
            .field("cfg", &self.cfg)
            .field("last_error", &self.last_error)
            .field("integral", &self.integral)
            .field("last_output", &self.last_output)
            .finish_non_exhaustive()
    }
}

fn validate_gains(kp: f64, ki: f64, kd: f64) -> Result<(), ControlError> {
    if !kp.is_finite() {
        return Err(ControlError::InvalidGain("kp must be finite"));
    }
    if !ki.is_finite() {
        return Err(ControlError::InvalidGain("ki must be finite"));
    }
    if !kd.is_finite() {
        return Err(ControlError::InvalidGain("kd must be finite"));
    }
    Ok(())
}

fn validate_limits(min: f64, max: f64) -> Result<(), ControlError> {
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(ControlError::InvalidLimits { min, max });
    }
    Ok(())
}
