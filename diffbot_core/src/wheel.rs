//! Wheel state machine: target velocity in, motor power out.
//!
//! A wheel starts from rest with a high kick power, drops to a settle power
//! once the encoder reports the first pulse, waits for the speed estimate to
//! settle, and then hands control to its PID. Only `step()` advances the
//! state; `set_target_speed()` and `set_power()` are the external mutators.
//!
//! The encoder is non-quadrature, so the measured speed is signed by the
//! power currently applied to the motor. Direction is assumed, not sensed.

use std::fmt;
use std::sync::Arc;

use diffbot_traits::clock::{Micros, PulseClock, elapsed_us};
use diffbot_traits::{MotorSink, POWER_MAX};

use crate::config::WheelCfg;
use crate::encoder::Encoder;
use crate::hw_error::map_motor_error;
use crate::pid::PidController;
use crate::util::{clamp_power, power_from_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WheelState {
    Idle,
    Starting,
    KickPower,
    SettlePower,
    ClosedLoop,
}

impl WheelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::KickPower => "kick",
            Self::SettlePower => "settle",
            Self::ClosedLoop => "closed_loop",
        }
    }
}

impl fmt::Display for WheelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Wheel<M: MotorSink = Box<dyn MotorSink + Send>> {
    pub(crate) name: String,
    pub(crate) motor: M,
    pub(crate) encoder: Arc<Encoder>,
    pub(crate) pid: PidController,
    pub(crate) clock: Arc<dyn PulseClock + Send + Sync>,
    pub(crate) cfg: WheelCfg,
    pub(crate) state: WheelState,
    pub(crate) target_speed: f64,
    pub(crate) start_us: Micros,
    pub(crate) start_pulse_count: u64,
    /// Running closed-loop power estimate, unrounded.
    pub(crate) pid_power: f64,
}

impl<M: MotorSink> Wheel<M> {
    /// Request a signed target speed in pulses per second.
    ///
    /// A target inside the deadband (or not finite) stops the wheel and returns
    /// 0.0. Otherwise returns the stored target. Reversing direction while
    /// running restarts the kick sequence.
    pub fn set_target_speed(&mut self, speed: f64) -> f64 {
        if !speed.is_finite() || speed.abs() < self.cfg.deadband {
            self.set_power(0);
            return 0.0;
        }

        match self.state {
            WheelState::Idle => self.transition(WheelState::Starting),
            WheelState::Starting => {}
            _ if speed.is_sign_negative() != self.target_speed.is_sign_negative() => {
                tracing::debug!(wheel = %self.name, from = self.target_speed, to = speed, "direction reversed");
                self.pid.reset();
                self.transition(WheelState::Starting);
            }
            _ => {}
        }
        self.target_speed = speed;
        self.target_speed
    }

    /// Override closed-loop control with a fixed power. Leaves the wheel idle.
    ///
    /// Returns the power the motor reports as applied.
    pub fn set_power(&mut self, power: i32) -> i32 {
        if self.state != WheelState::Idle {
            self.transition(WheelState::Idle);
        }
        self.target_speed = 0.0;
        self.pid.reset();
        self.write_power(clamp_power(power, POWER_MAX));
        self.motor.power()
    }

    pub fn stop(&mut self) {
        self.set_power(0);
    }

    /// Advance the state machine by one tick.
    ///
    /// Returns whether a motor write happened. A no-op while the encoder is
    /// detached.
    pub fn step(&mut self) -> bool {
        if !self.encoder.valid() {
            return false;
        }

        match self.state {
            WheelState::Idle => false,
            WheelState::Starting => {
                self.start_us = self.clock.now_us();
                self.start_pulse_count = self.encoder.count();
                self.transition(WheelState::KickPower);
                self.write_power(self.signed(self.cfg.kick_power))
            }
            WheelState::KickPower => {
                if self.encoder.count() != self.start_pulse_count {
                    self.transition(WheelState::SettlePower);
                    return self.write_power(self.signed(self.cfg.settle_power));
                }
                self.ramp_kick()
            }
            WheelState::SettlePower => {
                let elapsed = elapsed_us(self.clock.now_us(), self.start_us);
                if elapsed >= self.cfg.settle_ms.saturating_mul(1_000) {
                    self.pid_power = f64::from(self.motor.power());
                    self.pid.reset();
                    self.transition(WheelState::ClosedLoop);
                }
                false
            }
            WheelState::ClosedLoop => {
                let Some(delta) = self.pid.update(self.target_speed, self.speed()) else {
                    return false;
                };
                let limit = f64::from(self.cfg.power_limit);
                self.pid_power = (self.pid_power + delta).clamp(-limit, limit);
                tracing::trace!(
                    wheel = %self.name,
                    target = self.target_speed,
                    delta,
                    power = self.pid_power,
                    "closed loop update"
                );
                self.write_power(power_from_f64(self.pid_power, self.cfg.power_limit))
            }
        }
    }

    /// Measured speed, signed by the direction of the applied power.
    pub fn speed(&self) -> f64 {
        let s = self.encoder.speed();
        if self.motor.power() < 0 { -s } else { s }
    }

    pub fn power(&self) -> i32 {
        self.motor.power()
    }

    pub fn pulse_count(&self) -> u64 {
        self.encoder.count()
    }

    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }

    pub fn state(&self) -> WheelState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoder(&self) -> &Arc<Encoder> {
        &self.encoder
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Runtime PID tuning (`set_gains`, `set_limits`).
    pub fn pid_mut(&mut self) -> &mut PidController {
        &mut self.pid
    }

    pub fn cfg(&self) -> &WheelCfg {
        &self.cfg
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    /// Whether the encoder reports motion within its stop timeout.
    pub fn is_moving(&self) -> bool {
        self.encoder.is_moving()
    }

    fn signed(&self, magnitude: i32) -> i32 {
        let m = magnitude.min(self.cfg.power_limit);
        if self.target_speed < 0.0 { -m } else { m }
    }

    fn ramp_kick(&mut self) -> bool {
        if self.cfg.kick_ramp_per_sec <= 0.0 {
            return false;
        }
        let elapsed_s = elapsed_us(self.clock.now_us(), self.start_us) as f64 / 1_000_000.0;
        let magnitude = f64::from(self.cfg.kick_power) + self.cfg.kick_ramp_per_sec * elapsed_s;
        let power = power_from_f64(
            if self.target_speed < 0.0 { -magnitude } else { magnitude },
            self.cfg.power_limit,
        );
        if power == self.motor.power() {
            return false;
        }
        self.write_power(power)
    }

    fn write_power(&mut self, power: i32) -> bool {
        match self.motor.set_power(power) {
            Ok(applied) => {
                if applied != power {
                    tracing::trace!(wheel = %self.name, requested = power, applied, "motor clamped power");
                }
                true
            }
            Err(e) => {
                let err = map_motor_error(e.as_ref());
                tracing::warn!(
                    wheel = %self.name,
                    error = %err,
                    kept = self.motor.power(),
                    "motor write failed; keeping last power"
                );
                false
            }
        }
    }

    fn transition(&mut self, next: WheelState) {
        tracing::debug!(wheel = %self.name, from = %self.state, to = %next, "wheel state");
        self.state = next;
    }
}

impl<M: MotorSink> fmt::Debug for Wheel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wheel")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("target_speed", &self.target_speed)
            .field("power", &self.motor.power())
            .field("count", &self.encoder.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_wheel;
    use crate::config::PidCfg;
    use crate::mocks::RecordingMotor;
    use diffbot_traits::ManualClock;
    use rstest::rstest;

    fn rig(cfg: WheelCfg) -> (Wheel<RecordingMotor>, RecordingMotor, Arc<Encoder>, ManualClock) {
        let clock = ManualClock::new();
        let encoder = Arc::new(Encoder::new(Arc::new(clock.clone())));
        encoder.attach(4);
        let motor = RecordingMotor::new();
        let pid = PidCfg {
            kp: 1.0,
            sample_ms: 0,
            ..PidCfg::default()
        };
        let wheel = build_wheel("left", motor.clone(), Arc::clone(&encoder), pid, cfg, None).unwrap();
        (wheel, motor, encoder, clock)
    }

    #[test]
    fn walks_states_in_order() {
        let (mut w, _m, enc, clock) = rig(WheelCfg {
            settle_ms: 50,
            ..WheelCfg::default()
        });
        let mut seen = vec![w.state()];
        assert_eq!(w.set_target_speed(100.0), 100.0);
        for _ in 0..40 {
            if seen.last() != Some(&w.state()) {
                seen.push(w.state());
            }
            clock.advance_ms(5);
            if w.state() != WheelState::Starting {
                enc.record_pulse();
            }
            w.step();
        }
        if seen.last() != Some(&w.state()) {
            seen.push(w.state());
        }
        assert_eq!(
            seen,
            vec![
                WheelState::Idle,
                WheelState::Starting,
                WheelState::KickPower,
                WheelState::SettlePower,
                WheelState::ClosedLoop,
            ]
        );
    }

    #[test]
    fn first_pulse_drops_kick_to_settle() {
        let (mut w, motor, enc, clock) = rig(WheelCfg {
            kick_power: 200,
            ..WheelCfg::default()
        });
        w.set_target_speed(10.0);
        assert!(w.step());
        assert_eq!(w.state(), WheelState::KickPower);
        assert_eq!(w.power(), 200);

        clock.advance_ms(5);
        assert!(!w.step(), "no pulse yet, kick holds");
        assert_eq!(w.state(), WheelState::KickPower);

        enc.record_pulse();
        assert!(w.step());
        assert_eq!(w.state(), WheelState::SettlePower);
        assert!(w.power() < 200);
        assert_eq!(motor.writes(), vec![200, 180]);
    }

    #[test]
    fn reverse_target_kicks_backwards() {
        let (mut w, _m, enc, _clock) = rig(WheelCfg::default());
        w.set_target_speed(-40.0);
        w.step();
        assert_eq!(w.power(), -250);
        enc.record_pulse();
        w.step();
        assert_eq!(w.power(), -180);
    }

    #[test]
    fn kick_ramps_with_elapsed_time() {
        let (mut w, _m, _enc, clock) = rig(WheelCfg {
            kick_power: 150,
            settle_power: 100,
            kick_ramp_per_sec: 100.0,
            ..WheelCfg::default()
        });
        w.set_target_speed(20.0);
        w.step();
        assert_eq!(w.power(), 150);
        clock.advance_ms(500);
        assert!(w.step());
        assert_eq!(w.power(), 200);
        clock.advance_ms(5_000);
        w.step();
        assert_eq!(w.power(), 255);
    }

    #[rstest]
    #[case(WheelState::Starting, 0)]
    #[case(WheelState::KickPower, 1)]
    #[case(WheelState::SettlePower, 2)]
    fn set_power_zero_forces_idle(#[case] expected: WheelState, #[case] steps: usize) {
        let (mut w, _m, enc, _clock) = rig(WheelCfg::default());
        w.set_target_speed(50.0);
        for i in 0..steps {
            if i == 1 {
                enc.record_pulse();
            }
            w.step();
        }
        assert_eq!(w.state(), expected);
        assert_eq!(w.set_power(0), 0);
        assert_eq!(w.state(), WheelState::Idle);
        assert_eq!(w.target_speed(), 0.0);
        for _ in 0..5 {
            enc.record_pulse();
            assert!(!w.step());
        }
        assert_eq!(w.power(), 0);
    }

    #[rstest]
    #[case(0.0)]
    #[case(0.0005)]
    #[case(-0.0009)]
    #[case(f64::NAN)]
    fn deadband_target_stops(#[case] target: f64) {
        let (mut w, _m, _enc, _clock) = rig(WheelCfg::default());
        w.set_target_speed(30.0);
        w.step();
        assert_eq!(w.set_target_speed(target), 0.0);
        assert_eq!(w.state(), WheelState::Idle);
        assert_eq!(w.power(), 0);
    }

    #[test]
    fn detached_encoder_makes_step_a_no_op() {
        let (mut w, motor, enc, _clock) = rig(WheelCfg::default());
        enc.detach();
        w.set_target_speed(30.0);
        assert!(!w.step());
        assert_eq!(w.state(), WheelState::Starting);
        assert!(motor.writes().is_empty());
        assert_eq!(w.set_power(90), 90);
    }

    #[test]
    fn closed_loop_seeds_from_current_power() {
        let (mut w, motor, enc, clock) = rig(WheelCfg {
            settle_ms: 10,
            ..WheelCfg::default()
        });
        w.set_target_speed(100.0);
        w.step();
        clock.advance_ms(10);
        enc.record_pulse();
        w.step();
        clock.advance_ms(10);
        enc.record_pulse();
        assert!(!w.step());
        assert_eq!(w.state(), WheelState::ClosedLoop);

        // Measured 100 pulses/s equals the target: no correction.
        assert!(w.step());
        assert_eq!(w.power(), 180);

        // Faster than target: power comes down.
        clock.advance_ms(5);
        enc.record_pulse();
        assert!(w.step());
        assert!(w.power() < 180, "power {}", w.power());
        assert_eq!(motor.writes()[..2], [250, 180]);
    }

    #[test]
    fn restart_after_idle_hands_over_at_settle_power() {
        let clock = ManualClock::new();
        let enc = Arc::new(Encoder::new(Arc::new(clock.clone())));
        enc.attach(4);
        let pid = PidCfg {
            kp: 0.0,
            ki: 1.0,
            sample_ms: 10,
            ..PidCfg::default()
        };
        let cfg = WheelCfg {
            settle_ms: 10,
            ..WheelCfg::default()
        };
        let mut w = build_wheel("left", RecordingMotor::new(), Arc::clone(&enc), pid, cfg, None).unwrap();

        let run_to_closed_loop = |w: &mut Wheel<RecordingMotor>| {
            w.set_target_speed(150.0);
            assert!(w.step());
            for _ in 0..2 {
                clock.advance_ms(10);
                enc.record_pulse();
                w.step();
            }
            assert_eq!(w.state(), WheelState::ClosedLoop);
            assert_eq!(w.power(), 180);
            clock.advance_ms(10);
            enc.record_pulse();
            assert!(w.step());
            w.power()
        };

        let first = run_to_closed_loop(&mut w);
        w.set_target_speed(0.0);
        assert_eq!(w.state(), WheelState::Idle);
        clock.advance_ms(60_000);

        let second = run_to_closed_loop(&mut w);
        assert!((178..=182).contains(&second), "first {first} second {second}");
        assert_eq!(first, second);
    }

    #[test]
    fn motor_failure_keeps_last_power() {
        let (mut w, motor, enc, _clock) = rig(WheelCfg::default());
        w.set_target_speed(10.0);
        w.step();
        motor.fail_next();
        enc.record_pulse();
        assert!(!w.step());
        assert_eq!(w.state(), WheelState::SettlePower);
        assert_eq!(w.power(), 250);
    }

    #[test]
    fn reversing_while_running_restarts_kick() {
        let (mut w, _m, enc, _clock) = rig(WheelCfg::default());
        w.set_target_speed(60.0);
        w.step();
        enc.record_pulse();
        w.step();
        assert_eq!(w.state(), WheelState::SettlePower);
        w.set_target_speed(-60.0);
        assert_eq!(w.state(), WheelState::Starting);
        w.step();
        assert_eq!(w.power(), -250);
    }

    #[test]
    fn speed_sign_follows_applied_power() {
        let (mut w, _m, enc, clock) = rig(WheelCfg::default());
        for _ in 0..3 {
            clock.advance_ms(10);
            enc.record_pulse();
        }
        w.set_power(-100);
        assert!((w.speed() + 100.0).abs() < 1e-9);
        w.set_power(100);
        assert!((w.speed() - 100.0).abs() < 1e-9);
    }
}
