//! Left/right mixing for a differential drive.
//!
//! A drive command is a speed in `[-255, 255]` and a turn rate in
//! `[-1000, 1000]`. The turn becomes a left/right difference of up to 500,
//! split evenly between the wheels. When one side saturates, the other side
//! absorbs the excess so the difference (and thus the turn) is kept.

use diffbot_traits::MotorSink;

use crate::config::DriveCfg;
use crate::error::{BuildError, Result};
use crate::telemetry::{Pair, Telemetry};
use crate::wheel::Wheel;

pub const SPEED_LIMIT: f64 = 255.0;
pub const TURN_LIMIT: f64 = 1000.0;
/// Left/right difference at full turn.
pub const MAX_DIFFERENCE: f64 = 500.0;

/// Mix a speed and turn command into left and right command values.
pub fn mix(speed: f64, turn: f64) -> (f64, f64) {
    let speed = if speed.is_finite() { speed.clamp(-SPEED_LIMIT, SPEED_LIMIT) } else { 0.0 };
    let turn = if turn.is_finite() { turn.clamp(-TURN_LIMIT, TURN_LIMIT) } else { 0.0 };

    let difference = turn * MAX_DIFFERENCE / TURN_LIMIT;
    let mut left = speed + difference / 2.0;
    let mut right = speed - difference / 2.0;

    if left > SPEED_LIMIT {
        right -= left - SPEED_LIMIT;
        left = SPEED_LIMIT;
    } else if left < -SPEED_LIMIT {
        right += -SPEED_LIMIT - left;
        left = -SPEED_LIMIT;
    }
    if right > SPEED_LIMIT {
        left -= right - SPEED_LIMIT;
        right = SPEED_LIMIT;
    } else if right < -SPEED_LIMIT {
        left += -SPEED_LIMIT - right;
        right = -SPEED_LIMIT;
    }

    (left, right)
}

pub struct DriveController<M: MotorSink = Box<dyn MotorSink + Send>> {
    left: Wheel<M>,
    right: Wheel<M>,
    cfg: DriveCfg,
}

impl<M: MotorSink> DriveController<M> {
    pub fn new(left: Wheel<M>, right: Wheel<M>, cfg: DriveCfg) -> Result<Self> {
        if !(cfg.speed_scale.is_finite() && cfg.speed_scale > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "speed_scale must be > 0",
            )));
        }
        Ok(Self { left, right, cfg })
    }

    /// Closed-loop drive. Returns the wheel targets that were applied.
    pub fn run(&mut self, speed: f64, turn: f64) -> Pair<f64> {
        let (l, r) = mix(speed, turn);
        tracing::debug!(speed, turn, left = l, right = r, "drive command");
        Pair::new(
            self.left.set_target_speed(l * self.cfg.speed_scale),
            self.right.set_target_speed(r * self.cfg.speed_scale),
        )
    }

    /// Open-loop override of both wheels with the same power.
    pub fn set_power(&mut self, power: i32) -> Pair<i32> {
        self.set_powers(power, power)
    }

    pub fn set_powers(&mut self, left: i32, right: i32) -> Pair<i32> {
        Pair::new(self.left.set_power(left), self.right.set_power(right))
    }

    pub fn stop(&mut self) {
        self.left.stop();
        self.right.stop();
    }

    /// Step both wheels. True if either wrote motor power.
    pub fn step(&mut self) -> bool {
        let l = self.left.step();
        let r = self.right.step();
        l || r
    }

    pub fn is_moving(&self) -> bool {
        self.left.is_moving() || self.right.is_moving()
    }

    pub fn telemetry(&self, time_ms: u64) -> Telemetry {
        Telemetry {
            time_ms,
            set_speed: Pair::new(self.left.target_speed(), self.right.target_speed()),
            speed: Pair::new(self.left.speed(), self.right.speed()),
            power: Pair::new(self.left.power(), self.right.power()),
            counts: Pair::new(self.left.pulse_count(), self.right.pulse_count()),
            state: Pair::new(self.left.state(), self.right.state()),
        }
    }

    pub fn left(&self) -> &Wheel<M> {
        &self.left
    }
    pub fn right(&self) -> &Wheel<M> {
        &self.right
    }
    pub fn left_mut(&mut self) -> &mut Wheel<M> {
        &mut self.left
    }
    pub fn right_mut(&mut self) -> &mut Wheel<M> {
        &mut self.right
    }
    pub fn cfg(&self) -> &DriveCfg {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(100.0, 0.0, 100.0, 100.0)]
    #[case(100.0, 400.0, 200.0, 0.0)]
    #[case(0.0, -1000.0, -250.0, 250.0)]
    #[case(250.0, 200.0, 255.0, 155.0)]
    #[case(-250.0, 200.0, -155.0, -255.0)]
    #[case(-250.0, -200.0, -255.0, -155.0)]
    #[case(400.0, 5000.0, 255.0, -245.0)]
    #[case(f64::NAN, 100.0, 25.0, -25.0)]
    fn mixing_table(#[case] speed: f64, #[case] turn: f64, #[case] l: f64, #[case] r: f64) {
        let (left, right) = mix(speed, turn);
        assert!((left - l).abs() < 1e-9, "left {left} != {l}");
        assert!((right - r).abs() < 1e-9, "right {right} != {r}");
    }

    proptest! {
        #[test]
        fn mix_stays_in_range_and_keeps_difference(speed in -600.0f64..600.0, turn in -3000.0f64..3000.0) {
            let (l, r) = mix(speed, turn);
            prop_assert!(l.abs() <= SPEED_LIMIT + 1e-9 && r.abs() <= SPEED_LIMIT + 1e-9);
            let expected = turn.clamp(-TURN_LIMIT, TURN_LIMIT) * MAX_DIFFERENCE / TURN_LIMIT;
            prop_assert!(((l - r) - expected).abs() < 1e-9);
        }
    }
}
