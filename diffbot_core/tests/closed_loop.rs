//! Closed-loop runs against a simulated plant.
//!
//! `PlantClock` wraps a `ManualClock`; every `sleep` advances time in small
//! steps and emits encoder pulses at a rate proportional to the power each
//! motor currently holds, so the runner drives a wheel that responds to its
//! own motor writes.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use diffbot_core::mocks::RecordingMotor;
use diffbot_core::{
    DriveCfg, DriveController, Encoder, LoopCfg, PidCfg, Telemetry, WheelCfg, WheelState,
    build_wheel, run,
};
use diffbot_traits::clock::{Micros, duration_us};
use diffbot_traits::{ManualClock, MotorSink, PulseClock};

const STEP_US: u64 = 100;

struct SimWheel {
    encoder: Arc<Encoder>,
    motor: RecordingMotor,
    gain: f64,
    phase: f64,
}

struct PlantClock {
    clock: ManualClock,
    stiction: i32,
    wheels: std::sync::Mutex<Vec<SimWheel>>,
}

impl PlantClock {
    fn advance(&self, us: u64) {
        let Ok(mut wheels) = self.wheels.lock() else {
            return;
        };
        let mut left = us;
        while left > 0 {
            let dt = left.min(STEP_US);
            self.clock.advance_us(dt);
            left -= dt;
            for w in wheels.iter_mut() {
                let p = w.motor.power().abs();
                let rate = if p > self.stiction {
                    w.gain * f64::from(p - self.stiction)
                } else {
                    0.0
                };
                w.phase += rate * dt as f64 / 1_000_000.0;
                while w.phase >= 1.0 {
                    w.phase -= 1.0;
                    w.encoder.record_pulse();
                }
            }
        }
    }
}

impl PulseClock for PlantClock {
    fn now_us(&self) -> Micros {
        self.clock.now_us()
    }

    fn sleep(&self, d: Duration) {
        self.advance(duration_us(d));
    }
}

fn rig(gains: (f64, f64), pid: PidCfg, wheel: WheelCfg) -> (DriveController<RecordingMotor>, PlantClock) {
    let clock = ManualClock::new();
    let mut sims = Vec::new();
    let mut built = Vec::new();
    for (name, pin, gain) in [("left", 17, gains.0), ("right", 27, gains.1)] {
        let encoder = Arc::new(Encoder::new(Arc::new(clock.clone())));
        encoder.attach(pin);
        let motor = RecordingMotor::new();
        built.push(
            build_wheel(name, motor.clone(), Arc::clone(&encoder), pid.clone(), wheel.clone(), None)
                .expect("valid wheel"),
        );
        sims.push(SimWheel {
            encoder,
            motor,
            gain,
            phase: 0.0,
        });
    }
    let right = built.pop().expect("right");
    let left = built.pop().expect("left");
    let drive = DriveController::new(left, right, DriveCfg::default()).expect("drive");
    let plant = PlantClock {
        clock,
        stiction: 60,
        wheels: std::sync::Mutex::new(sims),
    };
    (drive, plant)
}

fn drive_for(
    drive: &mut DriveController<RecordingMotor>,
    plant: &PlantClock,
    cfg: &LoopCfg,
    secs: u64,
) -> Vec<Telemetry> {
    let shutdown = AtomicBool::new(false);
    let mut seen = Vec::new();
    let mut sink = |t: &Telemetry| seen.push(t.clone());
    run(drive, plant, cfg, Some(Duration::from_secs(secs)), &shutdown, &mut sink).expect("run");
    seen
}

fn within(actual: f64, expected: f64, tol: f64) -> bool {
    (actual - expected).abs() <= tol * expected.abs()
}

#[test]
fn wheels_converge_on_target_speed() {
    let (mut drive, plant) = rig((1.0, 1.0), PidCfg::default(), WheelCfg::default());
    drive.run(100.0, 0.0);
    let seen = drive_for(&mut drive, &plant, &LoopCfg::default(), 6);

    let last = seen.last().expect("telemetry");
    assert_eq!(last.state.left, WheelState::ClosedLoop);
    assert!(within(last.speed.left, 100.0, 0.1), "left {}", last.speed.left);
    assert!(within(last.speed.right, 100.0, 0.1), "right {}", last.speed.right);
    // Plant needs 160 power for 100 pulses/s.
    assert!((last.power.left - 160).abs() <= 10, "power {}", last.power.left);
}

#[test]
fn mismatched_motors_still_reach_the_same_speed() {
    let (mut drive, plant) = rig((1.0, 0.7), PidCfg::default(), WheelCfg::default());
    drive.run(80.0, 0.0);
    let seen = drive_for(&mut drive, &plant, &LoopCfg::default(), 8);

    let last = seen.last().expect("telemetry");
    assert!(within(last.speed.left, 80.0, 0.1), "left {}", last.speed.left);
    assert!(within(last.speed.right, 80.0, 0.1), "right {}", last.speed.right);
    assert!(last.power.right > last.power.left);
}

#[test]
fn turning_splits_targets() {
    let (mut drive, plant) = rig((1.0, 1.0), PidCfg::default(), WheelCfg::default());
    let targets = drive.run(100.0, 200.0);
    assert_eq!((targets.left, targets.right), (150.0, 50.0));
    let seen = drive_for(&mut drive, &plant, &LoopCfg::default(), 8);

    let last = seen.last().expect("telemetry");
    assert!(within(last.speed.left, 150.0, 0.1), "left {}", last.speed.left);
    assert!(within(last.speed.right, 50.0, 0.15), "right {}", last.speed.right);
}

#[test]
fn reverse_drive_reports_negative_speed() {
    let (mut drive, plant) = rig((1.0, 1.0), PidCfg::default(), WheelCfg::default());
    drive.run(-100.0, 0.0);
    let seen = drive_for(&mut drive, &plant, &LoopCfg::default(), 6);

    let last = seen.last().expect("telemetry");
    assert!(last.power.left < 0);
    assert!(within(last.speed.left, -100.0, 0.1), "left {}", last.speed.left);
}

#[test]
fn open_loop_power_emits_periodic_telemetry_while_moving() {
    let (mut drive, plant) = rig((1.0, 1.0), PidCfg::default(), WheelCfg::default());
    drive.set_power(200);
    let seen = drive_for(&mut drive, &plant, &LoopCfg::default(), 2);

    // Idle wheels never write; telemetry comes from the 500 ms cadence only.
    let times: Vec<u64> = seen.iter().map(|t| t.time_ms).collect();
    assert_eq!(times, vec![500, 1000, 1500]);
    assert!(seen.iter().all(|t| t.state.left == WheelState::Idle));
    assert!(within(seen[2].speed.left, 140.0, 0.05), "speed {}", seen[2].speed.left);
}

#[test]
fn pulse_counts_only_grow() {
    let (mut drive, plant) = rig((1.0, 1.0), PidCfg::default(), WheelCfg::default());
    drive.run(120.0, -300.0);
    let seen = drive_for(&mut drive, &plant, &LoopCfg::default(), 4);
    for pair in seen.windows(2) {
        assert!(pair[1].counts.left >= pair[0].counts.left);
        assert!(pair[1].counts.right >= pair[0].counts.right);
    }
}
