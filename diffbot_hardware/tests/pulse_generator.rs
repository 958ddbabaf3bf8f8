use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use diffbot_hardware::{PlantModel, PulseGenerator, SimMotor};
use diffbot_traits::{MonotonicClock, MotorSink, PulseSink};
use rstest::rstest;

#[derive(Default)]
struct CountingSink(AtomicU64, AtomicBool);

impl PulseSink for CountingSink {
    fn record_pulse(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn detach(&self) {
        self.1.store(true, Ordering::Relaxed);
    }
}

fn spawn(motor: &SimMotor, sink: &Arc<CountingSink>) -> PulseGenerator {
    PulseGenerator::spawn(
        motor.clone(),
        Arc::clone(sink) as Arc<dyn PulseSink + Send + Sync>,
        PlantModel::default(),
        Duration::from_millis(1),
        MonotonicClock::new(),
    )
}

#[rstest]
#[case(0)]
#[case(60)]
#[case(-40)]
fn below_stiction_produces_no_pulses(#[case] power: i32) {
    let mut motor = SimMotor::new();
    motor.set_power(power).unwrap();
    let sink = Arc::new(CountingSink::default());
    let generator = spawn(&motor, &sink);
    std::thread::sleep(Duration::from_millis(100));
    drop(generator);
    assert_eq!(sink.0.load(Ordering::Relaxed), 0);
}

#[test]
fn pulse_rate_tracks_power() {
    let mut motor = SimMotor::new();
    // 200 - 60 stiction = 140 pulses/s
    motor.set_power(-200).unwrap();
    let sink = Arc::new(CountingSink::default());
    let generator = spawn(&motor, &sink);
    std::thread::sleep(Duration::from_millis(500));
    let emitted = generator.pulses();
    drop(generator);

    let counted = sink.0.load(Ordering::Relaxed);
    assert!(counted >= emitted);
    // ~70 expected; generous bounds for loaded CI machines.
    assert!((40..=110).contains(&counted), "counted {counted}");
}

#[test]
fn drop_joins_and_stops_delivery() {
    let mut motor = SimMotor::new();
    motor.set_power(255).unwrap();
    let sink = Arc::new(CountingSink::default());
    let generator = spawn(&motor, &sink);
    std::thread::sleep(Duration::from_millis(50));
    drop(generator);

    let after_drop = sink.0.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.0.load(Ordering::Relaxed), after_drop);
    // The generator thread held the last other reference.
    assert_eq!(Arc::strong_count(&sink), 1);
}

#[test]
fn drop_detaches_the_sink() {
    let motor = SimMotor::new();
    let sink = Arc::new(CountingSink::default());
    let generator = spawn(&motor, &sink);
    assert!(!sink.1.load(Ordering::Relaxed));
    drop(generator);
    assert!(sink.1.load(Ordering::Relaxed));
}
