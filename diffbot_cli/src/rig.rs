//! Hardware assembly: encoders, motors and wheels for the compiled-in backend.
//!
//! Without the `hardware` feature (or off Linux) both wheels run against the
//! simulated plant: a `SimMotor` per wheel and a `PulseGenerator` thread
//! feeding each encoder. With it, the H-bridge pins and encoder interrupts
//! come from `[pins]`.

use std::sync::Arc;

use diffbot_config::Config;
use diffbot_core::{DriveCfg, DriveController, Encoder, EncoderCfg, PidCfg, WheelCfg, build_wheel};
use diffbot_traits::{MonotonicClock, MotorSink, PulseClock, PulseSink};

pub type BoxedMotor = Box<dyn MotorSink + Send>;

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
type Keep = Vec<diffbot_hardware::PulseGenerator>;
#[cfg(all(feature = "hardware", target_os = "linux"))]
type Keep = Vec<diffbot_hardware::gpio::GpioEncoderInput>;

pub struct Rig {
    pub drive: DriveController<BoxedMotor>,
    pub clock: Arc<dyn PulseClock + Send + Sync>,
    /// Pulse sources; dropping them stops pulse delivery.
    keep: Keep,
}

impl Rig {
    pub const fn backend(&self) -> &'static str {
        BACKEND
    }

    /// Number of live pulse sources (one per wheel when healthy).
    pub fn pulse_sources(&self) -> usize {
        self.keep.len()
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
const BACKEND: &str = "sim";
#[cfg(all(feature = "hardware", target_os = "linux"))]
const BACKEND: &str = "gpio";

/// Build both wheels and the drive from a validated config.
pub fn assemble(cfg: &Config) -> eyre::Result<Rig> {
    let clock: Arc<dyn PulseClock + Send + Sync> = Arc::new(MonotonicClock::new());
    let enc_cfg: EncoderCfg = (&cfg.encoder).into();

    let left_enc = Arc::new(Encoder::with_config(Arc::clone(&clock), &enc_cfg));
    let right_enc = Arc::new(Encoder::with_config(Arc::clone(&clock), &enc_cfg));
    left_enc.attach(cfg.pins.left_encoder);
    right_enc.attach(cfg.pins.right_encoder);

    let (left_motor, right_motor, keep) = wire(cfg, &clock, &left_enc, &right_enc)?;

    let pid: PidCfg = (&cfg.pid).into();
    let wheel: WheelCfg = (&cfg.wheel).into();
    let left = build_wheel("left", left_motor, left_enc, pid.clone(), wheel.clone(), None)?;
    let right = build_wheel("right", right_motor, right_enc, pid, wheel, None)?;
    let drive_cfg: DriveCfg = (&cfg.drive).into();
    let drive = DriveController::new(left, right, drive_cfg)?;

    tracing::info!(backend = BACKEND, "drive assembled");
    Ok(Rig { drive, clock, keep })
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn wire(
    cfg: &Config,
    clock: &Arc<dyn PulseClock + Send + Sync>,
    left_enc: &Arc<Encoder>,
    right_enc: &Arc<Encoder>,
) -> eyre::Result<(BoxedMotor, BoxedMotor, Keep)> {
    use diffbot_hardware::{PlantModel, PulseGenerator, SimMotor};

    /// Simulation step of the pulse generator threads.
    const SIM_TICK: std::time::Duration = std::time::Duration::from_micros(500);

    let left_model = PlantModel {
        pulses_per_power: cfg.sim.pulses_per_power,
        stiction: cfg.sim.stiction,
    };
    let right_model = PlantModel {
        pulses_per_power: cfg.sim.pulses_per_power * cfg.sim.right_ratio,
        ..left_model
    };

    let left_motor = SimMotor::new();
    let right_motor = SimMotor::new();
    let left_sink: Arc<dyn PulseSink + Send + Sync> = Arc::clone(left_enc) as _;
    let right_sink: Arc<dyn PulseSink + Send + Sync> = Arc::clone(right_enc) as _;
    let keep = vec![
        PulseGenerator::spawn(left_motor.clone(), left_sink, left_model, SIM_TICK, Arc::clone(clock)),
        PulseGenerator::spawn(right_motor.clone(), right_sink, right_model, SIM_TICK, Arc::clone(clock)),
    ];
    tracing::debug!(?left_model, ?right_model, "sim plant running");

    Ok((Box::new(left_motor), Box::new(right_motor), keep))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn wire(
    cfg: &Config,
    _clock: &Arc<dyn PulseClock + Send + Sync>,
    left_enc: &Arc<Encoder>,
    right_enc: &Arc<Encoder>,
) -> eyre::Result<(BoxedMotor, BoxedMotor, Keep)> {
    use diffbot_hardware::gpio::{self, GpioEncoderInput, HBridgeMotor};

    let p = &cfg.pins;
    let hz = cfg.motor.pwm_hz;
    let gpio = gpio::open()?;
    let left_motor = HBridgeMotor::new(&gpio, p.left_forward, p.left_reverse, p.left_enable, hz)?;
    let right_motor = HBridgeMotor::new(&gpio, p.right_forward, p.right_reverse, p.right_enable, hz)?;

    let left_sink: Arc<dyn PulseSink + Send + Sync> = Arc::clone(left_enc) as _;
    let right_sink: Arc<dyn PulseSink + Send + Sync> = Arc::clone(right_enc) as _;
    let keep = vec![
        GpioEncoderInput::bind(&gpio, p.left_encoder, left_sink)?,
        GpioEncoderInput::bind(&gpio, p.right_encoder, right_sink)?,
    ];
    tracing::info!(
        left = keep[0].pin(),
        right = keep[1].pin(),
        pwm_hz = hz,
        "encoder interrupts armed"
    );

    Ok((Box::new(left_motor), Box::new(right_motor), keep))
}
