#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop wheel velocity control (hardware-agnostic).
//!
//! All hardware interactions go through `diffbot_traits::MotorSink` and
//! `diffbot_traits::PulseClock`; encoder edges arrive through
//! [`Encoder::record_pulse`] from whatever context owns the input pin.
//!
//! ## Architecture
//!
//! - **Encoder**: lock-free pulse capture and windowed speed estimate (`encoder`)
//! - **PID**: rate-limited, clamped correction block (`pid`)
//! - **Wheel**: kick/settle/closed-loop start-up sequencing (`wheel`)
//! - **Drive**: left/right mixing of speed and turn commands (`drive`)
//! - **Runner**: fixed-rate stepping plus telemetry cadence (`runner`)
//! - **Configuration**: runtime config structs (`config`)

pub mod builder;
pub mod config;
pub mod conversions;
pub mod drive;
pub mod encoder;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod pid;
pub mod runner;
pub mod telemetry;
pub mod util;
pub mod wheel;

pub use builder::{Missing, Set, WheelBuilder, build_wheel};
pub use config::{DriveCfg, EncoderCfg, LoopCfg, PidCfg, WheelCfg};
pub use drive::{DriveController, mix};
pub use encoder::{Encoder, PULSE_WINDOW};
pub use error::{BuildError, ControlError, Result};
pub use pid::PidController;
pub use runner::{RunStats, StopReason, run};
pub use telemetry::{ChannelSink, Pair, Telemetry, TelemetrySink};
pub use wheel::{Wheel, WheelState};
