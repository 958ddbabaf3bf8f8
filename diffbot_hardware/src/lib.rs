//! Motor and encoder backends.
//!
//! - `sim`: an atomic power register (`SimMotor`) and a thread that turns the
//!   applied power into encoder pulses (`PulseGenerator`). Always available.
//! - `gpio`: Raspberry Pi H-bridge motor and interrupt-driven encoder input,
//!   behind the `hardware` feature.
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use sim::{PlantModel, PulseGenerator, SimMotor};
