pub mod clock;

pub use clock::{ManualClock, Micros, MonotonicClock, PulseClock};

/// Lowest and highest power a motor backend accepts.
pub const POWER_MIN: i32 = -255;
pub const POWER_MAX: i32 = 255;

/// A motor that accepts a signed drive power.
///
/// The sign of `power` selects forward/reverse and the magnitude the drive
/// strength, in `[POWER_MIN, POWER_MAX]`. Backends clamp out-of-range input
/// and return the power they actually applied.
pub trait MotorSink {
    fn set_power(&mut self, power: i32) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
    fn power(&self) -> i32;
}

impl<M: MotorSink + ?Sized> MotorSink for Box<M> {
    fn set_power(&mut self, power: i32) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_power(power)
    }

    fn power(&self) -> i32 {
        (**self).power()
    }
}

/// Receiver of encoder edges.
///
/// Implementations must tolerate being called from an interrupt-like
/// producer context while other threads read them: `record_pulse` never
/// blocks and never fails. Only one producer may call it at a time.
pub trait PulseSink {
    fn record_pulse(&self);

    /// The pulse source feeding this sink has been released and no further
    /// edges will arrive.
    fn detach(&self) {}
}

impl<P: PulseSink + ?Sized> PulseSink for std::sync::Arc<P> {
    fn record_pulse(&self) {
        (**self).record_pulse();
    }

    fn detach(&self) {
        (**self).detach();
    }
}
