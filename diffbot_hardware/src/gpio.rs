//! Raspberry Pi backends (rppal).
//!
//! `HBridgeMotor` drives an L298-style bridge: two direction pins select
//! forward/reverse/brake and the enable pin carries a software PWM whose
//! duty cycle is `|power| / 255`. `GpioEncoderInput` registers an
//! asynchronous interrupt on both edges of the encoder pin and forwards each
//! edge to a `PulseSink`.

use std::sync::Arc;

use diffbot_traits::{MotorSink, POWER_MAX, POWER_MIN, PulseSink};
use rppal::gpio::{InputPin, OutputPin, Trigger};

use crate::error::{HwError, Result};

pub use rppal::gpio::Gpio;

/// Open the GPIO peripheral (`/dev/gpiomem`).
pub fn open() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))
}

pub struct HBridgeMotor {
    forward: OutputPin,
    reverse: OutputPin,
    enable: OutputPin,
    pwm_hz: f64,
    power: i32,
}

impl HBridgeMotor {
    pub fn new(gpio: &Gpio, forward: u8, reverse: u8, enable: u8, pwm_hz: f64) -> Result<Self> {
        let pin = |n: u8| -> Result<OutputPin> {
            Ok(gpio
                .get(n)
                .map_err(|e| HwError::Gpio(format!("pin {n}: {e}")))?
                .into_output_low())
        };
        Ok(Self {
            forward: pin(forward)?,
            reverse: pin(reverse)?,
            enable: pin(enable)?,
            pwm_hz,
            power: 0,
        })
    }

    fn apply(&mut self, power: i32) -> Result<()> {
        if power == 0 {
            self.enable
                .clear_pwm()
                .map_err(|e| HwError::Pwm(e.to_string()))?;
            self.enable.set_low();
            self.forward.set_low();
            self.reverse.set_low();
            return Ok(());
        }

        if power > 0 {
            self.reverse.set_low();
            self.forward.set_high();
        } else {
            self.forward.set_low();
            self.reverse.set_high();
        }
        let duty = f64::from(power.unsigned_abs()) / f64::from(POWER_MAX);
        self.enable
            .set_pwm_frequency(self.pwm_hz, duty)
            .map_err(|e| HwError::Pwm(e.to_string()))
    }
}

impl MotorSink for HBridgeMotor {
    fn set_power(&mut self, power: i32) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let power = power.clamp(POWER_MIN, POWER_MAX);
        self.apply(power)?;
        self.power = power;
        Ok(power)
    }

    fn power(&self) -> i32 {
        self.power
    }
}

impl Drop for HBridgeMotor {
    fn drop(&mut self) {
        if let Err(e) = self.apply(0) {
            tracing::warn!(error = %e, "failed to stop motor on drop");
        }
    }
}

/// Encoder pin bound to a pulse sink through an async interrupt.
///
/// Dropping it clears the interrupt and detaches the sink.
pub struct GpioEncoderInput {
    pin: InputPin,
    bcm: u8,
    sink: Arc<dyn PulseSink + Send + Sync>,
}

impl GpioEncoderInput {
    pub fn bind(gpio: &Gpio, bcm: u8, sink: Arc<dyn PulseSink + Send + Sync>) -> Result<Self> {
        let mut pin = gpio
            .get(bcm)
            .map_err(|e| HwError::Gpio(format!("pin {bcm}: {e}")))?
            .into_input_pullup();
        let edge_sink = Arc::clone(&sink);
        pin.set_async_interrupt(Trigger::Both, move |_level| edge_sink.record_pulse())
            .map_err(|e| HwError::Gpio(format!("interrupt on pin {bcm}: {e}")))?;
        tracing::debug!(pin = bcm, "encoder interrupt registered");
        Ok(Self { pin, bcm, sink })
    }

    pub fn pin(&self) -> u8 {
        self.bcm
    }
}

impl Drop for GpioEncoderInput {
    fn drop(&mut self) {
        if let Err(e) = self.pin.clear_async_interrupt() {
            tracing::warn!(pin = self.bcm, error = %e, "failed to clear encoder interrupt");
        }
        self.sink.detach();
    }
}
