//! Simulated motor and encoder plant.
//!
//! `SimMotor` is a shared power register. `PulseGenerator` spawns one thread
//! that reads that register and calls `PulseSink::record_pulse()` at
//! `pulses_per_power * (|power| - stiction)` pulses per second, standing in
//! for the encoder interrupt. The thread is shut down and joined on drop,
//! and the sink is then detached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use diffbot_traits::clock::{PulseClock, elapsed_us};
use diffbot_traits::{MotorSink, POWER_MAX, POWER_MIN, PulseSink};

use crate::error::HwError;

/// Motor whose applied power is an atomic shared by all clones.
#[derive(Debug, Clone, Default)]
pub struct SimMotor {
    power: Arc<AtomicI32>,
    fault: Arc<AtomicBool>,
}

impl SimMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with a driver fault until cleared.
    pub fn set_fault(&self, fault: bool) {
        self.fault.store(fault, Ordering::Relaxed);
    }
}

impl MotorSink for SimMotor {
    fn set_power(&mut self, power: i32) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        if self.fault.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::DriverFault("simulated fault line".into())));
        }
        let applied = power.clamp(POWER_MIN, POWER_MAX);
        self.power.store(applied, Ordering::Relaxed);
        tracing::trace!(requested = power, applied, "sim motor power");
        Ok(applied)
    }

    fn power(&self) -> i32 {
        self.power.load(Ordering::Relaxed)
    }
}

/// Steady-state response of a simulated wheel.
#[derive(Debug, Clone, Copy)]
pub struct PlantModel {
    /// Pulses per second per unit of power above stiction
    pub pulses_per_power: f64,
    /// Power magnitude the wheel needs before it turns at all
    pub stiction: i32,
}

impl Default for PlantModel {
    fn default() -> Self {
        Self {
            pulses_per_power: 1.0,
            stiction: 60,
        }
    }
}

impl PlantModel {
    /// Pulse rate for a given applied power.
    pub fn rate(&self, power: i32) -> f64 {
        let p = power.saturating_abs();
        if p <= self.stiction {
            return 0.0;
        }
        (self.pulses_per_power * f64::from(p - self.stiction)).max(0.0)
    }
}

pub struct PulseGenerator {
    pulses: Arc<AtomicU64>,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<JoinHandle<()>>,
    sink: Arc<dyn PulseSink + Send + Sync>,
}

impl PulseGenerator {
    /// Spawn the generator thread. `tick` is the simulation step; pulses are
    /// delivered at tick granularity.
    pub fn spawn<C: PulseClock + Send + Sync + 'static>(
        motor: SimMotor,
        sink: Arc<dyn PulseSink + Send + Sync>,
        model: PlantModel,
        tick: Duration,
        clock: C,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let pulses = Arc::new(AtomicU64::new(0));
        let pulses_clone = Arc::clone(&pulses);
        let edge_sink = Arc::clone(&sink);
        let tick = tick.max(Duration::from_micros(50));

        let join_handle = std::thread::spawn(move || {
            let mut last = clock.now_us();
            let mut phase = 0.0_f64;
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("pulse generator received shutdown signal");
                    break;
                }

                let now = clock.now_us();
                let dt_s = elapsed_us(now, last) as f64 / 1_000_000.0;
                last = now;

                phase += model.rate(motor.power()) * dt_s;
                while phase >= 1.0 {
                    phase -= 1.0;
                    edge_sink.record_pulse();
                    pulses_clone.fetch_add(1, Ordering::Relaxed);
                }

                clock.sleep(tick);
            }
            tracing::trace!("pulse generator thread exiting cleanly");
        });

        Self {
            pulses,
            shutdown,
            join_handle: Some(join_handle),
            sink,
        }
    }

    /// Pulses delivered so far.
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::Relaxed)
    }
}

impl Drop for PulseGenerator {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("pulse generator joined"),
                Err(e) => tracing::warn!(?e, "pulse generator thread panicked during shutdown"),
            }
        }
        self.sink.detach();
    }
}
