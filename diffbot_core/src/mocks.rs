//! Test and helper motors for diffbot_core

use std::sync::{Arc, Mutex};

use diffbot_traits::{MotorSink, POWER_MAX, POWER_MIN};

/// A motor that accepts every write and remembers the last applied power.
#[derive(Debug, Default)]
pub struct NullMotor {
    power: i32,
}

impl MotorSink for NullMotor {
    fn set_power(&mut self, power: i32) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        self.power = power.clamp(POWER_MIN, POWER_MAX);
        Ok(self.power)
    }

    fn power(&self) -> i32 {
        self.power
    }
}

/// A motor that logs every applied power into a shared vector.
///
/// Clones share the log, so a test can keep one handle while the wheel owns
/// the other. `fail_next` makes the following write return an error.
#[derive(Debug, Clone, Default)]
pub struct RecordingMotor {
    inner: Arc<Mutex<Recording>>,
}

#[derive(Debug, Default)]
struct Recording {
    power: i32,
    writes: Vec<i32>,
    fail_next: bool,
}

impl RecordingMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// All powers applied so far, oldest first.
    pub fn writes(&self) -> Vec<i32> {
        self.inner.lock().map(|r| r.writes.clone()).unwrap_or_default()
    }

    pub fn fail_next(&self) {
        if let Ok(mut r) = self.inner.lock() {
            r.fail_next = true;
        }
    }
}

impl MotorSink for RecordingMotor {
    fn set_power(&mut self, power: i32) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let mut r = self
            .inner
            .lock()
            .map_err(|_| std::io::Error::other("recording motor poisoned"))?;
        if std::mem::take(&mut r.fail_next) {
            return Err(Box::new(std::io::Error::other("injected motor fault")));
        }
        let applied = power.clamp(POWER_MIN, POWER_MAX);
        r.power = applied;
        r.writes.push(applied);
        Ok(applied)
    }

    fn power(&self) -> i32 {
        self.inner.lock().map(|r| r.power).unwrap_or(0)
    }
}
