//! Status snapshots and where they go.
//!
//! A `Telemetry` record carries the same fields as the robot's status line:
//! time, target speed, measured speed, applied power and pulse count, each as
//! a left/right pair.

use crossbeam_channel as xch;

use crate::wheel::WheelState;

/// A left/right pair of values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pair<T> {
    pub left: T,
    pub right: T,
}

impl<T> Pair<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    /// Clock time of the snapshot in milliseconds.
    pub time_ms: u64,
    pub set_speed: Pair<f64>,
    pub speed: Pair<f64>,
    pub power: Pair<i32>,
    pub counts: Pair<u64>,
    pub state: Pair<WheelState>,
}

/// Receiver of telemetry from the runner.
///
/// `emit` must not block the control loop. It returns `false` when the record
/// was dropped.
pub trait TelemetrySink {
    fn emit(&mut self, telemetry: &Telemetry) -> bool;
}

impl<F: FnMut(&Telemetry)> TelemetrySink for F {
    fn emit(&mut self, telemetry: &Telemetry) -> bool {
        self(telemetry);
        true
    }
}

/// Forwards telemetry into a bounded channel, dropping records when full.
#[derive(Debug)]
pub struct ChannelSink {
    tx: xch::Sender<Telemetry>,
}

impl ChannelSink {
    pub fn new(tx: xch::Sender<Telemetry>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiving end with room for `cap` records.
    pub fn bounded(cap: usize) -> (Self, xch::Receiver<Telemetry>) {
        let (tx, rx) = xch::bounded(cap.max(1));
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn emit(&mut self, telemetry: &Telemetry) -> bool {
        match self.tx.try_send(telemetry.clone()) {
            Ok(()) => true,
            Err(xch::TrySendError::Full(_)) => {
                tracing::trace!("telemetry channel full, dropping record");
                false
            }
            Err(xch::TrySendError::Disconnected(_)) => false,
        }
    }
}
