//! Maps `Box<dyn Error>` from the `MotorSink` boundary to typed `ControlError`.
//!
//! Motor backends return boxed errors; the wheel never propagates them, but
//! logs the typed form. With `hardware-errors`, `diffbot_hardware::HwError`
//! is downcast for a precise mapping.

use crate::error::ControlError;

pub fn map_motor_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    #[cfg(feature = "hardware-errors")]
    {
        use diffbot_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Gpio(_) | HwError::DriverFault(_) => ControlError::MotorFault(hw.to_string()),
                other => ControlError::Motor(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("fault") {
        ControlError::MotorFault(s)
    } else {
        ControlError::Motor(s)
    }
}
