//! Human-readable error descriptions and structured JSON error formatting.

use std::fmt;
use std::path::PathBuf;

use diffbot_core::error::{BuildError, ControlError};
use diffbot_hardware::error::HwError;

/// Context attached to every failure while reading, parsing or validating the
/// config file.
#[derive(Debug, Clone)]
pub struct ConfigFile(pub PathBuf);

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load config {}", self.0.display())
    }
}

/// Broad failure class used for exit codes and the JSON `reason` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Build,
    Hardware,
    Other,
}

impl ErrorClass {
    pub fn of(err: &eyre::Report) -> Self {
        if err.downcast_ref::<ConfigFile>().is_some() {
            return Self::Config;
        }
        if err.downcast_ref::<HwError>().is_some() {
            return Self::Hardware;
        }
        match err.downcast_ref::<ControlError>() {
            Some(ControlError::Motor(_) | ControlError::MotorFault(_)) => return Self::Hardware,
            Some(_) => return Self::Build,
            None => {}
        }
        if err.downcast_ref::<BuildError>().is_some() {
            return Self::Build;
        }
        Self::Other
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Config => "Config",
            Self::Build => "Build",
            Self::Hardware => "Hardware",
            Self::Other => "Error",
        }
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ConfigFile(path)) = err.downcast_ref::<ConfigFile>() {
        let path = path.display();
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return format!(
                "What happened: Could not read the config file {path} ({io}).\nLikely causes: Wrong path or missing file.\nHow to fix: Pass --config with the path to your TOML file."
            );
        }
        if let Some(de) = err.downcast_ref::<toml::de::Error>() {
            return format!(
                "What happened: The config file {path} is not valid TOML or is missing a required key.\nLikely causes: A typo, a missing [pins] entry, or a value of the wrong type.\nHow to fix: Fix the file and rerun. Parser said: {}",
                de.message()
            );
        }
        return format!(
            "What happened: Invalid configuration in {path} ({}).\nLikely causes: An out-of-range value or a GPIO pin used twice.\nHow to fix: Edit the config file, then rerun `diffbot self-check`.",
            err.root_cause()
        );
    }

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingEncoder => {
                "What happened: No encoder was provided for a wheel.\nLikely causes: The encoder input failed to initialize or was not wired into the builder.\nHow to fix: Ensure the encoder is created and passed via with_encoder(...).".to_string()
            }
            BuildError::MissingMotor => {
                "What happened: No motor was provided for a wheel.\nLikely causes: Motor driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the motor is created successfully and passed via with_motor(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::InvalidGain(which) => format!(
                "What happened: PID gain {which} was rejected.\nLikely causes: A non-finite value (NaN or inf) given to --kp/--ki/--kd.\nHow to fix: Pass finite gains."
            ),
            ControlError::InvalidLimits { min, max } => format!(
                "What happened: PID output limits {min}..{max} are not usable.\nLikely causes: pid.output_min above pid.output_max.\nHow to fix: Set pid.output_min <= 0 <= pid.output_max."
            ),
            ControlError::MotorFault(msg) => format!(
                "What happened: The motor driver reported a fault ({msg}).\nLikely causes: Stalled wheel, driver overheating or a short on the motor leads.\nHow to fix: Power down, check the wheel turns freely and the wiring, then retry."
            ),
            ControlError::Motor(msg) => format!(
                "What happened: A motor write failed ({msg}).\nLikely causes: Driver not powered or PWM unavailable.\nHow to fix: Re-run with --log-level=debug for details."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return match hw {
            HwError::Gpio(msg) => format!(
                "What happened: Failed to initialize GPIO ({msg}).\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process may access /dev/gpiomem."
            ),
            other => format!(
                "What happened: Hardware error ({other}).\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 config, 4 build, 5 hardware, 1 anything else.
/// Usage errors exit with 2 from clap.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match ErrorClass::of(err) {
        ErrorClass::Config => 3,
        ErrorClass::Build => 4,
        ErrorClass::Hardware => 5,
        ErrorClass::Other => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "event": "error",
        "reason": ErrorClass::of(err).name(),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
