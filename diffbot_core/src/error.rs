use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("invalid gain: {0}")]
    InvalidGain(&'static str),
    #[error("invalid output limits: min {min} > max {max} or not finite")]
    InvalidLimits { min: f64, max: f64 },
    #[error("motor error: {0}")]
    Motor(String),
    #[error("motor fault: {0}")]
    MotorFault(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing encoder")]
    MissingEncoder,
    #[error("missing motor")]
    MissingMotor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
