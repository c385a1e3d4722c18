//! Unified error handling for the runtime.

use stepsync_engine::SensorError;

/// Runtime error type.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A platform subscription could not be established.
    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Engine error: {0}")]
    Engine(#[from] stepsync_engine::Error),

    /// The session collaborator failed to load or store a timestamp.
    #[error("Session error: {0}")]
    Session(String),
}

/// Result type alias for the runtime.
pub type Result<T> = std::result::Result<T, RuntimeError>;
