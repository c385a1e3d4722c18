//! Error types for the stepsync engine.

use crate::{Identity, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the engine's own bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The cursor was asked to move backward. Always a programming error.
    #[error("stale cursor advance for '{identity}': current {current}, requested {requested}")]
    StaleAdvance {
        identity: Identity,
        current: Timestamp,
        requested: Timestamp,
    },

    #[error("invalid reconciliation window: from {from} is after to {to}")]
    InvalidWindow { from: Timestamp, to: Timestamp },
}

/// Failures reported by a motion sensor.
///
/// None of these are fatal: a failed query leaves the window unreconciled and
/// it is retried, wider, on the next trigger.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum SensorError {
    /// The platform could not answer at all (subscription, availability check).
    #[error("sensor platform error: {0}")]
    Platform(String),

    /// Hardware or permission is absent.
    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    /// Transient query failure.
    #[error("sensor query failed: {0}")]
    Query(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
