//! Motion sensor access.
//!
//! The engine never talks to hardware directly. It goes through a
//! [`SensorGateway`], held in an [`ExclusiveSlot`] so that swapping sensors
//! always releases the previous handle first.

mod slot;
mod synthetic;

use async_trait::async_trait;
use stepsync_engine::{ReconciliationWindow, SensorError};

pub use slot::{ExclusiveSlot, Releasable};
pub use synthetic::SyntheticSensor;

/// Capability wrapper around a device motion sensor.
///
/// Implementations are untrusted I/O: any call may fail, and callers treat
/// every failure as "try again on the next trigger".
#[async_trait]
pub trait SensorGateway: Releasable {
    /// Whether the sensor can answer queries right now.
    async fn is_available(&self) -> Result<bool, SensorError>;

    /// Number of motion events recorded in `[window.from, window.to)`.
    ///
    /// Must be monotonic in window size.
    async fn count_events(&self, window: &ReconciliationWindow) -> Result<u64, SensorError>;
}
