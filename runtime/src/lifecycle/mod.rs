//! Application lifecycle notifications.
//!
//! The platform reports raw phase changes through a [`LifecycleSource`]. The
//! [`LifecycleMonitor`] turns them into a debounced stream of
//! [`BecameActive`] events, which is all the reconciliation engine listens to.

mod channel;
mod monitor;

use futures::stream::BoxStream;
use stepsync_engine::AppPhase;

use crate::error::Result;

pub use channel::{ChannelLifecycle, PhaseSender};
pub use monitor::{BecameActive, LifecycleMonitor};

/// Platform API delivering phase-change notifications.
pub trait LifecycleSource: Send + Sync {
    /// Subscribe to raw phase changes.
    ///
    /// The subscription lasts as long as the returned stream; dropping it
    /// unsubscribes. Fails with [`RuntimeError::Platform`] when the platform
    /// cannot deliver notifications.
    ///
    /// [`RuntimeError::Platform`]: crate::RuntimeError::Platform
    fn subscribe(&self) -> Result<BoxStream<'static, AppPhase>>;
}
