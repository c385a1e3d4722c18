//! Stepsync Runtime - async wiring for offline activity reconciliation.
//!
//! Connects the deterministic [`stepsync_engine`] core to the outside world:
//! platform lifecycle notifications, the motion sensor, the session that owns
//! the persisted sync cursor, and a clock. The [`ReconciliationEngine`] runs
//! once at startup and again every time the app returns from the background,
//! and exposes a single pending result per identity for the UI to accept or
//! discard.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stepsync_runtime::{
//!     ChannelLifecycle, InMemorySession, ReconciliationEngine, SyntheticSensor, SystemClock,
//! };
//! use stepsync_engine::ReconcilePolicy;
//!
//! # async fn run() {
//! let session = Arc::new(InMemorySession::with_identity("user-1", None));
//! let engine = ReconciliationEngine::new(
//!     ReconcilePolicy::default(),
//!     session,
//!     Arc::new(SystemClock),
//!     Duration::from_secs(10),
//! );
//! engine.install_sensor(Arc::new(SyntheticSensor::new(100)));
//!
//! let (lifecycle, phases) = ChannelLifecycle::new();
//! let handle = engine.start(&lifecycle, Duration::from_millis(500));
//! # drop((handle, phases));
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod sensor;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use engine::{EngineHandle, ReconciliationEngine, Trigger};
pub use error::{Result, RuntimeError};
pub use lifecycle::{BecameActive, ChannelLifecycle, LifecycleMonitor, LifecycleSource, PhaseSender};
pub use sensor::{ExclusiveSlot, Releasable, SensorGateway, SyntheticSensor};
pub use session::{InMemorySession, SessionProvider};
