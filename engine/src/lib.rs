//! # Stepsync Engine
//!
//! A deterministic core for reconciling motion-sensor activity that accrued
//! while an application was in the background or not running at all.
//!
//! When the app comes back to the foreground after an unknown gap, the host
//! asks the device's motion sensor how many events it recorded since the last
//! reconciled point, and offers the result to the user exactly once. This
//! crate holds every decision in that flow; the host supplies time, identity
//! and the sensor answer.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches a sensor, clock, or storage
//! - **Deterministic**: same inputs always produce the same outputs
//! - **Testable**: pure state transitions, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Phases
//!
//! [`PhaseTracker`] reduces raw platform phases to a two-state
//! [`Presence`] and reports the single edge that matters,
//! [`PhaseEdge::BecameActive`].
//!
//! ### Cursor and window
//!
//! Each identity has a watermark ([`CursorStore`]) that only moves forward.
//! A run covers the [`ReconciliationWindow`] `[cursor, now)`.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] coalesces overlapping triggers, applies the
//! [`ReconcilePolicy`] threshold and either advances the cursor or publishes a
//! [`PendingResult`]. The cursor only moves past a published window once the
//! user acknowledges it.
//!
//! ## Quick Start
//!
//! ```rust
//! use stepsync_engine::{Begin, Decision, ReconcilePolicy, Reconciler, RunOutcome};
//!
//! let mut reconciler = Reconciler::new(ReconcilePolicy::new(50));
//!
//! // The session last synced at t=1_000; the app returns at t=61_000.
//! let Begin::Query(ticket) = reconciler.begin(Some("user-1"), Some(1_000), 61_000) else {
//!     unreachable!()
//! };
//!
//! // The host queries the sensor for ticket.window and reports back.
//! let outcome = reconciler.complete(&ticket, Ok(120), Some("user-1"), 61_000);
//! assert!(matches!(outcome, RunOutcome::Published(_)));
//! assert_eq!(reconciler.cursor("user-1"), Some(1_000));
//!
//! // The user accepts; the window is now reconciled.
//! reconciler.acknowledge("user-1", Decision::Accept).unwrap();
//! assert_eq!(reconciler.cursor("user-1"), Some(61_000));
//! ```

pub mod cursor;
pub mod error;
pub mod pending;
pub mod phase;
pub mod reconcile;
pub mod window;

// Re-export main types at crate root
pub use cursor::{CursorStore, SyncCursor};
pub use error::{Error, SensorError};
pub use pending::{Decision, PendingResult, PendingResultStore};
pub use phase::{transition, AppPhase, PhaseEdge, PhaseTracker, Presence};
pub use reconcile::{
    Acknowledgement, Begin, DiscardReason, ReconcilePolicy, Reconciler, RunOutcome, RunState,
    RunTicket, SkipReason, DEFAULT_THRESHOLD,
};
pub use window::ReconciliationWindow;

/// Type aliases for clarity
pub type Identity = String;
pub type Timestamp = u64;
pub type RunId = u64;
