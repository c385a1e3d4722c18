//! The half-open time interval a reconciliation run covers.

use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};

/// `[from, to)` in milliseconds since the Unix epoch.
///
/// `from == to` is a valid, empty window: it covers no time and therefore no
/// activity, so it is never sent to a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationWindow {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl ReconciliationWindow {
    /// Create a window, rejecting `from > to`.
    pub fn new(from: Timestamp, to: Timestamp) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidWindow { from, to });
        }
        Ok(Self { from, to })
    }

    /// An empty window at `at`.
    pub fn empty(at: Timestamp) -> Self {
        Self { from: at, to: at }
    }

    /// Window from the cursor up to `now`.
    ///
    /// A missing cursor yields an empty window at `now` rather than an
    /// unbounded one, so nothing from before tracking began is ever counted.
    /// A cursor ahead of `now` (wall clock moved backward) yields an empty
    /// window at the cursor so the watermark never regresses.
    pub fn since(cursor: Option<Timestamp>, now: Timestamp) -> Self {
        match cursor {
            None => Self::empty(now),
            Some(from) if from > now => Self::empty(from),
            Some(from) => Self { from, to: now },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.to - self.from
    }

    /// Whether `at` falls within `[from, to)`.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.from <= at && at < self.to
    }

    /// Whether `other` lies entirely inside this window.
    pub fn covers(&self, other: &ReconciliationWindow) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}
