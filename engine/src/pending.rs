//! Unacknowledged reconciliation results awaiting a user decision.

use crate::{Identity, ReconciliationWindow, RunId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Activity found in a window that is large enough to show the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingResult {
    /// The run that produced this result
    pub run_id: RunId,
    /// Identity the activity belongs to
    pub identity: Identity,
    /// The reconciled interval
    pub window: ReconciliationWindow,
    /// Motion events recorded within the window
    pub count: u64,
    /// When the result was published
    pub created_at: Timestamp,
}

/// The user's verdict on a pending result.
///
/// Both variants advance the cursor identically. Whether the count is also
/// credited somewhere is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decision {
    Accept,
    Discard,
}

/// Single slot per identity. Publishing replaces whatever was there.
#[derive(Debug, Clone, Default)]
pub struct PendingResultStore {
    slots: HashMap<Identity, PendingResult>,
}

impl PendingResultStore {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Publish a result, returning the one it superseded, if any.
    pub fn publish(&mut self, result: PendingResult) -> Option<PendingResult> {
        self.slots.insert(result.identity.clone(), result)
    }

    pub fn peek(&self, identity: &str) -> Option<&PendingResult> {
        self.slots.get(identity)
    }

    /// Empty the slot and return its contents.
    pub fn take(&mut self, identity: &str) -> Option<PendingResult> {
        self.slots.remove(identity)
    }

    /// Drop a result whose window ends at or before `at`.
    ///
    /// Called after the cursor moves past a published window by some other
    /// path, so that acknowledging the stale result can't ask the cursor to
    /// move backward.
    pub fn supersede_through(&mut self, identity: &str, at: Timestamp) -> Option<PendingResult> {
        match self.slots.get(identity) {
            Some(result) if result.window.to <= at => self.slots.remove(identity),
            _ => None,
        }
    }

    /// Drop the slot for an identity that is no longer active.
    pub fn forget(&mut self, identity: &str) -> Option<PendingResult> {
        self.slots.remove(identity)
    }
}
