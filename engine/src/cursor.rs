//! Per-identity sync watermarks.
//!
//! The cursor records the point up to which activity has been reconciled for
//! an identity. It only ever moves forward; an attempt to move it backward is
//! rejected with [`Error::StaleAdvance`] and leaves the stored value untouched.

use crate::{error::Result, Error, Identity, Timestamp};
use std::collections::HashMap;

/// A single identity's watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    pub last_synced_at: Timestamp,
}

/// Cursor storage keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct CursorStore {
    cursors: HashMap<Identity, SyncCursor>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self {
            cursors: HashMap::new(),
        }
    }

    /// The last reconciled timestamp, or `None` if nothing was ever recorded.
    pub fn read(&self, identity: &str) -> Option<Timestamp> {
        self.cursors.get(identity).map(|c| c.last_synced_at)
    }

    /// Load a cursor from the session collaborator. Ignored if one is already
    /// held, since the in-memory value is authoritative once loaded.
    ///
    /// Returns whether the seed was applied.
    pub fn seed(&mut self, identity: &str, at: Timestamp) -> bool {
        if self.cursors.contains_key(identity) {
            return false;
        }
        self.cursors.insert(
            identity.to_string(),
            SyncCursor { last_synced_at: at },
        );
        true
    }

    /// Move the cursor forward to `to`.
    ///
    /// Creates the cursor if absent. Advancing to the current value succeeds
    /// without change.
    pub fn advance(&mut self, identity: &str, to: Timestamp) -> Result<()> {
        match self.cursors.get_mut(identity) {
            Some(cursor) if to < cursor.last_synced_at => Err(Error::StaleAdvance {
                identity: identity.to_string(),
                current: cursor.last_synced_at,
                requested: to,
            }),
            Some(cursor) => {
                cursor.last_synced_at = to;
                Ok(())
            }
            None => {
                self.cursors
                    .insert(identity.to_string(), SyncCursor { last_synced_at: to });
                Ok(())
            }
        }
    }

    /// Drop the cursor for an identity that is no longer active.
    pub fn forget(&mut self, identity: &str) -> Option<SyncCursor> {
        self.cursors.remove(identity)
    }
}
