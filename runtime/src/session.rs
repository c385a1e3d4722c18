//! The identity/session collaborator.
//!
//! The engine asks the session who is logged in and when that identity last
//! synced, and hands advanced cursors back for the session to store.

use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use stepsync_engine::{Identity, Timestamp};

use crate::error::Result;

/// Source of the current identity and owner of the persisted sync timestamp.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The identity currently logged in, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// The last sync timestamp stored for `identity`.
    fn last_sync_timestamp(&self, identity: &str) -> Option<Timestamp>;

    /// Store an advanced cursor.
    async fn persist_sync_timestamp(&self, identity: &str, at: Timestamp) -> Result<()>;
}

/// Session kept in memory.
///
/// Stored timestamps never move backward, even if persists arrive out of order.
#[derive(Debug, Default)]
pub struct InMemorySession {
    current: RwLock<Option<Identity>>,
    timestamps: DashMap<Identity, Timestamp>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `identity` logged in and, optionally, a known sync point.
    pub fn with_identity(identity: impl Into<Identity>, last_sync: Option<Timestamp>) -> Self {
        let session = Self::new();
        let identity = identity.into();
        if let Some(at) = last_sync {
            session.timestamps.insert(identity.clone(), at);
        }
        session.login(identity);
        session
    }

    pub fn login(&self, identity: impl Into<Identity>) {
        let identity = identity.into();
        tracing::info!(identity = %identity, "Session logged in");
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(identity);
    }

    pub fn logout(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(identity) = previous {
            tracing::info!(identity = %identity, "Session logged out");
        }
    }
}

#[async_trait]
impl SessionProvider for InMemorySession {
    fn current_identity(&self) -> Option<Identity> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn last_sync_timestamp(&self, identity: &str) -> Option<Timestamp> {
        self.timestamps.get(identity).map(|entry| *entry.value())
    }

    async fn persist_sync_timestamp(&self, identity: &str, at: Timestamp) -> Result<()> {
        let mut entry = self.timestamps.entry(identity.to_string()).or_insert(at);
        if *entry < at {
            *entry = at;
        }
        Ok(())
    }
}
