//! Foreground/background edge detection.
//!
//! Platforms report a handful of raw phases, and some of them (`Inactive` in
//! particular) flicker during ordinary transitions such as pulling down a
//! notification shade. Reconciliation only cares about one edge: the app was
//! in the background and is now active again. [`PhaseTracker`] reduces the raw
//! phases to a two-state [`Presence`] and reports that edge through an explicit
//! transition table.

use serde::{Deserialize, Serialize};

/// Raw application phase as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppPhase {
    /// In the foreground and receiving input.
    Active,
    /// Transitional: visible but not receiving input.
    Inactive,
    /// Not visible; may be suspended or terminated at any point.
    Background,
    /// Anything the platform reports that we don't recognise.
    Unknown,
}

impl AppPhase {
    /// Parse a platform phase name. Unrecognised names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            "background" => Self::Background,
            _ => Self::Unknown,
        }
    }
}

/// The two states the edge detector distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Presence {
    #[default]
    Foreground,
    Background,
}

/// An edge produced by the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseEdge {
    /// Background -> Active. The only edge that triggers reconciliation.
    BecameActive,
    /// Foreground -> Background.
    WentBackground,
}

/// Transition table over `(Presence, AppPhase)`.
///
/// | presence \ raw | Active                    | Background                  | Inactive / Unknown |
/// |----------------|---------------------------|-----------------------------|--------------------|
/// | Foreground     | Foreground                | Background, WentBackground  | Foreground         |
/// | Background     | Foreground, BecameActive  | Background                  | Background         |
pub fn transition(presence: Presence, phase: AppPhase) -> (Presence, Option<PhaseEdge>) {
    match (presence, phase) {
        (Presence::Background, AppPhase::Active) => {
            (Presence::Foreground, Some(PhaseEdge::BecameActive))
        }
        (Presence::Foreground, AppPhase::Background) => {
            (Presence::Background, Some(PhaseEdge::WentBackground))
        }
        (Presence::Foreground, AppPhase::Active) => (Presence::Foreground, None),
        (Presence::Background, AppPhase::Background) => (Presence::Background, None),
        (presence, AppPhase::Inactive | AppPhase::Unknown) => (presence, None),
    }
}

/// Stateful wrapper around [`transition`].
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    presence: Presence,
}

impl PhaseTracker {
    /// Create a tracker starting in the given presence.
    pub fn new(initial: Presence) -> Self {
        Self { presence: initial }
    }

    /// Feed a raw phase and return the edge it produced, if any.
    pub fn observe(&mut self, phase: AppPhase) -> Option<PhaseEdge> {
        let (next, edge) = transition(self.presence, phase);
        self.presence = next;
        edge
    }

    /// Current two-state presence.
    pub fn presence(&self) -> Presence {
        self.presence
    }
}
