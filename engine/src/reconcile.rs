//! The reconciliation state machine.
//!
//! This is the core of the engine. It decides, for each trigger, whether a run
//! may start, which window it covers, and what to do with the count the sensor
//! returns. It performs no IO: the caller queries the sensor between
//! [`Reconciler::begin`] and [`Reconciler::complete`].
//!
//! # Algorithm
//!
//! 1. Scope out the previous identity if the active one changed
//! 2. Skip if there is no identity or a run is already in flight for it
//! 3. Derive `[cursor, now)`; an empty window settles immediately
//! 4. Mark the identity in flight and hand back a [`RunTicket`]
//! 5. On completion, discard results that no longer apply, then either
//!    advance the cursor (insignificant count) or publish a pending result
//! 6. On acknowledgment, advance the cursor to the published window's end

use crate::{
    cursor::CursorStore,
    error::Result,
    pending::{Decision, PendingResult, PendingResultStore},
    Error, Identity, ReconciliationWindow, RunId, SensorError, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default significance threshold, in motion events.
pub const DEFAULT_THRESHOLD: u64 = 50;

/// Decides which counts are worth showing the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePolicy {
    /// Counts at or below this are treated as sensor noise
    pub threshold: u64,
}

impl ReconcilePolicy {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn is_significant(&self, count: u64) -> bool {
        count > self.threshold
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// Per-identity run flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    InFlight { run_id: RunId },
}

/// Why a trigger did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NoIdentity,
    /// Coalesced into the run already in flight.
    InFlight,
}

/// Why a completed query was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscardReason {
    /// The active identity is no longer the one the run started for.
    IdentityChanged,
    /// The run's slot was scoped out or its cursor moved while it was in flight.
    Superseded,
}

/// Token for a run that is waiting on the sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTicket {
    pub run_id: RunId,
    pub identity: Identity,
    pub window: ReconciliationWindow,
}

/// Terminal state of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    /// The window is fully reconciled and the cursor now sits at `window.to`.
    Reconciled {
        identity: Identity,
        window: ReconciliationWindow,
        count: u64,
    },
    /// A result is waiting for the user; the cursor has not moved.
    Published(PendingResult),
    /// The sensor could not answer. Nothing changed; the next trigger retries.
    Failed {
        identity: Identity,
        window: ReconciliationWindow,
        error: SensorError,
    },
    Discarded {
        identity: Identity,
        window: ReconciliationWindow,
        reason: DiscardReason,
    },
    /// Bookkeeping refused the result. Indicates a bug.
    Rejected(Error),
}

impl RunOutcome {
    /// The identity and new cursor position, if this outcome moved the cursor.
    pub fn advanced_cursor(&self) -> Option<(&Identity, Timestamp)> {
        match self {
            RunOutcome::Reconciled {
                identity, window, ..
            } => Some((identity, window.to)),
            _ => None,
        }
    }
}

/// What [`Reconciler::begin`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// Finished without needing the sensor.
    Settled(RunOutcome),
    /// Query the sensor for `ticket.window`, then call `complete`.
    Query(RunTicket),
}

/// A pending result the user has decided on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub result: PendingResult,
    pub decision: Decision,
}

/// Owns every piece of reconciliation state: cursors, pending results and run
/// flags, all scoped to the active identity.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    policy: ReconcilePolicy,
    cursors: CursorStore,
    pending: PendingResultStore,
    runs: HashMap<Identity, RunState>,
    active: Option<Identity>,
    next_run_id: RunId,
}

impl Reconciler {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self {
            policy,
            cursors: CursorStore::new(),
            pending: PendingResultStore::new(),
            runs: HashMap::new(),
            active: None,
            next_run_id: 1,
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    pub fn active_identity(&self) -> Option<&Identity> {
        self.active.as_ref()
    }

    pub fn cursor(&self, identity: &str) -> Option<Timestamp> {
        self.cursors.read(identity)
    }

    pub fn peek(&self, identity: &str) -> Option<&PendingResult> {
        self.pending.peek(identity)
    }

    pub fn run_state(&self, identity: &str) -> RunState {
        self.runs.get(identity).copied().unwrap_or_default()
    }

    /// Record the currently resolved identity.
    ///
    /// When it differs from the last one seen, the previous identity's cursor
    /// and pending result are dropped and its identity is returned. A run
    /// still in flight for it keeps its flag until its ticket is released, so
    /// logging straight back in cannot start a second query.
    pub fn observe_identity(&mut self, identity: Option<&str>) -> Option<Identity> {
        if self.active.as_deref() == identity {
            return None;
        }
        let previous = std::mem::replace(&mut self.active, identity.map(str::to_string));
        if let Some(old) = &previous {
            self.cursors.forget(old);
            self.pending.forget(old);
        }
        previous
    }

    /// Start a run for `identity` at `now`.
    ///
    /// `seed` is the last sync timestamp the session collaborator knows about;
    /// it is only used when no cursor is loaded yet.
    pub fn begin(
        &mut self,
        identity: Option<&str>,
        seed: Option<Timestamp>,
        now: Timestamp,
    ) -> Begin {
        self.observe_identity(identity);

        let Some(identity) = identity else {
            return Begin::Settled(RunOutcome::Skipped(SkipReason::NoIdentity));
        };

        if matches!(self.run_state(identity), RunState::InFlight { .. }) {
            return Begin::Settled(RunOutcome::Skipped(SkipReason::InFlight));
        }

        if let Some(seed) = seed {
            self.cursors.seed(identity, seed);
        }

        let window = ReconciliationWindow::since(self.cursors.read(identity), now);
        if window.is_empty() {
            // Also establishes the baseline for an identity with no history.
            return Begin::Settled(self.settle(identity, window, 0));
        }

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        self.runs
            .insert(identity.to_string(), RunState::InFlight { run_id });

        Begin::Query(RunTicket {
            run_id,
            identity: identity.to_string(),
            window,
        })
    }

    /// Apply the sensor's answer for a ticket.
    ///
    /// `current` is the identity resolved at completion time. The run flag is
    /// released whatever the outcome.
    pub fn complete(
        &mut self,
        ticket: &RunTicket,
        result: std::result::Result<u64, SensorError>,
        current: Option<&str>,
        now: Timestamp,
    ) -> RunOutcome {
        let still_owner = self.release(&ticket.identity, ticket.run_id);
        self.observe_identity(current);

        let discard = |reason| RunOutcome::Discarded {
            identity: ticket.identity.clone(),
            window: ticket.window,
            reason,
        };

        if current != Some(ticket.identity.as_str()) {
            return discard(DiscardReason::IdentityChanged);
        }
        if !still_owner || self.cursors.read(&ticket.identity) != Some(ticket.window.from) {
            return discard(DiscardReason::Superseded);
        }

        match result {
            Err(error) => RunOutcome::Failed {
                identity: ticket.identity.clone(),
                window: ticket.window,
                error,
            },
            Ok(count) if !self.policy.is_significant(count) => {
                self.settle(&ticket.identity, ticket.window, count)
            }
            Ok(count) => {
                let result = PendingResult {
                    run_id: ticket.run_id,
                    identity: ticket.identity.clone(),
                    window: ticket.window,
                    count,
                    created_at: now,
                };
                self.pending.publish(result.clone());
                RunOutcome::Published(result)
            }
        }
    }

    /// Return `identity` to idle if `run_id` is the run in flight for it.
    ///
    /// Idempotent. Returns whether the flag was cleared by this call.
    pub fn release(&mut self, identity: &str, run_id: RunId) -> bool {
        match self.runs.get(identity) {
            Some(RunState::InFlight { run_id: current }) if *current == run_id => {
                self.runs.remove(identity);
                true
            }
            _ => false,
        }
    }

    /// Resolve the pending result for `identity`.
    ///
    /// Accept and discard both advance the cursor to the end of the result's
    /// window. Acknowledging an empty slot does nothing and returns `None`.
    /// The slot is cleared even if the advance is rejected.
    pub fn acknowledge(
        &mut self,
        identity: &str,
        decision: Decision,
    ) -> Result<Option<Acknowledgement>> {
        let Some(result) = self.pending.take(identity) else {
            return Ok(None);
        };
        self.cursors.advance(identity, result.window.to)?;
        Ok(Some(Acknowledgement { result, decision }))
    }

    fn settle(&mut self, identity: &str, window: ReconciliationWindow, count: u64) -> RunOutcome {
        if let Err(err) = self.cursors.advance(identity, window.to) {
            return RunOutcome::Rejected(err);
        }
        self.pending.supersede_through(identity, window.to);
        RunOutcome::Reconciled {
            identity: identity.to_string(),
            window,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_706_745_600_000;
    const NOW: Timestamp = T0 + 3_600_000;

    fn reconciler_at(cursor: Timestamp) -> Reconciler {
        let mut reconciler = Reconciler::new(ReconcilePolicy::new(50));
        reconciler.observe_identity(Some("user-1"));
        reconciler.cursors.seed("user-1", cursor);
        reconciler
    }

    fn start(reconciler: &mut Reconciler, now: Timestamp) -> RunTicket {
        match reconciler.begin(Some("user-1"), None, now) {
            Begin::Query(ticket) => ticket,
            other => panic!("expected a query, got {other:?}"),
        }
    }

    #[test]
    fn policy_threshold_is_exclusive() {
        let policy = ReconcilePolicy::new(50);
        assert!(!policy.is_significant(50));
        assert!(policy.is_significant(51));
        assert_eq!(ReconcilePolicy::default().threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn no_identity_is_skipped() {
        let mut reconciler = Reconciler::default();
        assert_eq!(
            reconciler.begin(None, Some(T0), NOW),
            Begin::Settled(RunOutcome::Skipped(SkipReason::NoIdentity))
        );
    }

    #[test]
    fn begin_marks_in_flight_and_coalesces() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);
        assert_eq!(ticket.window, ReconciliationWindow::new(T0, NOW).unwrap());
        assert_eq!(
            reconciler.run_state("user-1"),
            RunState::InFlight {
                run_id: ticket.run_id
            }
        );

        assert_eq!(
            reconciler.begin(Some("user-1"), None, NOW + 10),
            Begin::Settled(RunOutcome::Skipped(SkipReason::InFlight))
        );
    }

    #[test]
    fn insignificant_count_advances_cursor() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);

        let outcome = reconciler.complete(&ticket, Ok(5), Some("user-1"), NOW);
        assert_eq!(outcome.advanced_cursor(), Some((&"user-1".to_string(), NOW)));
        assert_eq!(reconciler.cursor("user-1"), Some(NOW));
        assert!(reconciler.peek("user-1").is_none());
        assert_eq!(reconciler.run_state("user-1"), RunState::Idle);
    }

    #[test]
    fn significant_count_publishes_without_advancing() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);

        let outcome = reconciler.complete(&ticket, Ok(120), Some("user-1"), NOW);
        let RunOutcome::Published(result) = outcome else {
            panic!("expected a published result");
        };
        assert_eq!(result.count, 120);
        assert_eq!(result.window, ReconciliationWindow::new(T0, NOW).unwrap());
        assert_eq!(reconciler.cursor("user-1"), Some(T0));
        assert_eq!(reconciler.peek("user-1"), Some(&result));
    }

    #[test]
    fn failure_leaves_cursor_and_releases() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);

        let outcome = reconciler.complete(
            &ticket,
            Err(SensorError::Query("timeout".into())),
            Some("user-1"),
            NOW,
        );
        assert!(matches!(outcome, RunOutcome::Failed { .. }));
        assert_eq!(reconciler.cursor("user-1"), Some(T0));
        assert_eq!(reconciler.run_state("user-1"), RunState::Idle);

        // Retry covers the wider window from the same cursor.
        let retry = start(&mut reconciler, NOW + 60_000);
        assert_eq!(retry.window.from, T0);
        assert_eq!(retry.window.to, NOW + 60_000);
    }

    #[test]
    fn empty_window_settles_without_query() {
        let mut reconciler = reconciler_at(NOW);
        let begin = reconciler.begin(Some("user-1"), None, NOW);
        assert_eq!(
            begin,
            Begin::Settled(RunOutcome::Reconciled {
                identity: "user-1".into(),
                window: ReconciliationWindow::empty(NOW),
                count: 0,
            })
        );
        assert_eq!(reconciler.run_state("user-1"), RunState::Idle);
    }

    #[test]
    fn first_run_establishes_baseline() {
        let mut reconciler = Reconciler::default();
        let begin = reconciler.begin(Some("new-user"), None, NOW);
        assert!(matches!(
            begin,
            Begin::Settled(RunOutcome::Reconciled { count: 0, .. })
        ));
        assert_eq!(reconciler.cursor("new-user"), Some(NOW));
    }

    #[test]
    fn seed_is_used_only_when_cursor_missing() {
        let mut reconciler = Reconciler::default();
        let Begin::Query(ticket) = reconciler.begin(Some("user-1"), Some(T0), NOW) else {
            panic!("expected a query");
        };
        assert_eq!(ticket.window.from, T0);
        reconciler.complete(&ticket, Ok(1), Some("user-1"), NOW);

        // A stale seed must not drag the cursor back.
        let begin = reconciler.begin(Some("user-1"), Some(T0), NOW);
        assert!(matches!(begin, Begin::Settled(RunOutcome::Reconciled { .. })));
        assert_eq!(reconciler.cursor("user-1"), Some(NOW));
    }

    #[test]
    fn identity_change_discards_result() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);

        let outcome = reconciler.complete(&ticket, Ok(500), Some("user-2"), NOW);
        assert!(matches!(
            outcome,
            RunOutcome::Discarded {
                reason: DiscardReason::IdentityChanged,
                ..
            }
        ));
        assert!(reconciler.peek("user-1").is_none());
        assert!(reconciler.peek("user-2").is_none());
        assert_eq!(reconciler.cursor("user-1"), None);
        assert_eq!(reconciler.active_identity(), Some(&"user-2".to_string()));
    }

    #[test]
    fn logout_and_back_in_during_run_keeps_run_exclusive() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);

        // A trigger while logged out scopes the identity out.
        reconciler.begin(None, None, NOW + 1);
        assert_eq!(reconciler.cursor("user-1"), None);

        // Logged back in while the first query is still out.
        assert_eq!(
            reconciler.begin(Some("user-1"), Some(T0), NOW + 2),
            Begin::Settled(RunOutcome::Skipped(SkipReason::InFlight))
        );

        let outcome = reconciler.complete(&ticket, Ok(500), Some("user-1"), NOW + 3);
        assert!(matches!(
            outcome,
            RunOutcome::Discarded {
                reason: DiscardReason::Superseded,
                ..
            }
        ));
        assert_eq!(reconciler.run_state("user-1"), RunState::Idle);
        assert!(reconciler.peek("user-1").is_none());

        let retry = match reconciler.begin(Some("user-1"), Some(T0), NOW + 4) {
            Begin::Query(ticket) => ticket,
            other => panic!("expected a query, got {other:?}"),
        };
        assert_eq!(retry.window, ReconciliationWindow::new(T0, NOW + 4).unwrap());
    }

    #[test]
    fn acknowledge_advances_and_is_idempotent() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);
        reconciler.complete(&ticket, Ok(120), Some("user-1"), NOW);

        let ack = reconciler
            .acknowledge("user-1", Decision::Discard)
            .unwrap()
            .unwrap();
        assert_eq!(ack.result.count, 120);
        assert_eq!(ack.decision, Decision::Discard);
        assert_eq!(reconciler.cursor("user-1"), Some(NOW));

        assert_eq!(reconciler.acknowledge("user-1", Decision::Accept), Ok(None));
        assert_eq!(reconciler.cursor("user-1"), Some(NOW));
    }

    #[test]
    fn newer_publish_overwrites_pending() {
        let mut reconciler = reconciler_at(T0);
        let first = start(&mut reconciler, NOW);
        reconciler.complete(&first, Ok(120), Some("user-1"), NOW);

        let second = start(&mut reconciler, NOW + 60_000);
        assert_eq!(second.window.from, T0);
        reconciler.complete(&second, Ok(180), Some("user-1"), NOW + 60_000);

        let pending = reconciler.peek("user-1").unwrap();
        assert_eq!(pending.count, 180);
        assert_eq!(pending.run_id, second.run_id);
    }

    #[test]
    fn acknowledge_during_run_supersedes_the_run() {
        let mut reconciler = reconciler_at(T0);
        let first = start(&mut reconciler, NOW);
        reconciler.complete(&first, Ok(120), Some("user-1"), NOW);

        let second = start(&mut reconciler, NOW + 60_000);
        reconciler.acknowledge("user-1", Decision::Accept).unwrap();

        // The second run's window overlaps what was just acknowledged.
        let outcome = reconciler.complete(&second, Ok(130), Some("user-1"), NOW + 60_000);
        assert!(matches!(
            outcome,
            RunOutcome::Discarded {
                reason: DiscardReason::Superseded,
                ..
            }
        ));
        assert!(reconciler.peek("user-1").is_none());
        assert_eq!(reconciler.cursor("user-1"), Some(NOW));
    }

    #[test]
    fn reconciled_run_supersedes_older_pending() {
        let mut reconciler = reconciler_at(T0);
        let first = start(&mut reconciler, NOW);
        reconciler.complete(&first, Ok(120), Some("user-1"), NOW);

        // Sensor history was lost; the wider window now reports less.
        let second = start(&mut reconciler, NOW + 60_000);
        reconciler.complete(&second, Ok(3), Some("user-1"), NOW + 60_000);

        assert!(reconciler.peek("user-1").is_none());
        assert_eq!(reconciler.acknowledge("user-1", Decision::Accept), Ok(None));
    }

    #[test]
    fn release_is_idempotent_and_run_scoped() {
        let mut reconciler = reconciler_at(T0);
        let ticket = start(&mut reconciler, NOW);

        assert!(!reconciler.release("user-1", ticket.run_id + 1));
        assert!(reconciler.release("user-1", ticket.run_id));
        assert!(!reconciler.release("user-1", ticket.run_id));
        assert_eq!(reconciler.run_state("user-1"), RunState::Idle);
    }
}
