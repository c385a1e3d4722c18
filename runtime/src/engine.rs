//! The reconciliation engine.
//!
//! Wraps the pure [`Reconciler`] with the collaborators it needs: a session
//! for identity and cursor persistence, a clock, and the sensor slot. Each
//! trigger runs as its own task so that a trigger arriving while a run is in
//! flight reaches the reconciler and is coalesced instead of queued.
//!
//! Reconciler state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`. The only suspension points in a run are the sensor's
//! availability check and the count query.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use stepsync_engine::{
    Acknowledgement, AppPhase, Begin, Decision, PendingResult, ReconcilePolicy,
    ReconciliationWindow, Reconciler, RunId, RunOutcome, RunState, SensorError, Timestamp,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::Config;
use crate::lifecycle::{LifecycleMonitor, LifecycleSource};
use crate::sensor::{ExclusiveSlot, SensorGateway};
use crate::session::SessionProvider;

/// What caused a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The eager run when the engine starts.
    Startup,
    /// The app came back from the background.
    BecameActive,
    /// Requested explicitly by the host.
    Manual,
}

struct Shared {
    state: Mutex<Reconciler>,
    sensor: ExclusiveSlot<dyn SensorGateway>,
    session: Arc<dyn SessionProvider>,
    clock: Arc<dyn Clock>,
    query_timeout: Duration,
    /// Serializes cursor persists so the stored value only moves forward.
    persist_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    fn with_state<R>(&self, f: impl FnOnce(&mut Reconciler) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

/// Returns a run's identity to idle when dropped, whichever way the run ends.
struct RunGuard<'a> {
    shared: &'a Shared,
    identity: &'a str,
    run_id: RunId,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.shared
            .with_state(|state| state.release(self.identity, self.run_id));
    }
}

/// Orchestrates reconciliation runs. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReconciliationEngine {
    shared: Arc<Shared>,
}

impl ReconciliationEngine {
    pub fn new(
        policy: ReconcilePolicy,
        session: Arc<dyn SessionProvider>,
        clock: Arc<dyn Clock>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Reconciler::new(policy)),
                sensor: ExclusiveSlot::empty(),
                session,
                clock,
                query_timeout,
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn from_config(
        config: &Config,
        session: Arc<dyn SessionProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(config.policy(), session, clock, config.query_timeout)
    }

    /// Install a sensor, releasing the one held before.
    pub fn install_sensor(&self, sensor: Arc<dyn SensorGateway>) -> Arc<dyn SensorGateway> {
        tracing::info!("Installing motion sensor");
        self.shared.sensor.install(sensor)
    }

    /// Release the installed sensor. Runs fail as unavailable until another
    /// is installed.
    pub fn release_sensor(&self) -> bool {
        self.shared.sensor.release()
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.shared.with_state(|state| state.policy())
    }

    /// The pending result for `identity`, for the UI to render.
    pub fn peek(&self, identity: &str) -> Option<PendingResult> {
        self.shared.with_state(|state| state.peek(identity).cloned())
    }

    /// The pending result for whoever is logged in.
    pub fn peek_current(&self) -> Option<PendingResult> {
        let identity = self.shared.session.current_identity()?;
        self.peek(&identity)
    }

    pub fn cursor(&self, identity: &str) -> Option<Timestamp> {
        self.shared.with_state(|state| state.cursor(identity))
    }

    pub fn is_in_flight(&self, identity: &str) -> bool {
        self.shared.with_state(|state| {
            matches!(state.run_state(identity), RunState::InFlight { .. })
        })
    }

    /// Run one reconciliation pass.
    ///
    /// Never fails: sensor and platform problems come back as
    /// [`RunOutcome::Failed`] and are retried on the next trigger.
    pub async fn trigger(&self, trigger: Trigger) -> RunOutcome {
        let shared = &self.shared;
        let identity = shared.session.current_identity();
        let seed = identity
            .as_deref()
            .and_then(|id| shared.session.last_sync_timestamp(id));
        let now = shared.clock.now();

        let ticket = match shared.with_state(|state| state.begin(identity.as_deref(), seed, now)) {
            Begin::Settled(outcome) => {
                self.finish(trigger, &outcome).await;
                return outcome;
            }
            Begin::Query(ticket) => ticket,
        };

        tracing::debug!(
            ?trigger,
            identity = %ticket.identity,
            run_id = ticket.run_id,
            from = ticket.window.from,
            to = ticket.window.to,
            "Reconciliation run started"
        );

        let guard = RunGuard {
            shared: shared.as_ref(),
            identity: &ticket.identity,
            run_id: ticket.run_id,
        };
        let result = self.query(&ticket.window).await;
        let current = shared.session.current_identity();
        let completed_at = shared.clock.now();
        let outcome = shared.with_state(|state| {
            state.complete(&ticket, result, current.as_deref(), completed_at)
        });
        drop(guard);

        self.finish(trigger, &outcome).await;
        outcome
    }

    /// Resolve the pending result for `identity` and persist the new cursor.
    ///
    /// Returns `None` when nothing was pending.
    pub async fn acknowledge(
        &self,
        identity: &str,
        decision: Decision,
    ) -> Option<Acknowledgement> {
        match self
            .shared
            .with_state(|state| state.acknowledge(identity, decision))
        {
            Ok(Some(ack)) => {
                tracing::info!(
                    identity = %identity,
                    ?decision,
                    count = ack.result.count,
                    to = ack.result.window.to,
                    "Pending result acknowledged"
                );
                self.persist_cursor(identity, ack.result.window.to).await;
                Some(ack)
            }
            Ok(None) => {
                tracing::debug!(identity = %identity, "Nothing pending to acknowledge");
                None
            }
            Err(err) => {
                tracing::error!(identity = %identity, error = %err, "Cursor rejected acknowledgment");
                None
            }
        }
    }

    /// Spawn a run on its own task.
    pub fn spawn_run(&self, trigger: Trigger) -> JoinHandle<RunOutcome> {
        let engine = self.clone();
        tokio::spawn(async move { engine.trigger(trigger).await })
    }

    /// Run at startup, then once per `BecameActive` from `source`.
    ///
    /// If the lifecycle subscription can't be established, only the startup
    /// run happens.
    pub fn start(&self, source: &dyn LifecycleSource, debounce: Duration) -> EngineHandle {
        self.spawn_run(Trigger::Startup);

        let mut monitor = match LifecycleMonitor::start(source, debounce) {
            Ok(monitor) => monitor,
            Err(err) => {
                tracing::warn!(error = %err, "Lifecycle unavailable, reconciling at startup only");
                let (_, phase) = watch::channel(AppPhase::Unknown);
                return EngineHandle { task: None, phase };
            }
        };
        let phase = monitor.phases();

        let engine = self.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = monitor.next().await {
                tracing::debug!(sequence = event.sequence, "Foreground trigger");
                engine.spawn_run(Trigger::BecameActive);
            }
        });

        EngineHandle {
            task: Some(task),
            phase,
        }
    }

    async fn query(&self, window: &ReconciliationWindow) -> Result<u64, SensorError> {
        let sensor = self
            .shared
            .sensor
            .current()
            .ok_or_else(|| SensorError::Unavailable("no sensor installed".to_string()))?;

        if !sensor.is_available().await? {
            return Err(SensorError::Unavailable(
                "sensor reports unavailable".to_string(),
            ));
        }

        let timeout = self.shared.query_timeout;
        tokio::time::timeout(timeout, sensor.count_events(window))
            .await
            .map_err(|_| SensorError::Query(format!("count query timed out after {timeout:?}")))?
    }

    async fn finish(&self, trigger: Trigger, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Skipped(reason) => {
                tracing::debug!(?trigger, ?reason, "Reconciliation skipped");
            }
            RunOutcome::Reconciled {
                identity,
                window,
                count,
            } => {
                tracing::info!(
                    ?trigger,
                    identity = %identity,
                    count,
                    from = window.from,
                    to = window.to,
                    "Window reconciled"
                );
            }
            RunOutcome::Published(result) => {
                tracing::info!(
                    ?trigger,
                    identity = %result.identity,
                    run_id = result.run_id,
                    count = result.count,
                    from = result.window.from,
                    to = result.window.to,
                    "Pending result published"
                );
            }
            RunOutcome::Failed {
                identity, error, ..
            } => match error {
                SensorError::Unavailable(_) => {
                    tracing::debug!(identity = %identity, error = %error, "Sensor unavailable");
                }
                SensorError::Platform(_) | SensorError::Query(_) => {
                    tracing::warn!(identity = %identity, error = %error, "Sensor query failed");
                }
            },
            RunOutcome::Discarded {
                identity, reason, ..
            } => {
                tracing::info!(identity = %identity, ?reason, "Run result discarded");
            }
            RunOutcome::Rejected(err) => {
                tracing::error!(error = %err, "Reconciler rejected run result");
            }
        }

        if let Some((identity, at)) = outcome.advanced_cursor() {
            self.persist_cursor(identity, at).await;
        }
    }

    /// Persist `advanced_to`, or the in-memory cursor if it has moved further.
    ///
    /// `advanced_to` is captured when the cursor moves, so the write survives
    /// the identity being scoped out while this waits on another persist.
    async fn persist_cursor(&self, identity: &str, advanced_to: Timestamp) {
        let _serial = self.shared.persist_lock.lock().await;
        let at = self
            .shared
            .with_state(|state| state.cursor(identity))
            .map_or(advanced_to, |current| current.max(advanced_to));
        if let Err(err) = self
            .shared
            .session
            .persist_sync_timestamp(identity, at)
            .await
        {
            tracing::warn!(identity = %identity, error = %err, "Failed to persist sync cursor");
        }
    }
}

/// Keeps the engine's lifecycle task alive. Dropping it stops the task and
/// unsubscribes from lifecycle notifications; runs already started finish on
/// their own.
pub struct EngineHandle {
    task: Option<JoinHandle<()>>,
    phase: watch::Receiver<AppPhase>,
}

impl EngineHandle {
    pub fn shutdown(self) {}

    /// The most recent raw phase reported by the platform. Stays `Unknown`
    /// when lifecycle notifications are unavailable.
    pub fn phase(&self) -> AppPhase {
        *self.phase.borrow()
    }

    /// Whether lifecycle-driven runs have stopped.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
