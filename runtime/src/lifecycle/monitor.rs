//! Debounced foreground detection.

use std::time::Duration;

use futures::StreamExt;
use stepsync_engine::{AppPhase, PhaseEdge, PhaseTracker};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::LifecycleSource;
use crate::error::Result;

/// The app returned to the foreground from the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BecameActive {
    /// Position of this event in the monitor's output, starting at 1
    pub sequence: u64,
}

/// Watches a [`LifecycleSource`] and emits [`BecameActive`] on each
/// background-to-active edge.
///
/// Owns a background task for as long as it lives. Dropping the monitor stops
/// the task, which drops the platform subscription.
pub struct LifecycleMonitor {
    phase: watch::Receiver<AppPhase>,
    events: mpsc::UnboundedReceiver<BecameActive>,
    task: JoinHandle<()>,
}

impl LifecycleMonitor {
    /// Subscribe to `source` and start watching.
    ///
    /// An edge arriving less than `debounce` after the previously emitted one
    /// is dropped. Must be called from within a tokio runtime.
    pub fn start(source: &dyn LifecycleSource, debounce: Duration) -> Result<Self> {
        let mut phases = source.subscribe()?;
        let (phase_tx, phase_rx) = watch::channel(AppPhase::Unknown);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut tracker = PhaseTracker::default();
            let mut last_emitted: Option<Instant> = None;
            let mut sequence = 0u64;

            while let Some(phase) = phases.next().await {
                phase_tx.send_replace(phase);

                match tracker.observe(phase) {
                    Some(PhaseEdge::BecameActive) => {
                        let now = Instant::now();
                        if last_emitted.is_some_and(|prev| now.duration_since(prev) < debounce) {
                            tracing::debug!("Dropping BecameActive inside debounce window");
                            continue;
                        }
                        last_emitted = Some(now);
                        sequence += 1;

                        tracing::debug!(sequence, "App became active");
                        if event_tx.send(BecameActive { sequence }).is_err() {
                            break;
                        }
                    }
                    Some(PhaseEdge::WentBackground) => {
                        tracing::debug!("App went to background");
                    }
                    None => {}
                }
            }

            tracing::debug!("Lifecycle subscription ended");
        });

        Ok(Self {
            phase: phase_rx,
            events: event_rx,
            task,
        })
    }

    /// Watch the most recent raw phase, `Unknown` before the first
    /// notification. The receiver keeps the last value after the monitor stops.
    pub fn phases(&self) -> watch::Receiver<AppPhase> {
        self.phase.clone()
    }

    /// Wait for the next `BecameActive`. Returns `None` once the platform
    /// subscription has ended.
    pub async fn next(&mut self) -> Option<BecameActive> {
        self.events.recv().await
    }

    /// Stop watching and unsubscribe.
    pub fn shutdown(self) {}
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
