//! Lifecycle source fed through an in-process channel.

use std::sync::Mutex;

use futures::stream::{self, BoxStream, StreamExt};
use stepsync_engine::AppPhase;
use tokio::sync::mpsc;

use super::LifecycleSource;
use crate::error::{Result, RuntimeError};

/// Sender half handed to whatever delivers platform phases.
pub type PhaseSender = mpsc::UnboundedSender<AppPhase>;

/// A [`LifecycleSource`] driven by a [`PhaseSender`].
///
/// Supports a single subscription. Once the subscriber drops its stream the
/// sender reports closed.
#[derive(Debug)]
pub struct ChannelLifecycle {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<AppPhase>>>,
}

impl ChannelLifecycle {
    pub fn new() -> (Self, PhaseSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            receiver: Mutex::new(Some(rx)),
        };
        (source, tx)
    }

    /// A source whose subscription always fails, as on a platform without
    /// lifecycle notifications.
    pub fn unavailable() -> Self {
        Self {
            receiver: Mutex::new(None),
        }
    }
}

impl LifecycleSource for ChannelLifecycle {
    fn subscribe(&self) -> Result<BoxStream<'static, AppPhase>> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| {
                RuntimeError::Platform("lifecycle channel already subscribed".to_string())
            })?;

        Ok(stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|phase| (phase, rx))
        })
        .boxed())
    }
}
