//! A sensor that reports a fixed rate of activity.
//!
//! Used by the developer harness in place of real hardware.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use stepsync_engine::{ReconciliationWindow, SensorError};

use super::{Releasable, SensorGateway};
use crate::error::Result;

const MS_PER_MINUTE: u64 = 60_000;

/// Reports `events_per_minute` for every minute of any window.
#[derive(Debug)]
pub struct SyntheticSensor {
    events_per_minute: u64,
    available: AtomicBool,
    released: AtomicBool,
}

impl SyntheticSensor {
    pub fn new(events_per_minute: u64) -> Self {
        Self {
            events_per_minute,
            available: AtomicBool::new(true),
            released: AtomicBool::new(false),
        }
    }

    /// Simulate the user revoking or granting motion permission.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn permission_granted(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// A released handle no longer reaches the motion service.
    fn ensure_live(&self) -> std::result::Result<(), SensorError> {
        if self.is_released() {
            return Err(SensorError::Platform("sensor handle released".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SensorGateway for SyntheticSensor {
    async fn is_available(&self) -> std::result::Result<bool, SensorError> {
        self.ensure_live()?;
        Ok(self.permission_granted())
    }

    async fn count_events(
        &self,
        window: &ReconciliationWindow,
    ) -> std::result::Result<u64, SensorError> {
        self.ensure_live()?;
        if !self.permission_granted() {
            return Err(SensorError::Unavailable("motion permission revoked".into()));
        }
        // Whole events only; partial minutes contribute proportionally.
        let events = u128::from(window.duration_ms()) * u128::from(self.events_per_minute)
            / u128::from(MS_PER_MINUTE);
        Ok(u64::try_from(events).unwrap_or(u64::MAX))
    }
}

impl Releasable for SyntheticSensor {
    fn release(&self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_proportionally() {
        let sensor = SyntheticSensor::new(120);
        let hour = ReconciliationWindow::new(0, 3_600_000).unwrap();
        assert_eq!(sensor.count_events(&hour).await.unwrap(), 7_200);

        let half_minute = ReconciliationWindow::new(0, 30_000).unwrap();
        assert_eq!(sensor.count_events(&half_minute).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn monotonic_in_window_size() {
        let sensor = SyntheticSensor::new(7);
        let mut previous = 0;
        for to in (0..600_000).step_by(12_345) {
            let count = sensor
                .count_events(&ReconciliationWindow::new(0, to).unwrap())
                .await
                .unwrap();
            assert!(count >= previous);
            previous = count;
        }
    }

    #[tokio::test]
    async fn unavailable_when_revoked() {
        let sensor = SyntheticSensor::new(100);
        sensor.set_available(false);
        assert!(!sensor.is_available().await.unwrap());
        assert!(matches!(
            sensor
                .count_events(&ReconciliationWindow::new(0, 1).unwrap())
                .await,
            Err(SensorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn released_handle_is_a_platform_error() {
        let sensor = SyntheticSensor::new(100);
        sensor.release().unwrap();

        assert!(sensor.is_released());
        assert!(matches!(
            sensor.is_available().await,
            Err(SensorError::Platform(_))
        ));
        assert!(matches!(
            sensor
                .count_events(&ReconciliationWindow::new(0, 1).unwrap())
                .await,
            Err(SensorError::Platform(_))
        ));
    }
}
