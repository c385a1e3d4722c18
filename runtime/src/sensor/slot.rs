//! Holder for a resource only one instance of which may be live at a time.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// A resource that must be explicitly stopped before it is dropped.
pub trait Releasable: Send + Sync {
    /// Stop the resource and free whatever it holds.
    fn release(&self) -> Result<()>;
}

/// Owns at most one live instance of an exclusive resource.
///
/// Installing a new instance releases the previous one first. A failed release
/// is logged and does not stop the install. Whatever is held when the slot is
/// dropped gets released too.
pub struct ExclusiveSlot<T: ?Sized + Releasable> {
    current: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized + Releasable> ExclusiveSlot<T> {
    pub fn empty() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// The live instance, if any.
    pub fn current(&self) -> Option<Arc<T>> {
        self.lock().clone()
    }

    /// Release the current instance and install `next`.
    pub fn install(&self, next: Arc<T>) -> Arc<T> {
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            release_logged(previous.as_ref());
        }
        *current = Some(Arc::clone(&next));
        next
    }

    /// Release and drop the current instance. Returns whether one was held.
    pub fn release(&self) -> bool {
        match self.lock().take() {
            Some(previous) => {
                release_logged(previous.as_ref());
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: ?Sized + Releasable> Default for ExclusiveSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized + Releasable> Drop for ExclusiveSlot<T> {
    fn drop(&mut self) {
        self.release();
    }
}

fn release_logged<T: ?Sized + Releasable>(resource: &T) {
    if let Err(err) = resource.release() {
        tracing::warn!(error = %err, "Failed to release exclusive resource");
    }
}
