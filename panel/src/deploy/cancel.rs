//! Cancellation between pipeline steps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::PanelError;

/// Stop request shared by a session and the job running for it.
///
/// A step already in flight is never interrupted; the flag is checked before
/// the next one starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once a stop was requested
    pub fn check(&self) -> Result<(), PanelError> {
        if self.is_cancelled() {
            Err(PanelError::Cancelled)
        } else {
            Ok(())
        }
    }
}
