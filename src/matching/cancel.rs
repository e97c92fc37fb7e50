use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{DeskshotError, Result};

/// Cooperative cancellation flag shared between a search and its caller.
///
/// Clones observe the same flag. Searches poll it once per output row.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DeskshotError::Cancelled)
        } else {
            Ok(())
        }
    }
}
