//! Cooperative cancellation token.
//!
//! A cheap, cloneable wrapper around a shared `AtomicBool`. The executor and
//! the event query engine check it at every suspension point; once set it
//! stays set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::util::error::{HostCareError, Result};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once cancellation was requested, for use with `?`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(HostCareError::Cancelled)
        } else {
            Ok(())
        }
    }
}
