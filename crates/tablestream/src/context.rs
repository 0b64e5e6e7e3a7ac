use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ExecuteOptions;
use crate::dataset::DatasetId;
use crate::error::{Error, Result};
use crate::window::Bounds;

/// A shared flag that cancels an execution. Checked at message boundaries only.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

/// What a transformation constructor learns about its place in the execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    /// Global time range of the query, when one was given.
    pub bounds: Option<Bounds>,
    /// Datasets feeding the transformation.
    pub parents: Vec<DatasetId>,
    pub options: ExecuteOptions,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(options: ExecuteOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    #[must_use]
    pub fn with_parents(mut self, parents: Vec<DatasetId>) -> Self {
        self.parents = parents;
        self
    }
}
