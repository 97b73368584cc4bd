use std::sync::Arc;

use tokio::sync::Semaphore;

use cosign_core::error::{CosignError, Result};

/// Bounded pool for blocking work (generator calls, file rendering).
///
/// Jobs run on tokio's blocking threads; the semaphore caps how many run at once
/// so a burst of agreements cannot starve the runtime.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently holding a slot.
    pub fn busy(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Run `job` on a blocking thread once a slot is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CosignError::PoolClosed)?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| CosignError::Generator(format!("worker task failed: {}", e)))?
    }
}
