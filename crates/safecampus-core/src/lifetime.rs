//! Lifetime extension for event handlers.
//!
//! Every handler registers its asynchronous work here instead of spawning
//! it detached. The host must `settle()` the lifetime before it lets the
//! worker suspend; otherwise in-flight cache writes and fetches are cut off.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::error;

/// Outcome of waiting for all registered work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settled {
    pub completed: usize,
    pub panicked: usize,
}

#[derive(Clone, Default)]
pub struct Lifetime {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Lifetime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `work` now and keep the worker alive until it finishes.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    /// Number of registered tasks not yet collected by `settle`.
    pub fn pending(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.iter().filter(|t| !t.is_finished()).count(),
            Err(poisoned) => poisoned.into_inner().iter().filter(|t| !t.is_finished()).count(),
        }
    }

    fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Wait for every registered task, including ones registered while waiting.
    pub async fn settle(&self) -> Settled {
        let mut settled = Settled::default();
        loop {
            let batch = self.take_tasks();
            if batch.is_empty() {
                return settled;
            }
            for result in futures::future::join_all(batch).await {
                match result {
                    Ok(()) => settled.completed += 1,
                    Err(e) => {
                        error!(error = %e, "Lifetime task did not complete");
                        settled.panicked += 1;
                    }
                }
            }
        }
    }
}
