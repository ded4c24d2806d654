//! Detached background work.
//!
//! Write-throughs and stale-while-revalidate refreshes run as detached tokio
//! tasks. Their outcome is visible only through logs, never through the
//! result of the request that started them. Handles are kept so shutdown and
//! tests can wait for them; dropping the tracker detaches, it never aborts.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Tracker for detached tasks.
#[derive(Clone, Debug, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a detached task.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait until every tracked task, including tasks spawned by tracked
    /// tasks, has finished.
    pub async fn settle(&self) {
        loop {
            let batch = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_waits_for_nested_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));

        let inner_tasks = tasks.clone();
        let inner_done = done.clone();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let nested_done = inner_done.clone();
            inner_tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                nested_done.fetch_add(1, Ordering::SeqCst);
            });
            inner_done.fetch_add(1, Ordering::SeqCst);
        });

        tasks.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_settle_with_nothing_pending() {
        let tasks = BackgroundTasks::new();
        tasks.settle().await;
        assert_eq!(tasks.pending(), 0);
    }
}
