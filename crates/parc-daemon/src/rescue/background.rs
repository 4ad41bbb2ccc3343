//! Detached work that outlives the request that started it

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinSet;

/// Set of detached tasks, each bounded by the background timeout
///
/// Tasks never see the request's context; dropping a request does not
/// cancel them. Shutdown and tests call [`BackgroundTasks::drain`].
#[derive(Debug)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
    timeout: Duration,
}

impl BackgroundTasks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Spawn `work` under the background timeout
    pub fn spawn<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timeout = self.timeout;
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        // Reap finished tasks so the set does not grow without bound
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            if tokio::time::timeout(timeout, work).await.is_err() {
                tracing::warn!(task = label, timeout = ?timeout, "Background task timed out");
            }
        });
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task spawned so far, aborting whatever is left after
    /// `grace`. Returns the number of tasks that completed.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };

        let mut completed = 0;
        let joined = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Background task failed");
                }
                completed += 1;
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!(remaining = tasks.len(), "Aborting background tasks after grace period");
            tasks.abort_all();
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_spawned_work() {
        let tasks = BackgroundTasks::new(Duration::from_secs(5));
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            tasks.spawn("count", async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(tasks.drain(Duration::from_secs(5)).await, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_task_is_bounded_by_timeout() {
        let tasks = BackgroundTasks::new(Duration::from_millis(20));
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        tasks.spawn("slow", async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(tasks.drain(Duration::from_secs(5)).await, 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
