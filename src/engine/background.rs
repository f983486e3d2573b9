//! Supervised background work
//!
//! Runs a future on its own task and hands the result back over a oneshot
//! channel. Failure, panic or cancellation yields `None` with a warning; the
//! parent command carries on. Dropping the handle without joining aborts the
//! task.

use std::fmt::Display;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct BackgroundTask<T> {
    name: &'static str,
    rx: oneshot::Receiver<T>,
    handle: JoinHandle<()>,
    joined: bool,
}

/// Spawn `work` under supervision. It is abandoned when `cancel` fires.
pub fn spawn_supervised<F, T, E>(
    name: &'static str,
    cancel: CancellationToken,
    work: F,
) -> BackgroundTask<T>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(task = name, "Background task cancelled");
            }
            result = work => match result {
                Ok(value) => {
                    // The receiver may have been dropped; nothing to do then.
                    let _ = tx.send(value);
                }
                Err(e) => {
                    tracing::warn!(task = name, error = %e, "Background task failed");
                }
            },
        }
    });

    BackgroundTask {
        name,
        rx,
        handle,
        joined: false,
    }
}

impl<T> BackgroundTask<T> {
    /// Wait for the task. `None` when it failed, panicked or was cancelled.
    pub async fn join(mut self) -> Option<T> {
        self.joined = true;
        match (&mut self.rx).await {
            Ok(value) => Some(value),
            Err(_) => {
                if let Err(e) = (&mut self.handle).await {
                    if e.is_panic() {
                        tracing::warn!(task = self.name, "Background task panicked");
                    }
                }
                None
            }
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// A task that is never joined, e.g. because its parent command failed
/// early, is aborted rather than left running detached.
impl<T> Drop for BackgroundTask<T> {
    fn drop(&mut self) {
        if !self.joined && !self.handle.is_finished() {
            tracing::debug!(task = self.name, "Background task dropped before completion");
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn successful_task_returns_value() {
        let task = spawn_supervised("ok", CancellationToken::new(), async {
            Ok::<_, String>(42)
        });
        assert_eq!(task.join().await, Some(42));
    }

    #[tokio::test]
    async fn failed_task_returns_none() {
        let task = spawn_supervised("fail", CancellationToken::new(), async {
            Err::<u32, _>("plugin unreachable".to_string())
        });
        assert_eq!(task.join().await, None);
    }

    #[tokio::test]
    async fn panicking_task_returns_none() {
        let task = spawn_supervised("panic", CancellationToken::new(), async {
            if true {
                panic!("boom");
            }
            Ok::<u32, String>(1)
        });
        assert_eq!(task.join().await, None);
    }

    #[tokio::test]
    async fn cancelled_task_returns_none() {
        let cancel = CancellationToken::new();
        let task = spawn_supervised("slow", cancel.clone(), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<u32, String>(1)
        });
        cancel.cancel();
        assert_eq!(task.join().await, None);
    }

    #[tokio::test]
    async fn dropped_task_is_aborted() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let task = spawn_supervised("detached", CancellationToken::new(), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<u32, String>(1)
        });

        drop(task);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
