use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ReconcileError;

/// A spawned loop tied to a cancellation token.
///
/// Dropping the guard cancels the loop; [`BackgroundTask::shutdown`] also
/// waits for it to exit.
#[derive(Debug)]
pub struct BackgroundTask {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `body` with a fresh cancellation token.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.child_token()));
        Self {
            name: name.into(),
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Cancel the loop and wait up to `grace` for it to exit.
    ///
    /// A loop that is still running after `grace` is aborted.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), ReconcileError> {
        self.cancel.cancel();
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {
                debug!(task = %self.name, "Background task stopped");
                Ok(())
            }
            Ok(Err(e)) if e.is_panic() => Err(ReconcileError::Panicked {
                task: self.name.clone(),
                message: e.to_string(),
            }),
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                warn!(task = %self.name, grace_ms = grace.as_millis() as u64, "Aborting straggling background task");
                handle.abort();
                Err(ReconcileError::Straggler {
                    task: self.name.clone(),
                    grace,
                })
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_loop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);

        let task = BackgroundTask::spawn("ticker", move |cancel| async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        task.shutdown(Duration::from_secs(1)).await.unwrap();

        let seen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert_eq!(seen, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_straggler_is_aborted() {
        let task = BackgroundTask::spawn("stubborn", |_cancel| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let err = task.shutdown(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Straggler { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let task = BackgroundTask::spawn("dropped", move |cancel| async move {
            cancel.cancelled().await;
            let _ = tx.send(());
        });

        drop(task);
        rx.await.unwrap();
    }
}
