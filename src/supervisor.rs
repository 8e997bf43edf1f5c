//! Worker supervision and process lifecycle.
//!
//! The [`Supervisor`] runs one worker task per enabled tracking mode and
//! fans a single stop signal out to all of them. A worker that dies from a
//! retryable error is rebuilt by its factory under a [`RestartPolicy`] with
//! doubling backoff; a non-retryable error (bad credentials, broken config)
//! stops that mode until the process is restarted. One mode failing never
//! affects the others.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Restart policy for a worker that dies from a retryable error.
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// Maximum restarts before the mode stops for good.
    pub max_restarts: u32,
    /// Backoff before the first restart; doubles on each further restart.
    pub base_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            base_backoff: Duration::from_secs(5),
        }
    }
}

impl RestartPolicy {
    /// Backoff before restart number `attempt` (counted from 1).
    fn backoff_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1 << doublings)
    }
}

struct Worker {
    mode: String,
    handle: JoinHandle<()>,
}

/// Runs one worker per tracking mode and coordinates shutdown.
pub struct Supervisor {
    stop_tx: watch::Sender<bool>,
    workers: Vec<Worker>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// Creates a supervisor with no workers.
    #[must_use]
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            workers: Vec::new(),
        }
    }

    /// Number of workers spawned so far.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Spawns a supervised worker for one tracking mode.
    ///
    /// `factory` builds and runs the worker from scratch (connect, watch,
    /// disconnect) and is re-invoked on every restart, so each attempt gets
    /// a fresh mailbox connection. The receiver passed to the factory flips
    /// to `true` when [`shutdown`](Self::shutdown) is called.
    pub fn spawn<F, Fut>(&mut self, mode: impl Into<String>, policy: RestartPolicy, factory: F)
    where
        F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mode = mode.into();
        let stop = self.stop_tx.subscribe();
        let handle = tokio::spawn(run_supervised(mode.clone(), policy, factory, stop));
        self.workers.push(Worker { mode, handle });
    }

    /// Signals every worker to stop and waits up to `grace` for each.
    ///
    /// A worker still running when its grace period elapses is abandoned
    /// (its task is aborted); a worker blocked in a network call can only
    /// observe the stop signal once that call's own timeout fires, so this
    /// never blocks shutdown indefinitely.
    pub async fn shutdown(self, grace: Duration) {
        info!(workers = self.workers.len(), "Stopping workers");
        let _ = self.stop_tx.send(true);

        for Worker { mode, handle } in self.workers {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => info!(mode = %mode, "Worker stopped"),
                Ok(Err(join_error)) => {
                    error!(mode = %mode, error = %join_error, "Worker task panicked");
                }
                Err(_) => {
                    warn!(
                        mode = %mode,
                        grace_secs = grace.as_secs(),
                        "Worker did not stop within grace period, abandoning"
                    );
                }
            }
        }
    }
}

/// Runs one worker to completion, restarting it per the policy.
async fn run_supervised<F, Fut>(
    mode: String,
    policy: RestartPolicy,
    factory: F,
    mut stop: watch::Receiver<bool>,
) where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut restarts = 0u32;

    loop {
        if *stop.borrow() {
            break;
        }

        match factory(stop.clone()).await {
            Ok(()) => {
                info!(mode = %mode, "Worker finished");
                break;
            }
            Err(error) if !error.is_retryable() => {
                error!(
                    mode = %mode,
                    category = %error.category(),
                    error = %error,
                    "Worker failed permanently; mode disabled until process restart"
                );
                break;
            }
            Err(error) if restarts >= policy.max_restarts => {
                error!(
                    mode = %mode,
                    restarts,
                    error = %error,
                    "Worker failed and restart limit reached; mode disabled until process restart"
                );
                break;
            }
            Err(error) => {
                restarts += 1;
                let backoff = policy.backoff_for(restarts);
                warn!(
                    mode = %mode,
                    restart = restarts,
                    backoff_secs = backoff.as_secs(),
                    error = %error,
                    "Worker failed, restarting after backoff"
                );
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    _ = stop.changed() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn transient() -> Error {
        Error::Notify {
            message: "simulated transient failure".into(),
        }
    }

    fn fatal() -> Error {
        Error::InvalidConfig {
            message: "simulated fatal failure".into(),
        }
    }

    #[test]
    fn test_backoff_doubles_per_restart() {
        let policy = RestartPolicy {
            max_restarts: 5,
            base_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_restarts_up_to_cap() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_factory = Arc::clone(&calls);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let policy = RestartPolicy {
            max_restarts: 2,
            base_backoff: Duration::from_millis(10),
        };

        run_supervised(
            "test".to_string(),
            policy,
            move |_stop| {
                calls_in_factory.fetch_add(1, Ordering::SeqCst);
                let result: Result<()> = Err(transient());
                async move { result }
            },
            stop_rx,
        )
        .await;

        // Initial attempt plus two restarts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_is_not_restarted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_factory = Arc::clone(&calls);
        let (_stop_tx, stop_rx) = watch::channel(false);

        run_supervised(
            "test".to_string(),
            RestartPolicy::default(),
            move |_stop| {
                calls_in_factory.fetch_add(1, Ordering::SeqCst);
                let result: Result<()> = Err(fatal());
                async move { result }
            },
            stop_rx,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_exit_is_not_restarted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_factory = Arc::clone(&calls);
        let (_stop_tx, stop_rx) = watch::channel(false);

        run_supervised(
            "test".to_string(),
            RestartPolicy::default(),
            move |_stop| {
                calls_in_factory.fetch_add(1, Ordering::SeqCst);
                let result: Result<()> = Ok(());
                async move { result }
            },
            stop_rx,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_signal_cancels_restart_backoff() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_factory = Arc::clone(&calls);
        let (stop_tx, stop_rx) = watch::channel(false);
        let policy = RestartPolicy {
            max_restarts: 5,
            base_backoff: Duration::from_secs(3600),
        };

        let handle = tokio::spawn(run_supervised(
            "test".to_string(),
            policy,
            move |_stop| {
                calls_in_factory.fetch_add(1, Ordering::SeqCst);
                let result: Result<()> = Err(transient());
                async move { result }
            },
            stop_rx,
        ));

        // Let the worker fail once and enter its hour-long backoff
        tokio::time::sleep(Duration::from_millis(1)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_workers_within_grace() {
        let mut supervisor = Supervisor::new();
        let observed_stop = Arc::new(AtomicBool::new(false));
        let observed_in_worker = Arc::clone(&observed_stop);

        supervisor.spawn("idle", RestartPolicy::default(), move |mut stop| {
            let observed = Arc::clone(&observed_in_worker);
            async move {
                while !*stop.borrow() {
                    if stop.changed().await.is_err() {
                        break;
                    }
                }
                observed.store(true, Ordering::SeqCst);
                let result: Result<()> = Ok(());
                result
            }
        });

        assert_eq!(supervisor.worker_count(), 1);
        supervisor.shutdown(Duration::from_secs(5)).await;
        assert!(observed_stop.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_stragglers() {
        let mut supervisor = Supervisor::new();

        // Ignores the stop signal entirely
        supervisor.spawn("stuck", RestartPolicy::default(), |_stop| async move {
            futures::future::pending::<()>().await;
            let result: Result<()> = Ok(());
            result
        });

        // Must return despite the worker never stopping
        supervisor.shutdown(Duration::from_secs(2)).await;
    }
}
