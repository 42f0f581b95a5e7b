//! Background session keep-alive
//!
//! One worker per account re-validates the session on a fixed interval so an
//! idle CLI session does not time out between lookups. A worker stops on
//! cancellation, when its session is dropped, or the first time the session
//! is found invalid; it removes its own registry entry on the way out so a
//! later sign-in can arm a fresh one.

use crate::session::AuthSession;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Worker {
    id: u64,
    cancel: CancellationToken,
}

/// Tracks the running keep-alive workers, at most one per account
#[derive(Debug, Default)]
pub struct KeepAliveRegistry {
    workers: Mutex<HashMap<String, Worker>>,
    next_id: AtomicU64,
}

impl KeepAliveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a worker for `account` unless one is already running.
    ///
    /// Returns `true` if a worker was spawned. Outside a tokio runtime this
    /// is a no-op.
    pub fn arm(
        self: &Arc<Self>,
        account: &str,
        session: Weak<AuthSession>,
        interval: Duration,
    ) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(account, "No runtime; keep-alive not started");
            return false;
        };

        let (id, cancel) = {
            let mut workers = self.lock();
            if workers.contains_key(account) {
                return false;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let cancel = CancellationToken::new();
            workers.insert(
                account.to_string(),
                Worker {
                    id,
                    cancel: cancel.clone(),
                },
            );
            (id, cancel)
        };

        let registry = Arc::downgrade(self);
        let account = account.to_string();
        runtime.spawn(async move {
            run_keepalive_loop(&account, session, interval, cancel).await;
            if let Some(registry) = registry.upgrade() {
                registry.release(&account, id);
            }
        });
        true
    }

    pub fn is_running(&self, account: &str) -> bool {
        self.lock().contains_key(account)
    }

    /// Number of live workers
    pub fn running(&self) -> usize {
        self.lock().len()
    }

    /// Cancel the worker for `account`, if any
    pub fn stop(&self, account: &str) -> bool {
        match self.lock().remove(account) {
            Some(worker) => {
                worker.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every worker
    pub fn shutdown(&self) {
        let workers: Vec<Worker> = self.lock().drain().map(|(_, w)| w).collect();
        if !workers.is_empty() {
            debug!(count = workers.len(), "Stopping keep-alive workers");
        }
        for worker in workers {
            worker.cancel.cancel();
        }
    }

    /// Remove the entry for `account` if it still belongs to worker `id`
    fn release(&self, account: &str, id: u64) {
        let mut workers = self.lock();
        if workers.get(account).is_some_and(|w| w.id == id) {
            workers.remove(account);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Worker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for KeepAliveRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_keepalive_loop(
    account: &str,
    session: Weak<AuthSession>,
    period: Duration,
    cancel: CancellationToken,
) {
    let Some(start) = Instant::now()
        .checked_add(period)
        .filter(|_| !period.is_zero())
    else {
        warn!(account, interval = ?period, "Keep-alive interval out of range; worker not started");
        return;
    };
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(account, interval_secs = period.as_secs(), "Session keep-alive started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(account, "Session keep-alive cancelled");
                break;
            }
            _ = ticker.tick() => {
                let Some(session) = session.upgrade() else {
                    debug!(account, "Session dropped; keep-alive exiting");
                    break;
                };
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = session.is_authenticated() => result,
                };
                match result {
                    Ok(true) => debug!(account, "Session still valid"),
                    Ok(false) => {
                        warn!(account, "Vault session is no longer valid; sign in again to resume keep-alive");
                        break;
                    }
                    Err(e) => {
                        warn!(account, error = %e, "Session check failed; keep-alive stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_worker_exits_when_session_is_gone() {
        let registry = Arc::new(KeepAliveRegistry::new());
        assert!(registry.arm("my", Weak::new(), Duration::from_secs(60)));
        assert!(!registry.arm("my", Weak::new(), Duration::from_secs(60)));
        assert!(registry.is_running("my"));

        tokio::time::sleep(Duration::from_secs(61)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!registry.is_running("my"));
    }

    #[tokio::test]
    async fn test_out_of_range_interval_releases_the_account() {
        let registry = Arc::new(KeepAliveRegistry::new());
        assert!(registry.arm("my", Weak::new(), Duration::MAX));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!registry.is_running("my"));

        assert!(registry.arm("my", Weak::new(), Duration::ZERO));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.running(), 0);
    }

    #[tokio::test]
    async fn test_stop_and_shutdown() {
        let registry = Arc::new(KeepAliveRegistry::new());
        registry.arm("a", Weak::new(), Duration::from_secs(3600));
        registry.arm("b", Weak::new(), Duration::from_secs(3600));
        assert_eq!(registry.running(), 2);

        assert!(registry.stop("a"));
        assert!(!registry.stop("a"));
        registry.shutdown();
        assert_eq!(registry.running(), 0);
    }

    #[test]
    fn test_arm_outside_runtime_is_noop() {
        let registry = Arc::new(KeepAliveRegistry::new());
        assert!(!registry.arm("my", Weak::new(), Duration::from_secs(1)));
        assert_eq!(registry.running(), 0);
    }
}
