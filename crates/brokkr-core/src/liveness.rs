//! Cached liveness check
//!
//! The "alive + last checked" pair behind every session and connectivity
//! check in Brokkr. A positive result is trusted for `ttl`; negative results
//! are never cached, so the next caller always re-checks.
//!
//! The state lock is held across the probe, so two callers that find the
//! cache stale never run overlapping probes.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Snapshot of a liveness check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessState {
    pub alive: bool,
    pub checked_at: Option<Instant>,
}

impl LivenessState {
    /// True when a positive result is still inside the TTL window
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        match self.checked_at {
            Some(at) if self.alive => now.saturating_duration_since(at) < ttl,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct CachedLivenessCheck {
    ttl: Duration,
    state: Mutex<LivenessState>,
}

impl CachedLivenessCheck {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(LivenessState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached result if fresh, otherwise run `probe` and record it.
    ///
    /// `force` skips the cache. A probe error leaves the check marked not alive
    /// and is returned unchanged.
    pub async fn check<F, Fut, E>(&self, force: bool, probe: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let mut state = self.state.lock().await;

        if !force && state.is_fresh(self.ttl, Instant::now()) {
            trace!("Liveness cache hit");
            return Ok(true);
        }

        match probe().await {
            Ok(true) => {
                *state = LivenessState {
                    alive: true,
                    checked_at: Some(Instant::now()),
                };
                Ok(true)
            }
            Ok(false) => {
                state.alive = false;
                Ok(false)
            }
            Err(e) => {
                state.alive = false;
                Err(e)
            }
        }
    }

    /// Record an externally established success (e.g. right after sign-in)
    pub async fn mark_alive(&self) {
        *self.state.lock().await = LivenessState {
            alive: true,
            checked_at: Some(Instant::now()),
        };
    }

    /// Forget the cached result
    pub async fn invalidate(&self) {
        *self.state.lock().await = LivenessState::default();
    }

    pub async fn snapshot(&self) -> LivenessState {
        *self.state.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_probe(
        calls: &Arc<AtomicUsize>,
        result: bool,
    ) -> impl FnOnce() -> std::future::Ready<Result<bool, ()>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(result))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_positive_result_is_cached_within_ttl() {
        let check = CachedLivenessCheck::new(Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(check.check(false, counting_probe(&calls, true)).await.unwrap());
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(check.check(false, counting_probe(&calls, true)).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(check.check(false, counting_probe(&calls, true)).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_negative_result_is_not_cached() {
        let check = CachedLivenessCheck::new(Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        assert!(!check.check(false, counting_probe(&calls, false)).await.unwrap());
        assert!(!check.check(false, counting_probe(&calls, false)).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let check = CachedLivenessCheck::new(Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        check.check(false, counting_probe(&calls, true)).await.unwrap();
        check.check(true, counting_probe(&calls, true)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_resets_state() {
        let check = CachedLivenessCheck::new(Duration::from_secs(600));
        check.mark_alive().await;
        assert!(check.snapshot().await.alive);

        let result: Result<bool, &str> = check.check(true, || async { Err("boom") }).await;
        assert_eq!(result, Err("boom"));
        assert!(!check.snapshot().await.alive);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recheck() {
        let check = CachedLivenessCheck::new(Duration::from_secs(600));
        let calls = Arc::new(AtomicUsize::new(0));

        check.check(false, counting_probe(&calls, true)).await.unwrap();
        check.invalidate().await;
        check.check(false, counting_probe(&calls, true)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_probe() {
        let check = Arc::new(CachedLivenessCheck::new(Duration::from_secs(600)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let check = Arc::clone(&check);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                check
                    .check(false, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ()>(true)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
