//! Polling with exponential backoff.

use std::time::{Duration, Instant};

/// Poll `pred` until it holds or `max_wait` has elapsed.
///
/// Sleeps `initial_wait` after the first failed check and doubles the
/// sleep after every further one, clipping the last sleep so the total
/// wait never passes `max_wait`. Returns whether `pred` held.
pub async fn wait_until(
    mut pred: impl FnMut() -> bool,
    initial_wait: Duration,
    max_wait: Duration,
) -> bool {
    let begin = Instant::now();
    let mut next_wait = initial_wait;

    loop {
        if pred() {
            return true;
        }
        let waited = begin.elapsed();
        if waited >= max_wait {
            return false;
        }

        let sleep = next_wait.min(max_wait - waited);
        tokio::time::sleep(sleep).await;
        next_wait = next_wait.saturating_mul(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn returns_immediately_when_predicate_holds() {
        let started = Instant::now();
        assert!(wait_until(|| true, Duration::from_secs(1), Duration::from_secs(10)).await);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn sleeps_double_between_checks() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();
        let ok = wait_until(
            || calls.fetch_add(1, Ordering::SeqCst) == 3,
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await;

        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 10 + 20 + 40 ms of sleep before the fourth check.
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn gives_up_at_max_wait() {
        let started = Instant::now();
        let ok = wait_until(|| false, Duration::from_millis(10), Duration::from_millis(300)).await;
        let elapsed = started.elapsed();

        assert!(!ok);
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }

    #[tokio::test]
    async fn zero_max_wait_checks_once() {
        let calls = AtomicUsize::new(0);
        let ok = wait_until(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            },
            Duration::from_millis(10),
            Duration::ZERO,
        )
        .await;
        assert!(!ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
