//! Polling assertion for eventually-consistent actor state.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

const DEADLINE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll `check` until it returns true or the deadline passes.
///
/// # Panics
///
/// Panics with `description` if the condition does not hold within five
/// seconds.
pub async fn eventually<F, Fut>(description: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + DEADLINE;
    loop {
        if check().await {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for: {description}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
