//! Shared deadline passed down through every lookup.
//!
//! A collection pass creates one [`Deadline`] and hands it to the resolver,
//! which hands it to whichever protocol client is active. Every blocking I/O
//! step is wrapped in [`Deadline::run`], so when the deadline fires the
//! in-flight future is dropped, any socket it owned is closed, and the caller
//! sees [`ExpiryError::DeadlineExceeded`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{ExpiryError, Result};

// Upper bound used when `now + budget` would overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Drives `fut` to completion unless the deadline fires first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| ExpiryError::DeadlineExceeded)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline.run(async { Ok::<_, ExpiryError>(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_fails_after_deadline() {
        let deadline = Deadline::after(Duration::from_millis(5));
        let started = std::time::Instant::now();
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, ExpiryError>(())
            })
            .await;

        assert!(matches!(result, Err(ExpiryError::DeadlineExceeded)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_expired_deadline_rejects_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert_eq!(deadline.remaining(), Duration::ZERO);

        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ExpiryError>(())
            })
            .await;
        assert!(result.unwrap_err().is_deadline_exceeded());
    }

    #[tokio::test]
    async fn test_inner_error_is_passed_through() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<()> = deadline
            .run(async { Err(ExpiryError::Other("boom".to_string())) })
            .await;
        assert!(matches!(result, Err(ExpiryError::Other(msg)) if msg == "boom"));
    }

    #[test]
    fn test_huge_budget_does_not_overflow() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let deadline = Deadline::after(Duration::MAX);
            assert!(deadline.remaining() > Duration::from_secs(86_400));
        });
    }
}
