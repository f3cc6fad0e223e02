pub mod audit;
pub mod customers;
pub mod products;
pub mod requests;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AppResult;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Runs `op`, re-running it up to `retries` more times while it fails with a
/// transient database error. Any other error is returned at once.
///
/// `op` must be a complete unit of work (read, apply, write, commit) so a
/// retry starts from fresh state.
pub async fn with_retry<T, F, Fut>(retries: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 0;

    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < retries => {
                attempt += 1;
                warn!(
                    attempt,
                    retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient persistence failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
            result => return result,
        }
    }
}

/// Clamps client paging parameters to `0..=max` and a non-negative offset.
pub(crate) fn page(limit: Option<i64>, offset: Option<i64>, default: i64, max: i64) -> (i64, i64) {
    (
        limit.unwrap_or(default).clamp(0, max),
        offset.unwrap_or(0).max(0),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_retry_budget() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry(1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Database(sqlx::Error::PoolTimedOut)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn surfaces_non_transient_errors_immediately() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Conflict("stale version".into())) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn paging_is_clamped_to_valid_bounds() {
        assert_eq!(page(None, None, 200, 5_000), (200, 0));
        assert_eq!(page(Some(-5), Some(-1), 200, 5_000), (0, 0));
        assert_eq!(page(Some(50_000), Some(30), 200, 5_000), (5_000, 30));
    }
}
