//! Per-call time limits for settlement I/O.

use std::{future::Future, time::Duration};

use accord_common::{AppError, AppResult};

/// Await `fut`, turning an elapsed `limit` into [`AppError::Timeout`].
///
/// A timeout is reported the same way as the I/O failure it stands in for,
/// so callers handle both in one branch.
pub async fn within<T, F>(limit: Duration, operation: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AppError::Timeout(format!("{operation} exceeded {}s", limit.as_secs())))?
}
