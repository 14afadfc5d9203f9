use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Await `fut` for at most `limit`.
///
/// Resolves to `Ok(None)` when the bound elapses first, so a driver that never
/// finishes closing cannot stall the caller. Errors that arrive in time are
/// returned unchanged.
pub async fn exec_or_timeout<F, T, E>(fut: F, limit: Duration) -> Result<Option<T>, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(Some(value)),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(
                limit_ms = limit.as_millis() as u64,
                "guarded operation did not settle in time; continuing"
            );
            Ok(None)
        }
    }
}
