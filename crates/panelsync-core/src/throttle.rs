use std::future::Future;

use tokio::time::sleep;
use tracing::warn;

use crate::sink::SinkError;

/// Runs one sink write, retrying exactly once after the platform's requested delay when throttled.
///
/// A second throttle comes back as [`SinkError::Other`]; every other error is returned untouched
/// on the first attempt.
pub async fn with_rate_limit_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, SinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SinkError>>,
{
    let retry_after = match op().await {
        Err(SinkError::RateLimited { retry_after }) => retry_after,
        other => return other,
    };

    warn!(
        op = op_name,
        retry_after_ms = retry_after.as_millis() as u64,
        "rate limited, retrying once"
    );
    sleep(retry_after).await;

    match op().await {
        Err(SinkError::RateLimited { retry_after }) => {
            warn!(
                op = op_name,
                retry_after_ms = retry_after.as_millis() as u64,
                "rate limited again, giving up"
            );
            Err(SinkError::Other(format!("{op_name}: still rate limited after one retry")))
        }
        other => other,
    }
}
