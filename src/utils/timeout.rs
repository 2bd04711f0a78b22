//! Timeout helpers and default durations.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Dial timeout used by the client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Wait between failed dial attempts.
pub const RELINK_WAIT: Duration = Duration::from_secs(3);

/// TCP keep-alive idle period applied to new sockets.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Run `fut` with a deadline, mapping expiry to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Like [`with_timeout_error`], but a zero duration means no deadline.
pub async fn with_optional_timeout<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if duration.is_zero() {
        fut.await
    } else {
        with_timeout_error(fut, duration).await
    }
}
