//! Navigation-scoped cancellation
//!
//! Leaving a gated page cancels its [`CancellationToken`]; every awaited
//! backend call in that page's flows races against the token.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

/// Await `fut` unless `cancel` fires first
///
/// Cancellation wins ties, so an already-cancelled token never lets the
/// operation start.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        result = fut => result,
    }
}
