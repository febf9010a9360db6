use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Run `fut` until it completes or `token` fires.
///
/// When the token wins, `fut` is dropped: any storage transaction it held is
/// rolled back and no partial state is committed.
pub async fn run_cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!("authorization operation cancelled by caller");
            Err(AppError::Cancelled)
        }
        result = fut => result,
    }
}
