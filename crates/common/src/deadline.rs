//! Run-wide timeout and cancellation

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Drive `fut` until it completes, `timeout` elapses or `cancel` resolves
///
/// Losing the race drops `fut`, which aborts any task groups it owns.
pub async fn bounded<T, E, F, C>(timeout: Option<Duration>, cancel: C, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    C: Future<Output = ()>,
    E: From<Interrupted>,
{
    let deadline = async {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = fut => result,
        _ = deadline => Err(Interrupted::Timeout(timeout.unwrap_or_default()).into()),
        _ = cancel => {
            tracing::warn!("run cancelled");
            Err(Interrupted::Cancelled.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Interrupted(Interrupted),
    }

    impl From<Interrupted> for TestError {
        fn from(e: Interrupted) -> Self {
            TestError::Interrupted(e)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let result: Result<(), TestError> = bounded(
            Some(Duration::from_secs(5)),
            std::future::pending(),
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
        )
        .await;
        assert_eq!(
            result,
            Err(TestError::Interrupted(Interrupted::Timeout(Duration::from_secs(5))))
        );
    }

    #[tokio::test]
    async fn test_cancel_wins() {
        let result: Result<(), TestError> =
            bounded(None, async {}, std::future::pending()).await;
        assert_eq!(result, Err(TestError::Interrupted(Interrupted::Cancelled)));
    }

    #[tokio::test]
    async fn test_completes_without_limits() {
        let result: Result<u8, TestError> =
            bounded(None, std::future::pending(), async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
