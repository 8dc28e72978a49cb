//! Cancellable time bound for a run.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::DEFAULT_WATCHDOG_SECS;

/// Why a guarded future did not complete.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elapsed {
    #[error("watchdog expired after {0:?}")]
    Timeout(Duration),
    #[error("watchdog cancelled")]
    Cancelled,
}

/// Races work against a timer.
///
/// Finishing the guarded work stops the timer; so does dropping the
/// watchdog or calling [`Watchdog::cancel`].
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    token: CancellationToken,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_WATCHDOG_SECS))
    }
}

impl Watchdog {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Token observed by [`Watchdog::guard`]; cancelling it aborts the wait.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `work` until it completes, the timeout elapses or the watchdog
    /// is cancelled, whichever comes first.
    ///
    /// # Errors
    ///
    /// [`Elapsed::Timeout`] or [`Elapsed::Cancelled`].
    pub async fn guard<F: Future>(&self, work: F) -> Result<F::Output, Elapsed> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Elapsed::Cancelled),
            output = work => Ok(output),
            () = tokio::time::sleep(self.timeout) => {
                warn!(timeout = ?self.timeout, "watchdog expired");
                Err(Elapsed::Timeout(self.timeout))
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_timeout() {
        let watchdog = Watchdog::default();
        let result = watchdog
            .guard(async {
                tokio::time::sleep(Duration::from_secs(29)).await;
                7
            })
            .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_timeout() {
        let watchdog = Watchdog::new(Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        let result = watchdog.guard(pending::<()>()).await;
        assert_eq!(result, Err(Elapsed::Timeout(Duration::from_secs(30))));
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_wait() {
        let watchdog = Watchdog::new(Duration::from_secs(30));
        let token = watchdog.token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });
        assert_eq!(
            watchdog.guard(pending::<()>()).await,
            Err(Elapsed::Cancelled)
        );
        assert!(watchdog.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels_token() {
        let watchdog = Watchdog::default();
        let token = watchdog.token();
        assert!(!token.is_cancelled());
        drop(watchdog);
        assert!(token.is_cancelled());
    }
}
