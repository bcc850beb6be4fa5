//! Persistence collaborators backed by sled.
//!
//! - [`accounts`]: account records with email indexes
//! - [`tokens`]: expiring revocation and reset-token entries

pub mod accounts;
pub mod tokens;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub use accounts::{Account, AccountError, AccountPage, AccountStore, PublicAccount, Visibility};
pub use tokens::{
    ExpiringTree, ResetTokenStore, RevocationStore, SledResetTokenStore, SledRevocationStore,
};

/// Errors from the revocation and reset-token stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store call did not complete in time.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend failed.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Run a store call under `limit`.
///
/// An elapsed call becomes [`StoreError::Timeout`], never an empty result.
///
/// # Errors
///
/// Returns the call's own error, or `StoreError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<(), StoreError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let value = bounded(Duration::from_secs(1), async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err: Result<(), _> = bounded(Duration::from_secs(1), async {
            Err(StoreError::Backend("down".to_string()))
        })
        .await;
        assert!(matches!(err, Err(StoreError::Backend(_))));
    }
}
