//! Error taxonomy for the wallet core.

use std::time::Duration;
use thiserror::Error;

use crate::tx::SegmentId;

#[derive(Debug, Error)]
pub enum WalletError {
    /// Malformed seed input. Never recoverable.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// State stream failed or closed before the awaited condition held.
    #[error("sync aborted: {0}")]
    SyncAborted(String),

    /// Caller deadline elapsed before the awaited condition held.
    #[error("wait timed out after {0:?}")]
    WaitTimeout(Duration),

    /// Builder returned a transaction without the expected segment.
    #[error("missing intent for segment {0}")]
    MissingIntent(SegmentId),

    /// Structural mismatch detected before finalization.
    #[error("finalization failed: {0}")]
    Finalization(String),

    /// Intent bytes could not be encoded or decoded.
    #[error("intent codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// Transport failures are opaque and passed through unchanged.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl WalletError {
    /// Transient failures where retrying the whole bootstrap is reasonable.
    pub fn is_transient(&self) -> bool {
        matches!(self, WalletError::SyncAborted(_) | WalletError::WaitTimeout(_))
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(WalletError::SyncAborted("closed".into()).is_transient());
        assert!(WalletError::WaitTimeout(Duration::from_secs(1)).is_transient());
        assert!(!WalletError::MissingIntent(1).is_transient());
        assert!(!WalletError::InvalidSeed("short".into()).is_transient());
    }

    #[test]
    fn transport_error_message_is_unchanged() {
        let err: WalletError = anyhow::anyhow!("node unreachable").into();
        assert_eq!(err.to_string(), "node unreachable");
    }
}
