//! Wait primitives: suspend until a throttled state stream satisfies a condition.
//!
//! Every wait resolves at most once and drops its subscription on return,
//! whether it matched, failed or timed out.

use chrono::Utc;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::timeout;

use super::{throttle, WalletState};
use crate::error::{WalletError, WalletResult};
use crate::tx::TokenKind;

/// Sampling interval and optional deadline for a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub throttle: Duration,
    pub deadline: Option<Duration>,
}

impl WaitOptions {
    pub fn new(throttle: Duration) -> Self {
        Self { throttle, deadline: None }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// First `Some` projection of a throttled emission.
pub async fn wait_for<S, St, T, F>(stream: S, options: WaitOptions, mut extract: F) -> WalletResult<T>
where
    S: Stream<Item = WalletResult<St>> + Unpin,
    F: FnMut(&St) -> Option<T>,
{
    let mut states = throttle(stream, options.throttle);
    let search = async {
        while let Some(state) = states.next().await {
            if let Some(found) = extract(&state?) {
                return Ok(found);
            }
        }
        Err(WalletError::SyncAborted("state stream ended".into()))
    };
    match options.deadline {
        // far-future deadlines are clamped by tokio
        Some(limit) => timeout(limit, search)
            .await
            .map_err(|_| WalletError::WaitTimeout(limit))?,
        None => search.await,
    }
}

/// First throttled emission satisfying `predicate`.
pub async fn wait_until<S, St, P>(stream: S, options: WaitOptions, mut predicate: P) -> WalletResult<St>
where
    S: Stream<Item = WalletResult<St>> + Unpin,
    St: Clone,
    P: FnMut(&St) -> bool,
{
    wait_for(stream, options, |state| predicate(state).then(|| state.clone())).await
}

pub async fn wait_for_sync<S>(stream: S, options: WaitOptions) -> WalletResult<WalletState>
where
    S: Stream<Item = WalletResult<WalletState>> + Unpin,
{
    wait_until(stream, options, WalletState::is_synced).await
}

/// Synced and holding a positive balance of `token`.
pub async fn wait_for_balance<S>(stream: S, options: WaitOptions, token: &TokenKind) -> WalletResult<u128>
where
    S: Stream<Item = WalletResult<WalletState>> + Unpin,
{
    wait_for(stream, options, |state| {
        let balance = state.balance(token);
        (state.is_synced() && balance > 0).then_some(balance)
    })
    .await
}

/// Synced and holding a positive resource balance right now.
pub async fn wait_for_resource_balance<S>(stream: S, options: WaitOptions) -> WalletResult<u128>
where
    S: Stream<Item = WalletResult<WalletState>> + Unpin,
{
    wait_for(stream, options, |state| {
        let balance = state.resource_balance(Utc::now());
        (state.is_synced() && balance > 0).then_some(balance)
    })
    .await
}
