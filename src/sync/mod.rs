//! Sync - Three sub-wallets composed into one session.
//!
//! ```text
//! PublicPool  ──┐
//! ResourcePool ─┼── combine ──→ WalletState stream ──→ throttle ──→ wait_for
//! Confidential ─┘
//! ```
//!
//! Sub-wallets are owned by the session. Callers only see snapshots.

mod combine;
mod throttle;
pub mod wait;

pub use throttle::{throttle, Throttle};
pub use wait::{wait_for, wait_for_balance, wait_for_resource_balance, wait_for_sync, wait_until, WaitOptions};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::WalletResult;
use crate::keys::{DerivedKeySet, PublicKey, Role, RoleSigner};
use crate::tx::{Address, Coin, TokenKind};

/// Accruing resource balance: `min(cap, accrued + rate * elapsed)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBalance {
    pub accrued: u128,
    pub rate_per_sec: u128,
    pub as_of: DateTime<Utc>,
    pub cap: u128,
}

impl ResourceBalance {
    pub fn at(&self, now: DateTime<Utc>) -> u128 {
        let elapsed = (now - self.as_of).num_seconds().max(0) as u128;
        self.accrued.saturating_add(self.rate_per_sec.saturating_mul(elapsed)).min(self.cap)
    }
}

/// One sub-wallet's view of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubWalletState {
    pub synced: bool,
    pub balances: BTreeMap<TokenKind, u128>,
    pub resource: ResourceBalance,
    pub available_coins: Vec<Coin>,
}

impl SubWalletState {
    pub fn balance(&self, token: &TokenKind) -> u128 {
        self.balances.get(token).copied().unwrap_or(0)
    }
}

/// Combined snapshot of the three sub-wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub public: SubWalletState,
    pub resource: SubWalletState,
    pub confidential: SubWalletState,
}

impl WalletState {
    pub fn get(&self, role: Role) -> &SubWalletState {
        match role {
            Role::PublicPool => &self.public,
            Role::ResourcePool => &self.resource,
            Role::ConfidentialPool => &self.confidential,
        }
    }

    pub fn is_synced(&self) -> bool {
        Role::ALL.iter().all(|r| self.get(*r).synced)
    }

    /// Balance of `token` across all sub-wallets.
    pub fn balance(&self, token: &TokenKind) -> u128 {
        Role::ALL.iter().map(|r| self.get(*r).balance(token)).sum()
    }

    pub fn resource_balance(&self, now: DateTime<Utc>) -> u128 {
        self.resource.resource.at(now)
    }

    /// Spendable public-pool coins.
    pub fn available_coins(&self) -> &[Coin] {
        &self.public.available_coins
    }
}

pub type SubWalletStream = BoxStream<'static, anyhow::Result<SubWalletState>>;
pub type WalletStateStream = BoxStream<'static, WalletResult<WalletState>>;

/// One independently-synchronizing sub-wallet.
#[async_trait]
pub trait SubWallet: Send + Sync {
    fn role(&self) -> Role;
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    /// Live state stream. Single consumer; dropping it unsubscribes.
    fn subscribe(&self) -> SubWalletStream;
}

/// The three sub-wallets of one seed.
pub struct SubWallets {
    pub public: Box<dyn SubWallet>,
    pub resource: Box<dyn SubWallet>,
    pub confidential: Box<dyn SubWallet>,
}

impl SubWallets {
    pub fn get(&self, role: Role) -> &dyn SubWallet {
        match role {
            Role::PublicPool => self.public.as_ref(),
            Role::ResourcePool => self.resource.as_ref(),
            Role::ConfidentialPool => self.confidential.as_ref(),
        }
    }
}

/// Opens sub-wallets for a derived key set.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn connect(&self, keys: &DerivedKeySet) -> anyhow::Result<SubWallets>;
}

/// Keys plus running sub-wallets. Torn down by [`WalletSession::stop`].
pub struct WalletSession {
    keys: DerivedKeySet,
    wallets: SubWallets,
    started: Vec<Role>,
}

impl WalletSession {
    pub fn new(keys: DerivedKeySet, wallets: SubWallets) -> Self {
        Self { keys, wallets, started: Vec::new() }
    }

    /// Start all three sub-wallets. On failure the ones already started are stopped.
    pub async fn start(&mut self) -> WalletResult<()> {
        for role in Role::ALL {
            let wallet = self.wallets.get(role);
            if let Err(e) = wallet.start().await {
                warn!(role = wallet.role().as_str(), error = %e, "sub-wallet failed to start");
                let _ = self.stop_started().await;
                return Err(e.into());
            }
            self.started.push(role);
        }
        info!(address = %self.address(), "wallet session started");
        Ok(())
    }

    /// Combined state stream. Emits once every sub-wallet has reported.
    pub fn state(&self) -> WalletStateStream {
        combine::combine([
            (Role::PublicPool, self.wallets.public.subscribe()),
            (Role::ResourcePool, self.wallets.resource.subscribe()),
            (Role::ConfidentialPool, self.wallets.confidential.subscribe()),
        ])
    }

    /// Stop every started sub-wallet. Returns the first stop failure.
    pub async fn stop(mut self) -> WalletResult<()> {
        let result = self.stop_started().await;
        info!(address = %self.address(), "wallet session stopped");
        result
    }

    async fn stop_started(&mut self) -> WalletResult<()> {
        let mut first = None;
        for role in std::mem::take(&mut self.started) {
            let wallet = self.wallets.get(role);
            if let Err(e) = wallet.stop().await {
                warn!(role = wallet.role().as_str(), error = %e, "sub-wallet failed to stop");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), |e| Err(e.into()))
    }

    pub fn keys(&self) -> &DerivedKeySet {
        &self.keys
    }

    /// Signer for public-pool spends.
    pub fn signer(&self) -> WalletResult<RoleSigner> {
        self.keys.public_pool().signer()
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_pool().public_key()
    }

    /// Public-pool receiving address.
    pub fn address(&self) -> Address {
        self.keys.public_pool().address()
    }

    pub fn resource_address(&self) -> Address {
        self.keys.resource_pool().address()
    }
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("address", &self.address())
            .field("started", &self.started)
            .finish()
    }
}
