//! Orchestrator - Seed → running session → funded session.
//!
//! ```text
//! bootstrap(seed) ── derive ── connect ── start ── wait_for_sync ──→ WalletSession
//!
//! ensure_funded(session, bootstrap_seed)
//!   primary == 0  → bootstrap(bootstrap_seed) ── transfer ── stop ── wait_for_balance
//!   resource == 0 → wait for coins ── resource generation ── wait_for_resource_balance
//! ```
//!
//! Every session opened here is stopped before an error leaves this module.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::assembler::TransactionAssembler;
use crate::config::{expiry, WalletConfig};
use crate::error::WalletResult;
use crate::keys::{derive_from_seed, DerivedKeySet, SeedMaterial};
use crate::sync::{
    wait_for, wait_for_balance, wait_for_resource_balance, wait_for_sync, WalletConnector, WalletSession,
};
use crate::transport::Transport;
use crate::tx::{Address, Coin, Output, ResourceGenerationRequest, TokenKind, TransactionId};

/// Publicly known, pre-funded seed of local networks: `0x00…01`.
pub const BOOTSTRAP_SEED: [u8; 32] = {
    let mut seed = [0u8; 32];
    seed[31] = 1;
    seed
};

/// Where auto-funding sends tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingTarget {
    pub address: Address,
    pub amount: u128,
    pub token: TokenKind,
}

/// Outcome of [`Orchestrator::ensure_funded`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FundingReport {
    pub address: Address,
    pub primary: u128,
    pub resource: u128,
    pub funding_tx: Option<TransactionId>,
    pub generation_tx: Option<TransactionId>,
}

impl FundingReport {
    pub fn transport_calls_made(&self) -> bool {
        self.funding_tx.is_some() || self.generation_tx.is_some()
    }
}

pub struct Orchestrator<C: WalletConnector + ?Sized, T: Transport + ?Sized> {
    connector: Arc<C>,
    assembler: TransactionAssembler<T>,
    config: WalletConfig,
}

impl<C: WalletConnector + ?Sized, T: Transport + ?Sized> Orchestrator<C, T> {
    pub fn new(connector: Arc<C>, transport: Arc<T>, config: WalletConfig) -> Self {
        Self { connector, assembler: TransactionAssembler::new(transport), config }
    }

    pub fn assembler(&self) -> &TransactionAssembler<T> { &self.assembler }
    pub fn config(&self) -> &WalletConfig { &self.config }

    /// Derive keys from 32 or 64 seed bytes, start sub-wallets, wait for sync.
    pub async fn bootstrap(&self, seed: &[u8]) -> WalletResult<WalletSession> {
        let seed = SeedMaterial::from_bytes(seed)?;
        self.bootstrap_from(&seed).await
    }

    pub async fn bootstrap_from(&self, seed: &SeedMaterial) -> WalletResult<WalletSession> {
        let keys = derive_from_seed(seed)?;
        self.open(keys).await
    }

    async fn open(&self, keys: DerivedKeySet) -> WalletResult<WalletSession> {
        let wallets = self.connector.connect(&keys).await?;
        let mut session = WalletSession::new(keys, wallets);
        session.start().await?;
        info!(address = %session.address(), "waiting for sync");
        match wait_for_sync(session.state(), self.config.sync_wait()).await {
            Ok(state) => {
                info!(primary = %state.balance(&TokenKind::Primary), "wallet synced");
                Ok(session)
            }
            Err(e) => {
                stop_quietly(session).await;
                Err(e)
            }
        }
    }

    /// Make sure `session` holds primary tokens and a resource balance.
    ///
    /// Already funded: returns without touching the transport. Otherwise,
    /// on networks that allow it, funds from `bootstrap_seed` and registers
    /// coins for resource generation; elsewhere it waits for external funding.
    pub async fn ensure_funded(&self, session: &WalletSession, bootstrap_seed: &[u8]) -> WalletResult<FundingReport> {
        let state = wait_for_sync(session.state(), self.config.sync_wait()).await?;
        let mut report = FundingReport {
            address: session.address(),
            primary: state.balance(&TokenKind::Primary),
            resource: state.resource_balance(Utc::now()),
            funding_tx: None,
            generation_tx: None,
        };
        if report.primary > 0 && report.resource > 0 {
            info!(primary = %report.primary, resource = %report.resource, "already funded");
            return Ok(report);
        }

        let auto = self.config.allows_auto_funding();
        if !auto {
            warn!(
                address = %session.address(),
                network = self.config.network.network.as_str(),
                "auto-funding not available, waiting for external funds"
            );
        }

        if report.primary == 0 {
            if auto {
                let target = FundingTarget {
                    address: session.address(),
                    amount: self.config.funding_amount,
                    token: TokenKind::Primary,
                };
                report.funding_tx = Some(self.fund(bootstrap_seed, &target).await?);
            }
            report.primary = wait_for_balance(session.state(), self.config.funds_wait(), &TokenKind::Primary).await?;
            info!(primary = %report.primary, "primary funds received");
        }

        if report.resource == 0 {
            if auto {
                report.generation_tx = Some(self.generate_resources(session).await?);
            }
            report.resource = wait_for_resource_balance(session.state(), self.config.funds_wait()).await?;
            info!(resource = %report.resource, "resource balance available");
        }
        Ok(report)
    }

    /// Transfer `target` from a session opened on `bootstrap_seed`. That
    /// session is always stopped.
    pub async fn fund(&self, bootstrap_seed: &[u8], target: &FundingTarget) -> WalletResult<TransactionId> {
        info!(to = %target.address, amount = %target.amount, "funding from bootstrap key");
        let bootstrap = self.bootstrap(bootstrap_seed).await?;
        let result = async {
            wait_for_balance(bootstrap.state(), self.config.funds_wait(), &target.token).await?;
            let output = Output { receiver: target.address, token: target.token.clone(), value: target.amount };
            let ttl = expiry(Utc::now(), self.config.transfer_ttl);
            self.assembler.assemble_and_submit_transfer(&bootstrap, vec![output], ttl).await
        }
        .await;
        stop_quietly(bootstrap).await;
        result
    }

    /// Register the session's settled primary coins for resource generation.
    async fn generate_resources(&self, session: &WalletSession) -> WalletResult<TransactionId> {
        let coins: Vec<Coin> = wait_for(session.state(), self.config.funds_wait(), |state| {
            let coins: Vec<Coin> =
                state.available_coins().iter().filter(|c| c.token == TokenKind::Primary).cloned().collect();
            (state.is_synced() && !coins.is_empty()).then_some(coins)
        })
        .await?;
        let now = Utc::now();
        let request = ResourceGenerationRequest {
            valid_from: now,
            valid_until: expiry(now, self.config.generation_window),
            coins,
            public_key: session.public_key(),
            receiver: session.resource_address(),
        };
        self.assembler.assemble_and_submit_resource_generation(session, request).await
    }

    /// Bootstrap and fund in one step. The session is stopped if funding fails.
    pub async fn bootstrap_funded(&self, seed: &SeedMaterial, bootstrap_seed: &[u8]) -> WalletResult<(WalletSession, FundingReport)> {
        let session = self.bootstrap_from(seed).await?;
        match self.ensure_funded(&session, bootstrap_seed).await {
            Ok(report) => Ok((session, report)),
            Err(e) => {
                stop_quietly(session).await;
                Err(e)
            }
        }
    }
}

async fn stop_quietly(session: WalletSession) {
    let address = session.address();
    if let Err(e) = session.stop().await {
        warn!(%address, error = %e, "failed to stop session");
    }
}
