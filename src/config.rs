//! Configuration - network endpoints and wallet tunables, passed from higher layers

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::sync::WaitOptions;

/// Ledger network the wallet talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkId {
    #[default]
    Undeployed,
    DevNet,
    TestNet,
    PreProd,
    MainNet,
}

impl NetworkId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::Undeployed => "undeployed",
            NetworkId::DevNet => "devnet",
            NetworkId::TestNet => "testnet",
            NetworkId::PreProd => "preprod",
            NetworkId::MainNet => "mainnet",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "undeployed" | "local" | "standalone" => Some(NetworkId::Undeployed),
            "devnet" => Some(NetworkId::DevNet),
            "testnet" => Some(NetworkId::TestNet),
            "preprod" => Some(NetworkId::PreProd),
            "mainnet" => Some(NetworkId::MainNet),
            _ => None,
        }
    }

    /// Only a local network has a publicly known, pre-funded bootstrap key.
    pub fn allows_auto_funding(&self) -> bool {
        matches!(self, NetworkId::Undeployed)
    }
}

/// Endpoints of the node, indexer and proof server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: NetworkId,
    pub node_url: String,
    pub indexer_url: String,
    pub indexer_ws_url: String,
    pub proof_server_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self { Self::local() }
}

impl NetworkConfig {
    pub fn local() -> Self {
        Self {
            network: NetworkId::Undeployed,
            node_url: "http://127.0.0.1:9944".into(),
            indexer_url: "http://127.0.0.1:8088/api/v3/graphql".into(),
            indexer_ws_url: "ws://127.0.0.1:8088/api/v3/graphql/ws".into(),
            proof_server_url: "http://127.0.0.1:6300".into(),
        }
    }

    pub fn preprod() -> Self {
        Self {
            network: NetworkId::PreProd,
            node_url: "https://rpc.preprod.midnight.network".into(),
            indexer_url: "https://indexer.preprod.midnight.network".into(),
            indexer_ws_url: "wss://indexer.preprod.midnight.network/ws".into(),
            proof_server_url: "http://localhost:6300".into(),
        }
    }

    /// Start from `network`'s defaults, then apply `KYC_*` overrides.
    pub fn from_env(network: NetworkId) -> Self {
        let base = match network {
            NetworkId::Undeployed => Self::local(),
            other => Self { network: other, ..Self::preprod() },
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fields: [(&str, &mut String); 4] = [
            ("KYC_NODE_URL", &mut self.node_url),
            ("KYC_INDEXER_URL", &mut self.indexer_url),
            ("KYC_INDEXER_WS_URL", &mut self.indexer_ws_url),
            ("KYC_PROOF_SERVER_URL", &mut self.proof_server_url),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *field = value.trim().to_string();
            }
        }
        self
    }

    /// Explicit proof-server endpoint, applied after environment overrides.
    pub fn with_proof_server(mut self, url: impl Into<String>) -> Self { self.proof_server_url = url.into(); self }
}

/// Wallet tunables used by the orchestrator and assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    pub network: NetworkConfig,
    /// Sampling interval while waiting for sync.
    pub sync_throttle: Duration,
    /// Sampling interval while waiting for funds.
    pub funds_throttle: Duration,
    /// Deadline for every wait. `None` waits forever.
    pub wait_deadline: Option<Duration>,
    pub transfer_ttl: Duration,
    /// Validity window of a resource-generation registration.
    pub generation_window: Duration,
    /// Primary tokens sent by an auto-funding transfer.
    pub funding_amount: u128,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            sync_throttle: Duration::from_secs(5),
            funds_throttle: Duration::from_secs(10),
            wait_deadline: None,
            transfer_ttl: Duration::from_secs(10 * 60),
            generation_window: Duration::from_secs(10 * 60),
            funding_amount: 200_000_000_000,
        }
    }
}

impl WalletConfig {
    pub fn new(network: NetworkConfig) -> Self { Self { network, ..Default::default() } }
    pub fn with_sync_throttle(mut self, d: Duration) -> Self { self.sync_throttle = d; self }
    pub fn with_funds_throttle(mut self, d: Duration) -> Self { self.funds_throttle = d; self }
    pub fn with_wait_deadline(mut self, d: Duration) -> Self { self.wait_deadline = Some(d); self }
    pub fn with_transfer_ttl(mut self, d: Duration) -> Self { self.transfer_ttl = d; self }
    pub fn with_generation_window(mut self, d: Duration) -> Self { self.generation_window = d; self }
    pub fn with_funding_amount(mut self, amount: u128) -> Self { self.funding_amount = amount; self }

    pub fn sync_wait(&self) -> WaitOptions {
        WaitOptions { throttle: self.sync_throttle, deadline: self.wait_deadline }
    }

    pub fn funds_wait(&self) -> WaitOptions {
        WaitOptions { throttle: self.funds_throttle, deadline: self.wait_deadline }
    }

    pub fn allows_auto_funding(&self) -> bool {
        self.network.network.allows_auto_funding()
    }
}

/// `now + d`, saturating at the latest representable time.
pub fn expiry(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
