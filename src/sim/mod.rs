//! Sim - In-memory ledger behind the connector and transport traits.
//!
//! Records every transport call, verifies signatures and ownership on
//! submission, and pushes fresh sub-wallet states to subscribers after every
//! change. Faults can be switched on to exercise failure paths.
//!
//! Usage: swap a node/indexer-backed implementation for [`SimLedger`] in tests
//! and in the CLI demo.

mod transport;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::{future, stream, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::WalletResult;
use crate::keys::{derive, DerivedKeySet, Role};
use crate::orchestrator::BOOTSTRAP_SEED;
use crate::sync::{ResourceBalance, SubWallet, SubWalletState, SubWalletStream, SubWallets, WalletConnector};
use crate::tx::{Address, Coin, CoinRef, ContractCall, TokenKind, TransactionId};

/// Coins credited to the bootstrap key on a dev network.
pub const GENESIS_COINS: usize = 4;
/// Value of each genesis coin.
pub const GENESIS_COIN_VALUE: u128 = 250_000_000_000_000;
/// Fee charged per balanced transaction, in primary tokens.
pub const DEFAULT_FEE: u128 = 1_000;

/// Per-method transport call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportCalls {
    pub build_transfer: usize,
    pub balance: usize,
    pub build_resource_generation: usize,
    pub finalize: usize,
    pub submit: usize,
}

impl TransportCalls {
    pub fn total(&self) -> usize {
        self.build_transfer + self.balance + self.build_resource_generation + self.finalize + self.submit
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Faults {
    reject_start: bool,
    withhold_sync: bool,
    reject_submit: bool,
}

struct Subscriber {
    address: Address,
    sender: UnboundedSender<anyhow::Result<SubWalletState>>,
}

struct LedgerState {
    coins: BTreeMap<CoinRef, Coin>,
    resources: BTreeMap<Address, ResourceBalance>,
    running: BTreeMap<Address, usize>,
    subscribers: Vec<Subscriber>,
    calls: TransportCalls,
    faults: Faults,
    fee: u128,
    nonce: u64,
    submitted: Vec<TransactionId>,
    contract_calls: Vec<ContractCall>,
}

impl LedgerState {
    fn view(&self, address: &Address) -> SubWalletState {
        let available_coins: Vec<Coin> = self.coins.values().filter(|c| c.address == *address).cloned().collect();
        let mut balances = BTreeMap::new();
        for coin in &available_coins {
            *balances.entry(coin.token.clone()).or_insert(0u128) += coin.value;
        }
        SubWalletState {
            synced: self.running.contains_key(address) && !self.faults.withhold_sync,
            balances,
            resource: self.resources.get(address).cloned().unwrap_or_default(),
            available_coins,
        }
    }

    /// Push current views; drop subscribers whose stream is gone.
    fn notify(&mut self) {
        let views: Vec<SubWalletState> = self.subscribers.iter().map(|s| self.view(&s.address)).collect();
        let mut views = views.into_iter();
        self.subscribers.retain(|s| match views.next() {
            Some(view) => s.sender.unbounded_send(Ok(view)).is_ok(),
            None => false,
        });
    }

    fn next_id(&mut self, tag: &[u8]) -> TransactionId {
        self.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update(self.nonce.to_be_bytes());
        TransactionId(hasher.finalize().into())
    }
}

/// Shared handle to one simulated ledger.
#[derive(Clone)]
pub struct SimLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl Default for SimLedger {
    fn default() -> Self { Self::new() }
}

impl SimLedger {
    /// Empty ledger charging [`DEFAULT_FEE`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerState {
                coins: BTreeMap::new(),
                resources: BTreeMap::new(),
                running: BTreeMap::new(),
                subscribers: Vec::new(),
                calls: TransportCalls::default(),
                faults: Faults::default(),
                fee: DEFAULT_FEE,
                nonce: 0,
                submitted: Vec::new(),
                contract_calls: Vec::new(),
            })),
        }
    }

    /// Ledger whose bootstrap key holds the genesis coins.
    pub fn dev_network() -> WalletResult<Self> {
        let ledger = Self::new();
        let genesis = derive(&BOOTSTRAP_SEED)?;
        for _ in 0..GENESIS_COINS {
            ledger.credit(genesis.public_pool().address(), TokenKind::Primary, GENESIS_COIN_VALUE)?;
        }
        Ok(ledger)
    }

    fn state(&self) -> anyhow::Result<MutexGuard<'_, LedgerState>> {
        self.inner.lock().map_err(|_| anyhow!("ledger lock poisoned"))
    }

    /// Mint a coin to `address`.
    pub fn credit(&self, address: Address, token: TokenKind, value: u128) -> anyhow::Result<CoinRef> {
        let mut state = self.state()?;
        let id = CoinRef { tx: state.next_id(b"sim:credit"), index: 0 };
        state.coins.insert(id, Coin { id, address, token, value, created_at: Utc::now() });
        state.notify();
        debug!(%address, %value, "credited");
        Ok(id)
    }

    /// Set the resource balance of `address`.
    pub fn grant_resources(&self, address: Address, balance: ResourceBalance) -> anyhow::Result<()> {
        let mut state = self.state()?;
        state.resources.insert(address, balance);
        state.notify();
        Ok(())
    }

    pub fn with_fee(self, fee: u128) -> Self {
        if let Ok(mut state) = self.state() {
            state.fee = fee;
        }
        self
    }

    pub fn set_reject_start(&self, on: bool) -> anyhow::Result<()> {
        self.state()?.faults.reject_start = on;
        Ok(())
    }

    pub fn set_withhold_sync(&self, on: bool) -> anyhow::Result<()> {
        let mut state = self.state()?;
        state.faults.withhold_sync = on;
        state.notify();
        Ok(())
    }

    pub fn set_reject_submit(&self, on: bool) -> anyhow::Result<()> {
        self.state()?.faults.reject_submit = on;
        Ok(())
    }

    pub fn calls(&self) -> anyhow::Result<TransportCalls> {
        Ok(self.state()?.calls)
    }

    pub fn balance(&self, address: &Address, token: &TokenKind) -> anyhow::Result<u128> {
        Ok(self.state()?.view(address).balance(token))
    }

    pub fn submitted(&self) -> anyhow::Result<Vec<TransactionId>> {
        Ok(self.state()?.submitted.clone())
    }

    /// Contract calls carried by applied transactions, in order.
    pub fn contract_calls(&self) -> anyhow::Result<Vec<ContractCall>> {
        Ok(self.state()?.contract_calls.clone())
    }

    /// Sub-wallets currently started, summed over addresses.
    pub fn running_wallets(&self) -> anyhow::Result<usize> {
        Ok(self.state()?.running.values().sum())
    }

    /// Live subscriptions.
    pub fn subscriber_count(&self) -> anyhow::Result<usize> {
        let mut state = self.state()?;
        state.subscribers.retain(|s| !s.sender.is_closed());
        Ok(state.subscribers.len())
    }
}

/// One role's view of the simulated ledger.
struct SimSubWallet {
    ledger: SimLedger,
    role: Role,
    address: Address,
}

#[async_trait]
impl SubWallet for SimSubWallet {
    fn role(&self) -> Role {
        self.role
    }

    async fn start(&self) -> anyhow::Result<()> {
        let mut state = self.ledger.state()?;
        if state.faults.reject_start {
            anyhow::bail!("{} sub-wallet rejected start", self.role.as_str());
        }
        *state.running.entry(self.address).or_insert(0) += 1;
        state.notify();
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut state = self.ledger.state()?;
        if let Some(count) = state.running.get_mut(&self.address) {
            *count -= 1;
            if *count == 0 {
                state.running.remove(&self.address);
                state.subscribers.retain(|s| s.address != self.address);
            }
        }
        state.notify();
        Ok(())
    }

    fn subscribe(&self) -> SubWalletStream {
        let mut state = match self.ledger.state() {
            Ok(state) => state,
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };
        let (sender, receiver) = unbounded();
        let _ = sender.unbounded_send(Ok(state.view(&self.address)));
        state.subscribers.push(Subscriber { address: self.address, sender });
        receiver.boxed()
    }
}

#[async_trait]
impl WalletConnector for SimLedger {
    async fn connect(&self, keys: &DerivedKeySet) -> anyhow::Result<SubWallets> {
        let wallet = |role: Role| -> Box<dyn SubWallet> {
            Box::new(SimSubWallet { ledger: self.clone(), role, address: keys.get(role).address() })
        };
        Ok(SubWallets {
            public: wallet(Role::PublicPool),
            resource: wallet(Role::ResourcePool),
            confidential: wallet(Role::ConfidentialPool),
        })
    }
}
