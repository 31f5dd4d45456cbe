//! Transport boundary: transaction building, balancing, proving and broadcast.
//!
//! Implemented by ledger collaborators (node + indexer + proof server) or by
//! [`crate::sim::SimLedger`]. Failures are opaque `anyhow` errors and reach
//! callers unchanged as `WalletError::Transport`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::keys::DerivedKeySet;
use crate::tx::{
    FinalizedTransaction, Output, ResourceGenerationRequest, SignedRecipe, Transaction, TransactionId,
    TransactionRecipe,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceOptions {
    pub ttl: DateTime<Utc>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Unbalanced transfer paying `outputs`.
    async fn build_transfer(
        &self,
        keys: &DerivedKeySet,
        outputs: Vec<Output>,
        ttl: DateTime<Utc>,
    ) -> anyhow::Result<Transaction>;

    /// Add inputs, change and fees. May return a separate balancing transaction.
    async fn balance(
        &self,
        tx: Transaction,
        keys: &DerivedKeySet,
        options: BalanceOptions,
    ) -> anyhow::Result<TransactionRecipe>;

    /// Resource-generation transaction with a single signable segment.
    async fn build_resource_generation(&self, request: ResourceGenerationRequest) -> anyhow::Result<Transaction>;

    /// Prove and bind a signed recipe.
    async fn finalize(&self, recipe: SignedRecipe) -> anyhow::Result<FinalizedTransaction>;

    async fn submit(&self, tx: FinalizedTransaction) -> anyhow::Result<TransactionId>;
}
