//! Assembler - Draft → Balanced → Signed → Finalized → Submitted.
//!
//! Transfers go through the transport for building and balancing, then every
//! intent is signed (base at `proof`, balancing at `pre-proof`). Contract calls
//! ride in a single intent and follow the same path. Resource generation signs one payload for segment 1 and merges it with
//! [`attach_generation_signature`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{WalletError, WalletResult};
use crate::keys::{DerivedKeySet, Signer};
use crate::sync::WalletSession;
use crate::transport::{BalanceOptions, Transport};
use crate::tx::{
    attach_generation_signature, sign_intents, ContractCall, FinalizedTransaction, Intent, Output, ProofState,
    ResourceGenerationRequest, SegmentId, SignedRecipe, Transaction, TransactionId, TransactionRecipe,
    GENERATION_SEGMENT,
};

/// Segment holding the intent of a contract-call transaction.
pub const CALL_SEGMENT: SegmentId = 1;

pub struct TransactionAssembler<T: Transport + ?Sized> {
    transport: Arc<T>,
}

impl<T: Transport + ?Sized> Clone for TransactionAssembler<T> {
    fn clone(&self) -> Self { Self { transport: self.transport.clone() } }
}

impl<T: Transport + ?Sized> TransactionAssembler<T> {
    pub fn new(transport: Arc<T>) -> Self { Self { transport } }

    pub fn transport(&self) -> &Arc<T> { &self.transport }

    pub async fn balance(&self, tx: Transaction, keys: &DerivedKeySet, ttl: DateTime<Utc>) -> WalletResult<TransactionRecipe> {
        let recipe = self.transport.balance(tx, keys, BalanceOptions { ttl }).await?;
        debug!(balancing = recipe.balancing.is_some(), "balanced");
        Ok(recipe)
    }

    /// Sign base intents at `proof` and balancing intents at `pre-proof`.
    pub fn sign(&self, recipe: TransactionRecipe, signer: &dyn Signer) -> WalletResult<SignedRecipe> {
        let TransactionRecipe { mut base, balancing } = recipe;
        sign_intents(&mut base, signer, ProofState::Proof)?;
        let balancing = match balancing {
            Some(mut tx) => {
                sign_intents(&mut tx, signer, ProofState::PreProof)?;
                Some(tx)
            }
            None => None,
        };
        Ok(SignedRecipe::new(base, balancing))
    }

    /// Local structural check, then transport finalization.
    pub async fn finalize(&self, signed: SignedRecipe) -> WalletResult<FinalizedTransaction> {
        if let Some(defect) = signed.transactions().find_map(Transaction::signature_defect) {
            return Err(WalletError::Finalization(defect));
        }
        Ok(self.transport.finalize(signed).await?)
    }

    pub async fn submit(&self, tx: FinalizedTransaction) -> WalletResult<TransactionId> {
        let id = self.transport.submit(tx).await?;
        info!(tx = %id, "submitted");
        Ok(id)
    }

    pub async fn assemble_and_submit_transfer(
        &self,
        session: &WalletSession,
        outputs: Vec<Output>,
        ttl: DateTime<Utc>,
    ) -> WalletResult<TransactionId> {
        info!(outputs = outputs.len(), from = %session.address(), "assembling transfer");
        let draft = self.transport.build_transfer(session.keys(), outputs, ttl).await?;
        let recipe = self.balance(draft, session.keys(), ttl).await?;
        let signed = self.sign(recipe, &session.signer()?)?;
        let finalized = self.finalize(signed).await?;
        self.submit(finalized).await
    }

    /// Contract calls in one intent, fee-balanced from the session's public pool.
    pub async fn assemble_and_submit_call(
        &self,
        session: &WalletSession,
        calls: Vec<ContractCall>,
        ttl: DateTime<Utc>,
    ) -> WalletResult<TransactionId> {
        if calls.is_empty() {
            return Err(WalletError::Finalization("contract call transaction has no actions".into()));
        }
        info!(calls = calls.len(), from = %session.address(), "assembling contract call");
        let intent = calls.into_iter().fold(Intent::new(ttl), Intent::with_action);
        let draft = Transaction::new().with_intent(CALL_SEGMENT, intent);
        let recipe = self.balance(draft, session.keys(), ttl).await?;
        let signed = self.sign(recipe, &session.signer()?)?;
        let finalized = self.finalize(signed).await?;
        self.submit(finalized).await
    }

    pub async fn assemble_and_submit_resource_generation(
        &self,
        session: &WalletSession,
        request: ResourceGenerationRequest,
    ) -> WalletResult<TransactionId> {
        info!(coins = request.coins.len(), value = %request.value(), receiver = %request.receiver, "assembling resource generation");
        let mut tx = self.transport.build_resource_generation(request).await?;
        let intent = tx
            .intent_mut(GENERATION_SEGMENT)
            .ok_or(WalletError::MissingIntent(GENERATION_SEGMENT))?;
        *intent = intent.retag(ProofState::Proof)?;
        let payload = intent.signing_payload(GENERATION_SEGMENT)?;
        let signature = session.signer()?.sign(&payload);
        attach_generation_signature(&mut tx, &signature)?;
        let finalized = self.finalize(SignedRecipe::new(tx, None)).await?;
        self.submit(finalized).await
    }
}
