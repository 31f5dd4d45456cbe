//! Transport side of the simulated ledger: coin selection, proving, validation.

use anyhow::{anyhow, bail, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{LedgerState, SimLedger};
use crate::keys::{address_of, verify, DerivedKeySet};
use crate::sync::ResourceBalance;
use crate::transport::{BalanceOptions, Transport};
use crate::tx::{
    Address, Coin, CoinRef, FinalizedTransaction, Intent, Offer, Output, ProofState, ResourceGenerationRequest,
    ResourceRegistration, SegmentId, SignedRecipe, Spend, TokenKind, Transaction, TransactionId,
    TransactionRecipe, GENERATION_SEGMENT,
};

/// Share of a registration granted as resource balance up front.
const RESOURCE_GRANT_DIVISOR: u128 = 1_000;
/// Per-second accrual as a share of the registered value.
const RESOURCE_RATE_DIVISOR: u128 = 100_000;
/// Segment the simulated builder puts transfers in.
const TRANSFER_SEGMENT: SegmentId = 1;

/// Per-token `outputs - inputs` over every offer of `tx`.
fn shortfall(tx: &Transaction) -> BTreeMap<TokenKind, u128> {
    let mut inputs: BTreeMap<TokenKind, u128> = BTreeMap::new();
    let mut outputs: BTreeMap<TokenKind, u128> = BTreeMap::new();
    for (_, intent) in tx.intents() {
        for offer in intent.offers() {
            offer.inputs.iter().for_each(|s| *inputs.entry(s.token.clone()).or_default() += s.value);
            offer.outputs.iter().for_each(|o| *outputs.entry(o.token.clone()).or_default() += o.value);
        }
    }
    outputs
        .into_iter()
        .filter_map(|(token, out)| {
            let missing = out.saturating_sub(inputs.get(&token).copied().unwrap_or(0));
            (missing > 0).then_some((token, missing))
        })
        .collect()
}

/// Take coins from `pool` until `need` is covered. Returns the coins and their sum.
fn select(pool: &mut Vec<Coin>, token: &TokenKind, need: u128) -> anyhow::Result<(Vec<Coin>, u128)> {
    let mut picked = Vec::new();
    let mut total = 0u128;
    while total < need {
        let Some(pos) = pool.iter().position(|c| c.token == *token) else {
            bail!("insufficient {} funds: need {}, have {}", token, need, total);
        };
        let coin = pool.remove(pos);
        total += coin.value;
        picked.push(coin);
    }
    Ok((picked, total))
}

impl LedgerState {
    /// Check ownership, signatures and value conservation of `tx`.
    fn validate(&self, tx: &FinalizedTransaction, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut spent = BTreeSet::new();
        let mut inputs: BTreeMap<TokenKind, u128> = BTreeMap::new();
        let mut outputs: BTreeMap<TokenKind, u128> = BTreeMap::new();

        for part in tx.transactions() {
            for (segment, intent) in part.intents() {
                ensure!(intent.ttl >= now, "segment {}: intent expired at {}", segment, intent.ttl);
                let payload = intent.signing_payload(segment)?;
                for offer in intent.offers() {
                    ensure!(offer.is_fully_signed(), "segment {}: offer not fully signed", segment);
                    for (i, spend) in offer.inputs.iter().enumerate() {
                        let coin = self
                            .coins
                            .get(&spend.coin)
                            .ok_or_else(|| anyhow!("segment {}: input {} spends unknown coin", segment, i))?;
                        ensure!(spent.insert(spend.coin), "segment {}: input {} double spend", segment, i);
                        ensure!(address_of(&spend.owner) == coin.address, "segment {}: input {} not owned by signer", segment, i);
                        ensure!(coin.token == spend.token && coin.value == spend.value, "segment {}: input {} does not match coin", segment, i);
                        let signed = offer.signature(i).is_some_and(|sig| verify(&spend.owner, &payload, sig));
                        ensure!(signed, "segment {}: bad signature on input {}", segment, i);
                        *inputs.entry(spend.token.clone()).or_default() += spend.value;
                    }
                    for output in &offer.outputs {
                        *outputs.entry(output.token.clone()).or_default() += output.value;
                    }
                }
                if let Some(registration) = &intent.registration {
                    let signed = registration.signature.as_ref().is_some_and(|sig| verify(&registration.owner, &payload, sig));
                    ensure!(signed, "segment {}: bad registration signature", segment);
                }
            }
        }

        for (token, out) in &outputs {
            let available = inputs.get(token).copied().unwrap_or(0);
            ensure!(available >= *out, "{} outputs {} exceed inputs {}", token, out, available);
        }
        Ok(())
    }

    fn apply(&mut self, tx: &FinalizedTransaction, now: DateTime<Utc>) {
        let mut index = 0u32;
        for part in tx.transactions() {
            for (_, intent) in part.intents() {
                for offer in intent.offers() {
                    for spend in &offer.inputs {
                        self.coins.remove(&spend.coin);
                    }
                    for output in &offer.outputs {
                        let id = CoinRef { tx: tx.id, index };
                        index += 1;
                        self.coins.insert(
                            id,
                            Coin { id, address: output.receiver, token: output.token.clone(), value: output.value, created_at: now },
                        );
                    }
                }
                self.contract_calls.extend(intent.actions.iter().cloned());
                if let Some(registration) = intent.registration.as_ref().filter(|r| r.value > 0) {
                    self.resources.insert(registration.receiver, resource_for(registration, now));
                }
            }
        }
        self.submitted.push(tx.id);
    }
}

fn resource_for(registration: &ResourceRegistration, now: DateTime<Utc>) -> ResourceBalance {
    ResourceBalance {
        accrued: registration.value / RESOURCE_GRANT_DIVISOR,
        rate_per_sec: registration.value / RESOURCE_RATE_DIVISOR,
        as_of: now,
        cap: registration.value,
    }
}

fn change(receiver: Address, token: &TokenKind, value: u128) -> Option<Output> {
    (value > 0).then(|| Output { receiver, token: token.clone(), value })
}

#[async_trait]
impl Transport for SimLedger {
    async fn build_transfer(&self, _keys: &DerivedKeySet, outputs: Vec<Output>, ttl: DateTime<Utc>) -> anyhow::Result<Transaction> {
        self.state()?.calls.build_transfer += 1;
        ensure!(!outputs.is_empty(), "transfer has no outputs");
        Ok(Transaction::new().with_intent(TRANSFER_SEGMENT, Intent::new(ttl).with_guaranteed(Offer::new(vec![], outputs))))
    }

    async fn balance(&self, mut tx: Transaction, keys: &DerivedKeySet, options: BalanceOptions) -> anyhow::Result<TransactionRecipe> {
        let mut state = self.state()?;
        state.calls.balance += 1;
        let payer = keys.public_pool();
        let owner = payer.public_key();
        let home = payer.address();

        let in_use: BTreeSet<CoinRef> = tx.spends().map(|s| s.coin).collect();
        let mut pool: Vec<Coin> =
            state.coins.values().filter(|c| c.address == home && !in_use.contains(&c.id)).cloned().collect();
        // smallest first
        pool.sort_by(|a, b| a.value.cmp(&b.value).then(a.id.cmp(&b.id)));

        let mut spends = Vec::new();
        let mut outputs = Vec::new();
        let mut primary_excess = 0u128;
        for (token, need) in shortfall(&tx) {
            let (coins, total) = select(&mut pool, &token, need)?;
            spends.extend(coins.iter().map(|c| Spend::of(c, owner)));
            if token == TokenKind::Primary {
                primary_excess = total - need;
            } else {
                outputs.extend(change(home, &token, total - need));
            }
        }

        let fee = state.fee;
        let mut balancing = None;
        if fee > 0 && primary_excess < fee && !pool.is_empty() {
            let (coins, total) = select(&mut pool, &TokenKind::Primary, fee - primary_excess)?;
            let offer = Offer::new(
                coins.iter().map(|c| Spend::of(c, owner)).collect(),
                change(home, &TokenKind::Primary, total - (fee - primary_excess)).into_iter().collect(),
            );
            balancing = Some(Transaction::new().with_intent(TRANSFER_SEGMENT, Intent::new(options.ttl).with_guaranteed(offer)));
            primary_excess = 0;
        } else {
            ensure!(primary_excess >= fee, "insufficient primary funds for fee {}", fee);
            primary_excess -= fee;
        }
        outputs.extend(change(home, &TokenKind::Primary, primary_excess));

        let segment = tx.intents().map(|(id, _)| id).next().unwrap_or(TRANSFER_SEGMENT);
        let intent = tx.segments.entry(segment).or_default().intent.get_or_insert_with(|| Intent::new(options.ttl));
        let offer = intent.guaranteed_offer.get_or_insert_with(Offer::default);
        offer.inputs.extend(spends);
        offer.outputs.extend(outputs);
        debug!(inputs = offer.inputs.len(), balancing = balancing.is_some(), "sim balanced");
        Ok(TransactionRecipe::new(tx, balancing))
    }

    async fn build_resource_generation(&self, request: ResourceGenerationRequest) -> anyhow::Result<Transaction> {
        self.state()?.calls.build_resource_generation += 1;
        let value = request.value();
        let spends = request.coins.iter().map(|c| Spend::of(c, request.public_key)).collect();
        let outputs = change(address_of(&request.public_key), &TokenKind::Primary, value).into_iter().collect();
        let mut intent = Intent::new(request.valid_until).with_guaranteed(Offer::new(spends, outputs));
        intent.registration = Some(ResourceRegistration {
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            owner: request.public_key,
            receiver: request.receiver,
            value,
            signature: None,
        });
        Ok(Transaction::new().with_intent(GENERATION_SEGMENT, intent))
    }

    async fn finalize(&self, recipe: SignedRecipe) -> anyhow::Result<FinalizedTransaction> {
        let nonce = {
            let mut state = self.state()?;
            state.calls.finalize += 1;
            state.nonce += 1;
            state.nonce
        };
        let (base, balancing) = recipe.into_parts();
        for (segment, intent) in base.intents() {
            ensure!(intent.proof_state == ProofState::Proof, "base segment {} is {:?}", segment, intent.proof_state);
        }
        let balancing = match balancing {
            Some(tx) => Some(prove(tx)?),
            None => None,
        };
        Ok(FinalizedTransaction::new(base, balancing, nonce)?)
    }

    async fn submit(&self, tx: FinalizedTransaction) -> anyhow::Result<TransactionId> {
        let mut state = self.state()?;
        state.calls.submit += 1;
        ensure!(!state.faults.reject_submit, "node rejected transaction {}", tx.id);
        let now = Utc::now();
        state.validate(&tx, now)?;
        state.apply(&tx, now);
        state.notify();
        debug!(tx = %tx.id, "sim applied");
        Ok(tx.id)
    }
}

/// Materialize pre-proofs.
fn prove(mut tx: Transaction) -> anyhow::Result<Transaction> {
    for segment in tx.segments.values_mut() {
        if let Some(intent) = segment.intent.as_mut() {
            ensure!(intent.proof_state != ProofState::Unproven, "balancing intent is unproven");
            *intent = intent.retag(ProofState::Proof)?;
        }
    }
    Ok(tx)
}
