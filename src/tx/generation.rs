//! Resource-generation transactions.
//!
//! Built by the transport with exactly one signable segment. Signing is a
//! single payload and a single signature, merged by
//! [`attach_generation_signature`] instead of the per-segment signer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, Coin, SegmentId, Transaction};
use crate::error::{WalletError, WalletResult};
use crate::keys::{PublicKey, Signature};

/// The only signable segment of a resource-generation transaction.
pub const GENERATION_SEGMENT: SegmentId = 1;

/// Inputs to the transport's resource-generation builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGenerationRequest {
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub coins: Vec<Coin>,
    pub public_key: PublicKey,
    pub receiver: Address,
}

impl ResourceGenerationRequest {
    /// Sum of the coin values being registered.
    pub fn value(&self) -> u128 {
        self.coins.iter().map(|c| c.value).sum()
    }
}

/// Merge one signature into the generation segment.
///
/// Sets the registration signature and every unsigned input slot of the
/// segment's offers. Existing signatures are kept.
pub fn attach_generation_signature(tx: &mut Transaction, signature: &Signature) -> WalletResult<()> {
    let intent = tx
        .intent_mut(GENERATION_SEGMENT)
        .ok_or(WalletError::MissingIntent(GENERATION_SEGMENT))?;
    if let Some(registration) = intent.registration.as_mut() {
        registration.signature.get_or_insert(*signature);
    }
    intent.offers_mut().for_each(|offer| offer.fill_signatures(signature));
    Ok(())
}
