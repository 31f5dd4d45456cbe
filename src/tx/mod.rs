//! Transaction model: segments, intents, offers and the recipe lifecycle.
//!
//! ```text
//! Transaction ──(balance)──→ TransactionRecipe ──(sign)──→ SignedRecipe
//!                                                              │
//!                     TransactionId ←──(submit)── FinalizedTransaction
//! ```
//!
//! Each stage is its own type so a recipe cannot be submitted unsigned.
//! `SignedRecipe` is only built by the assembler.

mod generation;
mod signer;

pub use generation::{attach_generation_signature, ResourceGenerationRequest, GENERATION_SEGMENT};
pub use signer::{sign_intents, SIGNING_DOMAIN};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::WalletResult;
use crate::keys::{PublicKey, Signature};

/// Addressable, independently-signable slice of a transaction.
pub type SegmentId = u16;

crate::fixed_bytes!(
    /// Receiving address (SHA-256 of a public key).
    Address,
    32
);

crate::fixed_bytes!(
    /// Transaction identifier assigned at finalization.
    TransactionId,
    32
);

/// Whether an intent's zero-knowledge proof is materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofState {
    #[default]
    Unproven,
    PreProof,
    Proof,
}

/// Token kinds known to the wallet. Text form is used as JSON map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    /// Public-pool token used for transfers and resource generation.
    Primary,
    /// Metering token produced by resource generation.
    Resource,
    /// Any other token, by hex type id.
    Custom(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Primary => f.write_str("primary"),
            TokenKind::Resource => f.write_str("resource"),
            TokenKind::Custom(id) => write!(f, "custom:{}", id),
        }
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "primary" => Ok(TokenKind::Primary),
            "resource" => Ok(TokenKind::Resource),
            other => other
                .strip_prefix("custom:")
                .filter(|id| !id.is_empty())
                .map(|id| TokenKind::Custom(id.to_string()))
                .ok_or_else(|| format!("unknown token kind: {}", other)),
        }
    }
}

impl Serialize for TokenKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to a ledger output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinRef {
    pub tx: TransactionId,
    pub index: u32,
}

/// Unspent output owned by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub id: CoinRef,
    pub address: Address,
    pub token: TokenKind,
    pub value: u128,
    pub created_at: DateTime<Utc>,
}

/// Offer input: spends `coin`, authorized by `owner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spend {
    pub coin: CoinRef,
    pub owner: PublicKey,
    pub token: TokenKind,
    pub value: u128,
}

impl Spend {
    pub fn of(coin: &Coin, owner: PublicKey) -> Self {
        Self { coin: coin.id, owner, token: coin.token.clone(), value: coin.value }
    }
}

/// Offer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub receiver: Address,
    pub token: TokenKind,
    pub value: u128,
}

/// Ordered spends paired with ordered signatures.
///
/// `signatures[i]` authorizes `inputs[i]`; an absent slot is unsigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub inputs: Vec<Spend>,
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub signatures: Vec<Option<Signature>>,
}

impl Offer {
    pub fn new(inputs: Vec<Spend>, outputs: Vec<Output>) -> Self {
        Self { inputs, outputs, signatures: Vec::new() }
    }

    pub fn signature(&self, index: usize) -> Option<&Signature> {
        self.signatures.get(index).and_then(Option::as_ref)
    }

    /// Fill every unsigned input slot with `signature`; signed slots keep theirs.
    pub fn fill_signatures(&mut self, signature: &Signature) {
        self.signatures = (0..self.inputs.len())
            .map(|i| Some(self.signature(i).copied().unwrap_or(*signature)))
            .collect();
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.len() == self.inputs.len() && self.signatures.iter().all(Option::is_some)
    }

    fn strip_signatures(&mut self) {
        self.signatures.clear();
    }
}

/// Opaque contract call carried by an intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: String,
    pub entry_point: String,
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
}

/// Registration converting coins into a resource balance over a validity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRegistration {
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub owner: PublicKey,
    pub receiver: Address,
    pub value: u128,
    #[serde(default)]
    pub signature: Option<Signature>,
}

/// Signable payload unit within a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub ttl: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guaranteed_offer: Option<Offer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallible_offer: Option<Offer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ContractCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<ResourceRegistration>,
    /// Tag only; never part of the encoded bytes.
    #[serde(skip)]
    pub proof_state: ProofState,
}

impl Intent {
    pub fn new(ttl: DateTime<Utc>) -> Self {
        Self {
            ttl,
            guaranteed_offer: None,
            fallible_offer: None,
            actions: Vec::new(),
            registration: None,
            proof_state: ProofState::Unproven,
        }
    }

    pub fn with_guaranteed(mut self, offer: Offer) -> Self {
        self.guaranteed_offer = Some(offer);
        self
    }

    pub fn with_fallible(mut self, offer: Offer) -> Self {
        self.fallible_offer = Some(offer);
        self
    }

    pub fn with_action(mut self, call: ContractCall) -> Self {
        self.actions.push(call);
        self
    }

    /// Payload bytes. The proof-state tag is carried outside them.
    pub fn encode(&self) -> WalletResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(proof_state: ProofState, bytes: &[u8]) -> WalletResult<Self> {
        let mut intent: Intent = serde_json::from_slice(bytes)?;
        intent.proof_state = proof_state;
        Ok(intent)
    }

    /// Fresh copy of the payload bytes tagged `target`.
    pub fn retag(&self, target: ProofState) -> WalletResult<Self> {
        Self::decode(target, &self.encode()?)
    }

    pub fn offers(&self) -> impl Iterator<Item = &Offer> {
        self.guaranteed_offer.iter().chain(self.fallible_offer.iter())
    }

    pub fn offers_mut(&mut self) -> impl Iterator<Item = &mut Offer> {
        self.guaranteed_offer.iter_mut().chain(self.fallible_offer.iter_mut())
    }

    /// Canonical bytes to sign for this intent at `segment`.
    ///
    /// Signatures and the proof-state tag are excluded, so every co-signer
    /// computes the same payload regardless of what is already attached.
    pub fn signing_payload(&self, segment: SegmentId) -> WalletResult<Vec<u8>> {
        let mut body = self.clone();
        body.offers_mut().for_each(Offer::strip_signatures);
        if let Some(registration) = body.registration.as_mut() {
            registration.signature = None;
        }
        let mut payload = Vec::with_capacity(SIGNING_DOMAIN.len() + 2 + 256);
        payload.extend_from_slice(SIGNING_DOMAIN);
        payload.extend_from_slice(&segment.to_be_bytes());
        payload.extend_from_slice(&serde_json::to_vec(&body)?);
        Ok(payload)
    }

    /// First structural defect, if any.
    fn signature_defect(&self) -> Option<String> {
        let offers = [("guaranteed", &self.guaranteed_offer), ("fallible", &self.fallible_offer)];
        for (name, offer) in offers {
            if let Some(offer) = offer {
                if !offer.is_fully_signed() {
                    let present = offer.signatures.iter().filter(|s| s.is_some()).count();
                    return Some(format!(
                        "{} offer has {} of {} input signatures",
                        name,
                        present,
                        offer.inputs.len()
                    ));
                }
            }
        }
        match &self.registration {
            Some(r) if r.signature.is_none() => Some("registration is unsigned".into()),
            _ => None,
        }
    }
}

/// One segment: an optional intent and an optional confidential (proof-only) payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
    pub confidential: Option<Vec<u8>>,
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Segment id → segment. Ids are unique; iteration order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub segments: BTreeMap<SegmentId, Segment>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intent(mut self, segment: SegmentId, intent: Intent) -> Self {
        self.segments.entry(segment).or_default().intent = Some(intent);
        self
    }

    pub fn intent(&self, segment: SegmentId) -> Option<&Intent> {
        self.segments.get(&segment).and_then(|s| s.intent.as_ref())
    }

    pub fn intent_mut(&mut self, segment: SegmentId) -> Option<&mut Intent> {
        self.segments.get_mut(&segment).and_then(|s| s.intent.as_mut())
    }

    pub fn intents(&self) -> impl Iterator<Item = (SegmentId, &Intent)> {
        self.segments.iter().filter_map(|(id, s)| s.intent.as_ref().map(|i| (*id, i)))
    }

    /// All spends across intents, in segment order.
    pub fn spends(&self) -> impl Iterator<Item = &Spend> {
        self.intents().flat_map(|(_, i)| i.offers()).flat_map(|o| o.inputs.iter())
    }

    /// First segment whose intent is not fully signed.
    pub fn signature_defect(&self) -> Option<String> {
        self.intents()
            .find_map(|(id, intent)| intent.signature_defect().map(|d| format!("segment {}: {}", id, d)))
    }
}

/// Balanced transaction: base plus optional fee-balancing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecipe {
    pub base: Transaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balancing: Option<Transaction>,
}

impl TransactionRecipe {
    pub fn new(base: Transaction, balancing: Option<Transaction>) -> Self {
        Self { base, balancing }
    }
}

/// Recipe whose intents have been signed. Built only by the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRecipe {
    base: Transaction,
    balancing: Option<Transaction>,
}

impl SignedRecipe {
    pub(crate) fn new(base: Transaction, balancing: Option<Transaction>) -> Self {
        Self { base, balancing }
    }

    pub fn base(&self) -> &Transaction {
        &self.base
    }

    pub fn balancing(&self) -> Option<&Transaction> {
        self.balancing.as_ref()
    }

    pub fn into_parts(self) -> (Transaction, Option<Transaction>) {
        (self.base, self.balancing)
    }

    pub(crate) fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        std::iter::once(&self.base).chain(self.balancing.iter())
    }
}

/// Proven, bound transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTransaction {
    pub id: TransactionId,
    pub base: Transaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balancing: Option<Transaction>,
}

impl FinalizedTransaction {
    /// Id is SHA-256 over the encoded parts and a caller nonce.
    pub fn new(base: Transaction, balancing: Option<Transaction>, nonce: u64) -> WalletResult<Self> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&base)?);
        if let Some(balancing) = &balancing {
            hasher.update(serde_json::to_vec(balancing)?);
        }
        hasher.update(nonce.to_be_bytes());
        Ok(Self { id: TransactionId(hasher.finalize().into()), base, balancing })
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        std::iter::once(&self.base).chain(self.balancing.iter())
    }
}
