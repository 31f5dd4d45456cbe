//! Identity - PII → opaque identity payload for the KYC contract.
//!
//! The core never interprets these bytes. Only the contract layer reads
//! them, inside circuits.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::tx::{Address, ContractCall};

/// Contract name used in every KYC call.
pub const KYC_CONTRACT: &str = "kyc";
/// Minimum age proven by [`prove_age_eligible`].
pub const MIN_AGE: u32 = 18;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity secret must be 32 bytes of hex: {0}")]
    Secret(String),
    #[error("birth year {0} is in the future")]
    BirthYear(u32),
    #[error("country is empty")]
    Country,
}

/// Personal data as entered by the user. Stays on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pii {
    pub full_name: String,
    pub birth_year: u32,
    pub country: String,
    /// 32 bytes, hex.
    pub secret: String,
}

impl Pii {
    /// New record with a fresh random secret.
    pub fn new(full_name: impl Into<String>, birth_year: u32, country: impl Into<String>) -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { full_name: full_name.into(), birth_year, country: country.into(), secret: hex::encode(secret) }
    }

    pub fn payload(&self, current_year: u32) -> Result<IdentityPayload, IdentityError> {
        if self.birth_year > current_year {
            return Err(IdentityError::BirthYear(self.birth_year));
        }
        if self.country.trim().is_empty() {
            return Err(IdentityError::Country);
        }
        let mut secret = [0u8; 32];
        hex::decode_to_slice(self.secret.trim(), &mut secret).map_err(|e| IdentityError::Secret(e.to_string()))?;
        Ok(IdentityPayload { birth_year: self.birth_year, country_hash: hash_country(&self.country), secret })
    }
}

/// SHA-256 of the trimmed, lower-cased country name.
pub fn hash_country(country: &str) -> [u8; 32] {
    Sha256::digest(country.trim().to_lowercase().as_bytes()).into()
}

/// What the contract sees.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPayload {
    pub birth_year: u32,
    #[serde(with = "hex::serde")]
    pub country_hash: [u8; 32],
    #[serde(with = "hex::serde")]
    pub secret: [u8; 32],
}

impl IdentityPayload {
    /// Commitment registered on-chain: SHA-256(birth year BE ‖ country hash ‖ secret).
    pub fn commitment(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.birth_year.to_be_bytes());
        hasher.update(self.country_hash);
        hasher.update(self.secret);
        hasher.finalize().into()
    }

    pub fn is_age_eligible(&self, current_year: u32, min_age: u32) -> bool {
        current_year.saturating_sub(self.birth_year) >= min_age
    }
}

impl std::fmt::Debug for IdentityPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityPayload")
            .field("birth_year", &self.birth_year)
            .field("country_hash", &hex::encode(self.country_hash))
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CallArgs<'a, T: Serialize> {
    identity: &'a IdentityPayload,
    wallet: Address,
    #[serde(flatten)]
    extra: T,
}

fn call<T: Serialize>(entry_point: &str, identity: &IdentityPayload, wallet: Address, extra: T) -> serde_json::Result<ContractCall> {
    let payload = serde_json::to_vec(&CallArgs { identity, wallet, extra })?;
    Ok(ContractCall { contract: KYC_CONTRACT.into(), entry_point: entry_point.into(), payload })
}

pub fn register(identity: &IdentityPayload, wallet: Address) -> serde_json::Result<ContractCall> {
    call("register", identity, wallet, serde_json::json!({}))
}

pub fn prove_age_eligible(identity: &IdentityPayload, wallet: Address, current_year: u32) -> serde_json::Result<ContractCall> {
    call(
        "prove_age_eligible",
        identity,
        wallet,
        serde_json::json!({ "current_year": current_year, "min_age": MIN_AGE }),
    )
}

pub fn prove_residency(identity: &IdentityPayload, wallet: Address, country: &str) -> serde_json::Result<ContractCall> {
    call(
        "prove_residency",
        identity,
        wallet,
        serde_json::json!({ "required_country_hash": hex::encode(hash_country(country)) }),
    )
}
