//! Seed material: raw bytes, hex text or a BIP-39 mnemonic.

use bip39::Mnemonic;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{WalletError, WalletResult};

/// Canonical seed length handed to the HD derivation.
pub const SEED_LEN: usize = 64;
/// Short seed length, zero-padded to `SEED_LEN`.
pub const SHORT_SEED_LEN: usize = 32;

/// A 64-byte seed. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SeedMaterial {
    bytes: [u8; SEED_LEN],
}

impl SeedMaterial {
    /// Accept 32 or 64 raw bytes. 32-byte seeds are zero-padded.
    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        let mut seed = [0u8; SEED_LEN];
        match bytes.len() {
            SHORT_SEED_LEN | SEED_LEN => seed[..bytes.len()].copy_from_slice(bytes),
            n => {
                return Err(WalletError::InvalidSeed(format!(
                    "expected {} or {} bytes, got {}",
                    SHORT_SEED_LEN, SEED_LEN, n
                )))
            }
        }
        Ok(Self { bytes: seed })
    }

    /// 12 or 24 word mnemonic, empty passphrase.
    pub fn from_mnemonic(words: &str) -> WalletResult<Self> {
        let count = words.split_whitespace().count();
        if count != 12 && count != 24 {
            return Err(WalletError::InvalidSeed(format!(
                "mnemonic must have 12 or 24 words, got {}",
                count
            )));
        }
        let mnemonic = Mnemonic::parse_normalized(words)
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        Ok(Self { bytes: mnemonic.to_seed("") })
    }

    /// Parse CLI / config input: a mnemonic, or 64 / 128 hex characters.
    pub fn parse(input: &str) -> WalletResult<Self> {
        let trimmed = input.trim();
        if trimmed.split_whitespace().count() > 1 {
            return Self::from_mnemonic(trimmed);
        }
        if trimmed.len() != SHORT_SEED_LEN * 2 && trimmed.len() != SEED_LEN * 2 {
            return Err(WalletError::InvalidSeed(
                "expected a 12/24-word mnemonic or a 64/128-character hex seed".into(),
            ));
        }
        let raw = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| WalletError::InvalidSeed(e.to_string()))?,
        );
        Self::from_bytes(&raw)
    }

    /// Fresh 12-word mnemonic and its seed.
    pub fn generate() -> WalletResult<(String, Self)> {
        let mut entropy = Zeroizing::new([0u8; 16]);
        rand::thread_rng().fill_bytes(&mut entropy[..]);
        let mnemonic = Mnemonic::from_entropy(&entropy[..])
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        let seed = Self { bytes: mnemonic.to_seed("") };
        Ok((mnemonic.to_string(), seed))
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl std::fmt::Debug for SeedMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SeedMaterial(..)")
    }
}
