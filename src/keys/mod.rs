//! Keys - Derives role keys from seed. Seed and master key never outlive `derive`.
//!
//! ```text
//! SeedMaterial (64 bytes)
//!     │
//!     └── BIP32 master
//!           ├── m/44'/2400'/0'/0/0 ──→ PublicPool       (signs spends)
//!           ├── m/44'/2400'/0'/2/0 ──→ ResourcePool     (fee balancing)
//!           └── m/44'/2400'/0'/3/0 ──→ ConfidentialPool (shielded balancing)
//! ```

mod seed;
mod signer;

pub use seed::{SeedMaterial, SEED_LEN, SHORT_SEED_LEN};
pub use signer::{verify, PublicKey, RoleSigner, Signature, Signer};

use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{WalletError, WalletResult};
use crate::tx::Address;

const PURPOSE: u32 = 44;
const COIN_TYPE: u32 = 2400;
/// Fixed account index.
pub const ACCOUNT: u32 = 0;
/// Fixed key index within each role.
pub const KEY_INDEX: u32 = 0;

/// Role selector inside the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    PublicPool,
    ResourcePool,
    ConfidentialPool,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::PublicPool, Role::ResourcePool, Role::ConfidentialPool];

    pub fn selector(self) -> u32 {
        match self {
            Role::PublicPool => 0,
            Role::ResourcePool => 2,
            Role::ConfidentialPool => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::PublicPool => "public-pool",
            Role::ResourcePool => "resource-pool",
            Role::ConfidentialPool => "confidential-pool",
        }
    }

    fn path(self) -> String {
        format!("m/{}'/{}'/{}'/{}/{}", PURPOSE, COIN_TYPE, ACCOUNT, self.selector(), KEY_INDEX)
    }
}

/// One role's secret key. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RoleKey {
    #[zeroize(skip)]
    role: Role,
    secret: [u8; 32],
    #[zeroize(skip)]
    public: PublicKey,
}

impl RoleKey {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Receiving address: SHA-256 of the x-only public key.
    pub fn address(&self) -> Address {
        address_of(&self.public)
    }

    /// Schnorr signer bound to this key.
    pub fn signer(&self) -> WalletResult<RoleSigner> {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&self.secret)
            .map_err(|e| WalletError::InvalidSeed(format!("{}: {}", self.role.as_str(), e)))?;
        Ok(RoleSigner::new(Keypair::from_secret_key(&secp, &sk)))
    }
}

impl std::fmt::Debug for RoleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleKey")
            .field("role", &self.role)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Address derived from a public key.
pub fn address_of(public: &PublicKey) -> Address {
    Address(Sha256::digest(public.as_ref()).into())
}

/// Keys for all three roles. Single owner; not `Clone`.
#[derive(Debug)]
pub struct DerivedKeySet {
    public: RoleKey,
    resource: RoleKey,
    confidential: RoleKey,
}

impl DerivedKeySet {
    pub fn get(&self, role: Role) -> &RoleKey {
        match role {
            Role::PublicPool => &self.public,
            Role::ResourcePool => &self.resource,
            Role::ConfidentialPool => &self.confidential,
        }
    }

    pub fn public_pool(&self) -> &RoleKey {
        &self.public
    }

    pub fn resource_pool(&self) -> &RoleKey {
        &self.resource
    }

    pub fn confidential_pool(&self) -> &RoleKey {
        &self.confidential
    }
}

/// Master extended key for the duration of one derivation.
struct MasterContext {
    xpriv: Xpriv,
}

impl Drop for MasterContext {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

/// Derive the three role keys from 32 or 64 seed bytes.
pub fn derive(seed: &[u8]) -> WalletResult<DerivedKeySet> {
    let seed = SeedMaterial::from_bytes(seed)?;
    derive_from_seed(&seed)
}

/// Derive from already-validated seed material.
pub fn derive_from_seed(seed: &SeedMaterial) -> WalletResult<DerivedKeySet> {
    let secp = Secp256k1::new();
    let master = MasterContext {
        xpriv: Xpriv::new_master(bitcoin::Network::Bitcoin, seed.as_bytes())
            .map_err(|e| WalletError::InvalidSeed(format!("master key: {}", e)))?,
    };

    let derive_role = |role: Role| -> WalletResult<RoleKey> {
        let path = DerivationPath::from_str(&role.path())
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        let mut child = master
            .xpriv
            .derive_priv(&secp, &path)
            .map_err(|e| WalletError::InvalidSeed(format!("{}: {}", role.as_str(), e)))?;
        let keypair = Keypair::from_secret_key(&secp, &child.private_key);
        let key = RoleKey {
            role,
            secret: child.private_key.secret_bytes(),
            public: PublicKey(keypair.x_only_public_key().0.serialize()),
        };
        child.private_key.non_secure_erase();
        Ok(key)
    };

    Ok(DerivedKeySet {
        public: derive_role(Role::PublicPool)?,
        resource: derive_role(Role::ResourcePool)?,
        confidential: derive_role(Role::ConfidentialPool)?,
    })
}
