//! Signing capability.
//!
//! Public-pool spends are authorized with BIP-340 Schnorr signatures over
//! SHA-256 of the canonical signing payload. The signature algorithm itself is
//! a supplied primitive; everything above this module only sees the `Signer`
//! trait and opaque `Signature` values.

use bitcoin::secp256k1::{schnorr, Keypair, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

crate::fixed_bytes!(
    /// X-only public key of a role key (32 bytes).
    PublicKey,
    32
);

crate::fixed_bytes!(
    /// Opaque signature value (64 bytes).
    Signature,
    64
);

/// Produces one signature for an arbitrary payload.
///
/// Implemented for closures so tests can pass `|payload| ...` directly.
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Signature;
}

impl<F> Signer for F
where
    F: Fn(&[u8]) -> Signature + Send + Sync,
{
    fn sign(&self, payload: &[u8]) -> Signature {
        self(payload)
    }
}

fn digest(payload: &[u8]) -> Message {
    let hash: [u8; 32] = Sha256::digest(payload).into();
    Message::from_digest(hash)
}

/// Schnorr signer over a role secret key.
pub struct RoleSigner {
    keypair: Keypair,
    secp: Secp256k1<bitcoin::secp256k1::All>,
}

impl RoleSigner {
    pub(crate) fn new(keypair: Keypair) -> Self {
        Self { keypair, secp: Secp256k1::new() }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.keypair.x_only_public_key().0.serialize())
    }
}

impl Signer for RoleSigner {
    fn sign(&self, payload: &[u8]) -> Signature {
        let sig = self.secp.sign_schnorr_no_aux_rand(&digest(payload), &self.keypair);
        Signature(sig.serialize())
    }
}

impl Drop for RoleSigner {
    fn drop(&mut self) {
        self.keypair.non_secure_erase();
    }
}

impl std::fmt::Debug for RoleSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleSigner").field("public_key", &self.public_key()).finish()
    }
}

/// Check a signature against a public key and payload.
pub fn verify(public_key: &PublicKey, payload: &[u8], signature: &Signature) -> bool {
    let Ok(xonly) = XOnlyPublicKey::from_slice(public_key.as_ref()) else {
        return false;
    };
    let Ok(sig) = schnorr::Signature::from_slice(signature.as_ref()) else {
        return false;
    };
    Secp256k1::verification_only()
        .verify_schnorr(&sig, &digest(payload), &xonly)
        .is_ok()
}
