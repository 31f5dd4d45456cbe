//! Integration Tests: keys, signing, configuration and identity through the public API
//!
//! These tests verify:
//! 1. Short seeds derive the same role keys as their zero-padded form
//! 2. Mnemonic and hex seed input agree
//! 3. Signed intents verify against the role public key
//! 4. Proof-state retagging keeps payload bytes
//! 5. Endpoint overrides from the environment
//! 6. Identity contract calls

use chrono::{DateTime, Utc};
use kycnode::keys::verify;
use kycnode::tx::{CoinRef, Intent, Offer, Spend, TokenKind, TransactionId};
use kycnode::{derive, derive_from_seed, sign_intents, NetworkConfig, NetworkId, ProofState, Role, SeedMaterial, Transaction};
use once_cell::sync::Lazy;
use std::sync::Mutex;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

// Test mnemonic (well-known, never use with real funds)
const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn spend(owner: kycnode::keys::PublicKey, n: u8) -> Spend {
    Spend {
        coin: CoinRef { tx: TransactionId([n; 32]), index: 0 },
        owner,
        token: TokenKind::Primary,
        value: 100,
    }
}

/// Test: 32-byte seed and its zero-padded 64-byte form derive identical keys
#[test]
fn short_seed_matches_padded() {
    let mut short = [0u8; 32];
    short[31] = 1;
    let mut padded = [0u8; 64];
    padded[..32].copy_from_slice(&short);

    let a = derive(&short).expect("short");
    let b = derive(&padded).expect("padded");
    for role in Role::ALL {
        assert_eq!(a.get(role).public_key(), b.get(role).public_key());
        assert_eq!(a.get(role).address(), b.get(role).address());
    }
}

/// Test: hex seed text and mnemonic parse to the same material as their sources
#[test]
fn seed_text_forms_agree() {
    let from_words = SeedMaterial::parse(TEST_MNEMONIC).expect("mnemonic");
    let from_hex = SeedMaterial::parse(&from_words.to_hex()).expect("hex");
    let a = derive_from_seed(&from_words).expect("keys");
    let b = derive_from_seed(&from_hex).expect("keys");
    assert_eq!(a.public_pool().address(), b.public_pool().address());

    assert!(SeedMaterial::parse("abandon abandon").is_err());
    assert!(SeedMaterial::parse("zz").is_err());
}

/// Test: every segment is signed once and verifies under the owner key
#[test]
fn signed_segments_verify() {
    let keys = derive(&[3u8; 32]).expect("keys");
    let owner = keys.public_pool().public_key();
    let signer = keys.public_pool().signer().expect("signer");
    let ttl = DateTime::<Utc>::UNIX_EPOCH;

    let mut tx = Transaction::new()
        .with_intent(1, Intent::new(ttl).with_guaranteed(Offer::new(vec![spend(owner, 1), spend(owner, 2)], vec![])))
        .with_intent(4, Intent::new(ttl).with_fallible(Offer::new(vec![spend(owner, 3)], vec![])));

    let signed = sign_intents(&mut tx, &signer, ProofState::Proof).expect("sign");
    assert_eq!(signed, 2);
    assert!(tx.signature_defect().is_none());

    for (segment, intent) in tx.intents() {
        assert_eq!(intent.proof_state, ProofState::Proof);
        let payload = intent.signing_payload(segment).expect("payload");
        for offer in intent.offers() {
            for i in 0..offer.inputs.len() {
                assert!(verify(&owner, &payload, offer.signature(i).expect("slot")));
            }
        }
    }
}

/// Test: retagging through every proof state leaves the encoded bytes intact
#[test]
fn proof_state_retag_keeps_bytes() {
    let keys = derive(&[3u8; 32]).expect("keys");
    let intent = Intent::new(DateTime::<Utc>::UNIX_EPOCH)
        .with_guaranteed(Offer::new(vec![spend(keys.public_pool().public_key(), 1)], vec![]));
    let original = intent.encode().expect("encode");

    let mut current = intent;
    for state in [ProofState::PreProof, ProofState::Proof, ProofState::Unproven, ProofState::Proof] {
        current = current.retag(state).expect("retag");
        assert_eq!(current.proof_state, state);
        assert_eq!(current.encode().expect("encode"), original);
    }
}

/// Test: KYC_* variables override network defaults
#[test]
fn endpoint_overrides_from_env() {
    let _guard = lock_env();
    std::env::set_var("KYC_PROOF_SERVER_URL", " http://prover:6300 ");
    std::env::set_var("KYC_NODE_URL", "");

    let config = NetworkConfig::from_env(NetworkId::PreProd);
    assert_eq!(config.network, NetworkId::PreProd);
    assert_eq!(config.proof_server_url, "http://prover:6300");
    assert_eq!(config.node_url, NetworkConfig::preprod().node_url);

    std::env::remove_var("KYC_PROOF_SERVER_URL");
    std::env::remove_var("KYC_NODE_URL");
    assert_eq!(NetworkConfig::from_env(NetworkId::Undeployed), NetworkConfig::local());
}

/// Test: identity payload flows into all three KYC calls
#[test]
fn identity_calls_share_commitment_inputs() {
    use kycnode::identity::{self, Pii, KYC_CONTRACT};

    let pii = Pii::new("Test Person", 1990, "India");
    let payload = pii.payload(2025).expect("payload");
    let wallet = derive(&[3u8; 32]).expect("keys").public_pool().address();

    let calls = [
        identity::register(&payload, wallet).expect("register"),
        identity::prove_age_eligible(&payload, wallet, 2025).expect("age"),
        identity::prove_residency(&payload, wallet, "india").expect("residency"),
    ];
    for call in &calls {
        assert_eq!(call.contract, KYC_CONTRACT);
        let args: serde_json::Value = serde_json::from_slice(&call.payload).expect("json");
        assert_eq!(args["wallet"], wallet.to_hex());
        assert_eq!(args["identity"]["secret"], pii.secret);
    }
    assert_eq!(calls[1].entry_point, "prove_age_eligible");
}
