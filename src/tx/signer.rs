//! Intent signing across every segment of a transaction.

use tracing::debug;

use super::{Intent, ProofState, SegmentId, Transaction};
use crate::error::WalletResult;
use crate::keys::Signer;

/// Domain separator prefixed to every signing payload.
pub const SIGNING_DOMAIN: &[u8] = b"kycnode:intent-signature:v1";

/// Sign every intent of `tx`, re-tagged at `target`.
///
/// One signature per segment; it fills each unsigned input slot of the
/// guaranteed and fallible offers. Slots that already carry a signature are
/// kept (first signer wins). Segments without an intent are left alone.
/// The transaction is only modified once every segment has been signed.
///
/// Returns the number of segments signed.
pub fn sign_intents(tx: &mut Transaction, signer: &dyn Signer, target: ProofState) -> WalletResult<usize> {
    let mut signed: Vec<(SegmentId, Intent)> = Vec::with_capacity(tx.segments.len());

    for (segment, intent) in tx.intents() {
        let mut cloned = intent.retag(target)?;
        let payload = cloned.signing_payload(segment)?;
        let signature = signer.sign(&payload);
        cloned.offers_mut().for_each(|offer| offer.fill_signatures(&signature));
        debug!(segment, proof_state = ?target, "signed intent");
        signed.push((segment, cloned));
    }

    let count = signed.len();
    for (segment, intent) in signed {
        if let Some(slot) = tx.segments.get_mut(&segment) {
            slot.intent = Some(intent);
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{PublicKey, Signature};
    use crate::tx::{CoinRef, Offer, Segment, Spend, TokenKind, TransactionId};
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spend(n: u8) -> Spend {
        Spend {
            coin: CoinRef { tx: TransactionId([n; 32]), index: n as u32 },
            owner: PublicKey([1; 32]),
            token: TokenKind::Primary,
            value: 100,
        }
    }

    fn intent(inputs: usize) -> Intent {
        Intent::new(DateTime::<Utc>::UNIX_EPOCH)
            .with_guaranteed(Offer::new((0..inputs as u8).map(spend).collect(), vec![]))
    }

    fn constant(payload: &[u8]) -> Signature {
        let _ = payload;
        Signature([7; 64])
    }

    #[test]
    fn empty_transaction_is_noop() {
        let mut tx = Transaction::new();
        assert_eq!(sign_intents(&mut tx, &constant, ProofState::Proof).unwrap(), 0);
        assert_eq!(tx, Transaction::new());
    }

    #[test]
    fn segment_without_intent_is_skipped() {
        let mut tx = Transaction::new();
        tx.segments.insert(0, Segment { intent: None, confidential: Some(vec![1, 2, 3]) });
        let before = tx.clone();
        assert_eq!(sign_intents(&mut tx, &constant, ProofState::Proof).unwrap(), 0);
        assert_eq!(tx, before);
    }

    #[test]
    fn zero_input_offer_stays_empty() {
        let mut tx = Transaction::new().with_intent(1, intent(0));
        sign_intents(&mut tx, &constant, ProofState::PreProof).unwrap();
        let signed = tx.intent(1).unwrap();
        assert!(signed.guaranteed_offer.as_ref().unwrap().signatures.is_empty());
        assert_eq!(signed.proof_state, ProofState::PreProof);
    }

    #[test]
    fn one_signature_per_segment() {
        let calls = AtomicUsize::new(0);
        let counting = |_: &[u8]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Signature([3; 64])
        };
        let mut tx = Transaction::new().with_intent(1, intent(4)).with_intent(2, intent(2));
        assert_eq!(sign_intents(&mut tx, &counting, ProofState::Proof).unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn payload_is_segment_specific() {
        let seen = std::sync::Mutex::new(Vec::new());
        let recording = |payload: &[u8]| {
            seen.lock().unwrap().push(payload.to_vec());
            Signature([3; 64])
        };
        let mut tx = Transaction::new().with_intent(1, intent(1)).with_intent(2, intent(1));
        sign_intents(&mut tx, &recording, ProofState::Proof).unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert!(seen[0].starts_with(SIGNING_DOMAIN));
    }

    #[test]
    fn retag_path_does_not_change_payload() {
        const STATES: [ProofState; 3] = [ProofState::Unproven, ProofState::PreProof, ProofState::Proof];
        let base = intent(2);
        for from in STATES {
            for to in STATES {
                let via = base.retag(from).unwrap().retag(to).unwrap();
                let direct = base.retag(to).unwrap();
                assert_eq!(via.proof_state, to);
                assert_eq!(via.signing_payload(3).unwrap(), direct.signing_payload(3).unwrap());
            }
        }
    }

    #[test]
    fn second_signer_keeps_first_signers_slots() {
        let first = |_: &[u8]| Signature([1; 64]);
        let second = |_: &[u8]| Signature([2; 64]);
        let mut tx = Transaction::new().with_intent(1, intent(2));

        sign_intents(&mut tx, &first, ProofState::PreProof).unwrap();
        tx.intent_mut(1).unwrap().guaranteed_offer.as_mut().unwrap().inputs.push(spend(9));
        sign_intents(&mut tx, &second, ProofState::Proof).unwrap();

        let offer = tx.intent(1).unwrap().guaranteed_offer.clone().unwrap();
        assert_eq!(offer.signature(0), Some(&Signature([1; 64])));
        assert_eq!(offer.signature(1), Some(&Signature([1; 64])));
        assert_eq!(offer.signature(2), Some(&Signature([2; 64])));
        assert!(offer.is_fully_signed());
        assert_eq!(tx.intent(1).unwrap().proof_state, ProofState::Proof);
    }
}
