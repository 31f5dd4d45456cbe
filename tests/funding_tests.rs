//! Funding Tests: orchestrator and assembler against the simulated ledger
//!
//! These tests verify:
//! 1. A fresh wallet on a dev network is funded and gets a resource balance
//! 2. An already-funded wallet never touches the transport
//! 3. Fees that the base transaction cannot cover spill into a balancing transaction
//! 4. Every session opened by the orchestrator is stopped on failure
//! 5. Networks without auto-funding wait for external funds
//! 6. KYC contract calls are submitted as fee-balanced transactions

use chrono::Utc;
use kycnode::config::expiry;
use kycnode::sim::{SimLedger, DEFAULT_FEE};
use kycnode::sync::ResourceBalance;
use kycnode::tx::{Address, Output, ResourceGenerationRequest, TokenKind};
use kycnode::{
    derive_from_seed, FundingTarget, NetworkConfig, Orchestrator, SeedMaterial, WalletConfig, WalletError,
    BOOTSTRAP_SEED,
};
use std::sync::Arc;
use std::time::Duration;

fn fast(network: NetworkConfig) -> WalletConfig {
    WalletConfig::new(network)
        .with_sync_throttle(Duration::from_millis(10))
        .with_funds_throttle(Duration::from_millis(20))
        .with_wait_deadline(Duration::from_secs(5))
}

fn orchestrator(ledger: &Arc<SimLedger>, config: WalletConfig) -> Orchestrator<SimLedger, SimLedger> {
    Orchestrator::new(ledger.clone(), ledger.clone(), config)
}

fn seed(byte: u8) -> SeedMaterial {
    SeedMaterial::from_bytes(&[byte; 32]).expect("seed")
}

/// Test: fresh wallet on a dev network receives primary and resource funds
#[tokio::test]
async fn fresh_wallet_is_auto_funded() {
    let ledger = Arc::new(SimLedger::dev_network().expect("ledger"));
    let config = fast(NetworkConfig::local());
    let amount = config.funding_amount;
    let orch = orchestrator(&ledger, config);

    let (session, report) = orch.bootstrap_funded(&seed(42), &BOOTSTRAP_SEED).await.expect("funded");

    assert!(report.funding_tx.is_some());
    assert!(report.generation_tx.is_some());
    assert_eq!(report.primary, amount);
    assert!(report.resource > 0);
    assert_eq!(ledger.balance(&session.address(), &TokenKind::Primary).unwrap(), amount);
    assert_eq!(ledger.submitted().unwrap().len(), 2);

    // Bootstrap session is gone, ours is still running
    assert_eq!(ledger.running_wallets().unwrap(), 3);
    session.stop().await.expect("stop");
    assert_eq!(ledger.running_wallets().unwrap(), 0);
}

/// Test: funded wallet returns immediately with zero transport calls
#[tokio::test]
async fn funded_wallet_skips_transport() {
    let ledger = Arc::new(SimLedger::new());
    let seed = seed(7);
    let keys = derive_from_seed(&seed).expect("keys");
    ledger.credit(keys.public_pool().address(), TokenKind::Primary, 5_000).unwrap();
    ledger
        .grant_resources(
            keys.resource_pool().address(),
            ResourceBalance { accrued: 10, rate_per_sec: 0, as_of: Utc::now(), cap: 10 },
        )
        .unwrap();

    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));
    let session = orch.bootstrap_from(&seed).await.expect("bootstrap");
    let report = orch.ensure_funded(&session, &BOOTSTRAP_SEED).await.expect("funded");

    assert!(!report.transport_calls_made());
    assert_eq!(report.primary, 5_000);
    assert_eq!(report.resource, 10);
    assert_eq!(ledger.calls().unwrap().total(), 0);
    session.stop().await.expect("stop");
}

/// Test: fee not covered by the base change is paid by a balancing transaction
#[tokio::test]
async fn transfer_spills_fee_into_balancing() {
    let ledger = Arc::new(SimLedger::new());
    let seed = seed(8);
    let keys = derive_from_seed(&seed).expect("keys");
    ledger.credit(keys.public_pool().address(), TokenKind::Primary, 500).unwrap();
    ledger.credit(keys.public_pool().address(), TokenKind::Primary, 5_000).unwrap();

    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));
    let session = orch.bootstrap_from(&seed).await.expect("bootstrap");

    let payee = Address([7; 32]);
    let output = Output { receiver: payee, token: TokenKind::Primary, value: 500 };
    let ttl = expiry(Utc::now(), orch.config().transfer_ttl);
    orch.assembler().assemble_and_submit_transfer(&session, vec![output], ttl).await.expect("transfer");

    assert_eq!(ledger.balance(&payee, &TokenKind::Primary).unwrap(), 500);
    assert_eq!(
        ledger.balance(&session.address(), &TokenKind::Primary).unwrap(),
        5_000 - DEFAULT_FEE
    );
    let calls = ledger.calls().unwrap();
    assert_eq!((calls.build_transfer, calls.balance, calls.finalize, calls.submit), (1, 1, 1, 1));
    session.stop().await.expect("stop");
}

/// Test: transfer larger than the wallet holds fails in the transport and changes nothing
#[tokio::test]
async fn overspend_is_rejected() {
    let ledger = Arc::new(SimLedger::new());
    let seed = seed(9);
    let keys = derive_from_seed(&seed).expect("keys");
    ledger.credit(keys.public_pool().address(), TokenKind::Primary, 1_000).unwrap();

    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));
    let session = orch.bootstrap_from(&seed).await.expect("bootstrap");
    let output = Output { receiver: Address([1; 32]), token: TokenKind::Primary, value: 10_000 };
    let ttl = expiry(Utc::now(), orch.config().transfer_ttl);

    let err = orch.assembler().assemble_and_submit_transfer(&session, vec![output], ttl).await.unwrap_err();
    assert!(matches!(err, WalletError::Transport(_)));
    assert!(err.to_string().contains("insufficient"));
    assert_eq!(ledger.balance(&session.address(), &TokenKind::Primary).unwrap(), 1_000);
    assert!(ledger.submitted().unwrap().is_empty());
    session.stop().await.expect("stop");
}

/// Test: identity registration is submitted and the fee comes from the public pool
#[tokio::test]
async fn identity_call_is_submitted() {
    use kycnode::identity::{self, Pii};

    let ledger = Arc::new(SimLedger::new());
    let seed = seed(16);
    let keys = derive_from_seed(&seed).expect("keys");
    ledger.credit(keys.public_pool().address(), TokenKind::Primary, 5_000).unwrap();

    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));
    let session = orch.bootstrap_from(&seed).await.expect("bootstrap");
    let payload = Pii::new("Test Person", 1990, "India").payload(2025).expect("payload");
    let call = identity::register(&payload, session.address()).expect("call");
    let ttl = expiry(Utc::now(), orch.config().transfer_ttl);

    let id = orch.assembler().assemble_and_submit_call(&session, vec![call.clone()], ttl).await.expect("submit");

    assert_eq!(ledger.submitted().unwrap(), vec![id]);
    assert_eq!(ledger.contract_calls().unwrap(), vec![call]);
    assert_eq!(ledger.balance(&session.address(), &TokenKind::Primary).unwrap(), 5_000 - DEFAULT_FEE);
    session.stop().await.expect("stop");
}

/// Test: contract call without funds for the fee is rejected before submission
#[tokio::test]
async fn unfunded_call_is_rejected() {
    use kycnode::identity::{self, Pii};

    let ledger = Arc::new(SimLedger::new());
    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));
    let session = orch.bootstrap_from(&seed(17)).await.expect("bootstrap");
    let payload = Pii::new("Test Person", 1990, "India").payload(2025).expect("payload");
    let call = identity::prove_age_eligible(&payload, session.address(), 2025).expect("call");
    let ttl = expiry(Utc::now(), orch.config().transfer_ttl);

    let err = orch.assembler().assemble_and_submit_call(&session, vec![call], ttl).await.unwrap_err();
    assert!(matches!(err, WalletError::Transport(_)));
    assert!(ledger.contract_calls().unwrap().is_empty());
    assert_eq!(ledger.calls().unwrap().submit, 0);
    session.stop().await.expect("stop");
}

/// Test: resource generation over zero coins is still signable and submits
#[tokio::test]
async fn zero_coin_generation_submits() {
    let ledger = Arc::new(SimLedger::new());
    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));
    let session = orch.bootstrap_from(&seed(10)).await.expect("bootstrap");

    let now = Utc::now();
    let request = ResourceGenerationRequest {
        valid_from: now,
        valid_until: expiry(now, Duration::from_secs(600)),
        coins: vec![],
        public_key: session.public_key(),
        receiver: session.resource_address(),
    };
    let id = orch.assembler().assemble_and_submit_resource_generation(&session, request).await.expect("generation");

    assert_eq!(ledger.submitted().unwrap(), vec![id]);
    assert_eq!(ledger.calls().unwrap().build_resource_generation, 1);
    session.stop().await.expect("stop");
}

/// Test: sync that never completes times out and leaves nothing running
#[tokio::test]
async fn unsynced_bootstrap_times_out_and_stops() {
    let ledger = Arc::new(SimLedger::new());
    ledger.set_withhold_sync(true).unwrap();
    let config = fast(NetworkConfig::local()).with_wait_deadline(Duration::from_millis(200));
    let orch = orchestrator(&ledger, config);

    let err = orch.bootstrap_from(&seed(11)).await.unwrap_err();
    assert!(matches!(err, WalletError::WaitTimeout(_)));
    assert!(err.is_transient());
    assert_eq!(ledger.running_wallets().unwrap(), 0);
    assert_eq!(ledger.subscriber_count().unwrap(), 0);
}

/// Test: sub-wallet start failure surfaces as a transport error
#[tokio::test]
async fn rejected_start_fails_bootstrap() {
    let ledger = Arc::new(SimLedger::new());
    ledger.set_reject_start(true).unwrap();
    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));

    let err = orch.bootstrap_from(&seed(12)).await.unwrap_err();
    assert!(matches!(err, WalletError::Transport(_)));
    assert_eq!(ledger.running_wallets().unwrap(), 0);
}

/// Test: bootstrap session used for funding is stopped even when submission fails
#[tokio::test]
async fn failed_funding_stops_every_session() {
    let ledger = Arc::new(SimLedger::dev_network().expect("ledger"));
    ledger.set_reject_submit(true).unwrap();
    let orch = orchestrator(&ledger, fast(NetworkConfig::local()));

    let target = FundingTarget { address: Address([5; 32]), amount: 1_000, token: TokenKind::Primary };
    let err = orch.fund(&BOOTSTRAP_SEED, &target).await.unwrap_err();
    assert!(err.to_string().contains("rejected"));
    assert_eq!(ledger.running_wallets().unwrap(), 0);

    let err = orch.bootstrap_funded(&seed(13), &BOOTSTRAP_SEED).await.unwrap_err();
    assert!(matches!(err, WalletError::Transport(_)));
    assert_eq!(ledger.running_wallets().unwrap(), 0);
}

/// Test: network without auto-funding waits, then times out with no transport use
#[tokio::test]
async fn non_local_network_waits_for_funds() {
    let ledger = Arc::new(SimLedger::dev_network().expect("ledger"));
    let config = fast(NetworkConfig::preprod()).with_wait_deadline(Duration::from_millis(300));
    let orch = orchestrator(&ledger, config);
    let session = orch.bootstrap_from(&seed(14)).await.expect("bootstrap");

    let err = orch.ensure_funded(&session, &BOOTSTRAP_SEED).await.unwrap_err();
    assert!(matches!(err, WalletError::WaitTimeout(_)));
    assert_eq!(ledger.calls().unwrap().total(), 0);
    session.stop().await.expect("stop");
}

/// Test: external funds arriving later resolve the wait
#[tokio::test]
async fn external_funds_resolve_wait() {
    let ledger = Arc::new(SimLedger::new());
    let orch = orchestrator(&ledger, fast(NetworkConfig::preprod()));
    let seed = seed(15);
    let keys = derive_from_seed(&seed).expect("keys");
    let session = orch.bootstrap_from(&seed).await.expect("bootstrap");

    let faucet = ledger.clone();
    let public = keys.public_pool().address();
    let resource = keys.resource_pool().address();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        faucet.credit(public, TokenKind::Primary, 77).unwrap();
        faucet
            .grant_resources(resource, ResourceBalance { accrued: 3, rate_per_sec: 0, as_of: Utc::now(), cap: 3 })
            .unwrap();
    });

    let report = orch.ensure_funded(&session, &BOOTSTRAP_SEED).await.expect("funded");
    assert_eq!(report.primary, 77);
    assert_eq!(report.resource, 3);
    assert!(!report.transport_calls_made());
    session.stop().await.expect("stop");
}
