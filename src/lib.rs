//! kycnode: wallet-side co-signing and synchronization core for a
//! privacy-preserving ledger with a KYC contract.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (entry point)
//!   │
//!   ├── keys        seed → PublicPool / ResourcePool / ConfidentialPool keys
//!   │
//!   ├── sync        three sub-wallet streams → WalletSession
//!   │     └── wait  throttle + wait_for / wait_until
//!   │
//!   ├── assembler   Draft → Balanced → Signed → Finalized → Submitted
//!   │     └── tx    segments, intents, offers, sign_intents
//!   │
//!   └── transport   node / indexer / proof server boundary (trait)
//!         └── sim   in-memory ledger for tests and the demo
//! ```
//!
//! # Features
//!
//! - `native` - CLI binary and `tracing-subscriber` logging setup
//!
//! # Usage
//!
//! ```ignore
//! use kycnode::{Orchestrator, SimLedger, WalletConfig, BOOTSTRAP_SEED};
//!
//! let ledger = Arc::new(SimLedger::dev_network()?);
//! let orchestrator = Orchestrator::new(ledger.clone(), ledger, WalletConfig::default());
//!
//! let session = orchestrator.bootstrap(&seed).await?;
//! let report = orchestrator.ensure_funded(&session, &BOOTSTRAP_SEED).await?;
//! session.stop().await?;
//! ```

pub mod assembler;
pub mod config;
pub mod core;
pub mod error;
pub mod identity;
pub mod keys;
pub mod orchestrator;
pub mod runtime;
pub mod sim;
pub mod sync;
pub mod transport;
pub mod tx;

#[cfg(feature = "native")]
pub mod logging;

pub use assembler::TransactionAssembler;
pub use config::{NetworkConfig, NetworkId, WalletConfig};
pub use error::{WalletError, WalletResult};
pub use keys::{derive, derive_from_seed, DerivedKeySet, Role, SeedMaterial, Signer};
pub use orchestrator::{FundingReport, FundingTarget, Orchestrator, BOOTSTRAP_SEED};
pub use runtime::{install_signal_handlers, Shutdown};
pub use sim::SimLedger;
pub use sync::{WalletConnector, WalletSession, WalletState};
pub use transport::Transport;
pub use tx::{sign_intents, ProofState, Transaction, TransactionRecipe};
