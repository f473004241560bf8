//! Credits Wallet
//!
//! Proof ledger and reconciliation engine for bearer-token credits: small
//! fixed-denomination tokens ("proofs") redeemable at an issuer and spent to
//! pay per use for metered content.
//!
//! ## Components
//!
//! - [`ProofSelector`]: chooses which proofs cover a payment
//! - [`WalletCore`]: holds the proof set; intake, token creation, swaps
//! - [`ReconciliationService`]: asks the issuer which proofs are spent
//! - [`SyncEngine`]: merges state with the owner's other devices
//! - [`HistoryLedger`]: encrypted log of value movements
//! - [`ProofStore`]: persistence boundary, with memory and file backends
//!
//! ## Safety Model
//!
//! - Proofs are bearer instruments; every transition replaces the whole set
//! - Selected proofs leave the held set before the token is returned
//! - A failed swap never removes value from the wallet
//! - Issuer outages never mark proofs as spent

pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod history;
pub mod issuer;
pub mod proof;
pub mod reconcile;
pub mod seal;
pub mod selection;
pub mod sink;
pub mod store;
pub mod sync;
pub mod wallet;

pub use config::WalletConfig;
pub use error::{CreationDiagnostics, ErrorCode, ValidationError, WalletError, WalletResult};
pub use events::{EventBroadcaster, WalletEvent};
pub use feed::{FeedScope, MemoryFeed, RemoteEvent, RemoteFeed, RemoteRecord};
pub use history::{Direction, HistoryLedger, SpendingRecord};
pub use issuer::{HttpIssuer, ProofState, StateCheck, SwapOutput, SwapService};
pub use proof::{Proof, Token};
pub use reconcile::{ProofCheck, ReconciliationService};
pub use seal::SealingKey;
pub use selection::{ExactMatchLimits, ProofSelector, Selection, SelectionStrategy};
pub use sink::{DiagnosticSink, MemorySink, TracingSink};
pub use store::{FileStore, MemoryStore, ProofStore};
pub use sync::{KeepLocalUnion, MergePolicy, RemoteWins, SubscriptionState, SyncEngine, SyncOutcome};
pub use wallet::{CreatedToken, WalletCore, WalletSettings};
