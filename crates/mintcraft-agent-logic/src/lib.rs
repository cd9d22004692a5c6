//! MintCraft Agent Logic - transaction lifecycle for AI content and NFT operations
//!
//! Every user action that moves value runs the same four-phase protocol:
//! the remote authority begins the operation and returns an unsigned
//! transaction, the wallet signs it, the ledger accepts and finalizes it,
//! and the authority settles the result.
//!
//! Key components:
//! - `OperationCoordinator`: drives one operation through the state machine
//! - `UserSession`: flow-level entry points with config prerequisites and
//!   the one-in-flight-per-kind guard
//! - `AuthorityRpcClient` / `JsonRpcLedger`: HTTP collaborators
//! - `KeypairWallet`: local Ed25519 signer with optional terminal approval
//! - `ReconciliationJournal`: durable record of operations that may have
//!   moved funds without settling

pub mod authority;
pub mod config;
pub mod confirm;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod precondition;
pub mod reconcile;
pub mod rpc_client;
pub mod session;
pub mod sign;
pub mod signer;
pub mod types;
pub mod wire;

#[cfg(test)]
mod test_support;
