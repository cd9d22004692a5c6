//! Remote authority boundary
//!
//! The remote authority issues unsigned transactions in phase 1 and records
//! the confirmed outcome in phase 4. Pricing, royalties and NFT metadata are
//! its business; the coordinator only sees this trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{OperationKind, OperationParams, PendingId, SettlementResult};

/// Phase-1 answer from the remote authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginResponse {
    /// The precondition this operation would establish already holds
    AlreadySatisfied,
    /// A transaction must be signed and submitted before settlement
    Pending {
        pending_id: PendingId,
        unsigned_transaction: Vec<u8>,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    /// Structured error returned by the authority itself
    #[error("{procedure} rejected ({code}): {message}")]
    Rejected {
        procedure: String,
        code: String,
        message: String,
    },
    #[error("decode error: {0}")]
    Decode(String),
}

/// Typed request/response channel to the remote authority
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Phase 1: request the unsigned transaction for `params`
    async fn begin(&self, params: &OperationParams) -> Result<BeginResponse, AuthorityError>;

    /// Phase 4: report the ledger signature and obtain the business result
    async fn confirm(
        &self,
        kind: OperationKind,
        pending_id: &PendingId,
        signature: &str,
    ) -> Result<SettlementResult, AuthorityError>;
}
