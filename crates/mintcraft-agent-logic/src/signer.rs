//! Wallet signer boundary
//!
//! The wallet holds the user's private key. Signing waits on a human, so the
//! call may take arbitrarily long or never resolve; callers race it against
//! a cancellation token instead of timing it out.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("user rejected the request: {0}")]
    Rejected(String),
    #[error("malformed transaction: {0}")]
    Malformed(String),
    #[error("wallet error: {0}")]
    Other(String),
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Base58 public key of the connected account, `None` when disconnected
    fn public_key(&self) -> Option<String>;

    /// Sign an unsigned transaction blob and return the signed blob
    async fn sign(&self, unsigned_transaction: &[u8]) -> Result<Vec<u8>, SignerError>;

    fn is_connected(&self) -> bool {
        self.public_key().is_some()
    }
}
