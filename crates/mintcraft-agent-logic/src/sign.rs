//! Local Ed25519 wallet
//!
//! `KeypairWallet` stands in for a browser wallet when the agent runs
//! headless: it finds its own slot in the transaction frame, signs the
//! message bytes and writes the signature back. With approval enabled every
//! signature waits on a terminal y/N prompt.

use anyhow::Result;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use tracing::{debug, info};

use crate::config::decode_private_key;
use crate::confirm::{approve_on_terminal, ConfirmLock};
use crate::signer::{SignerError, WalletSigner};
use crate::wire::{TransactionFrame, WireError};

pub struct KeypairWallet {
    signing_key: SigningKey,
    public_key: String,
    approval: Option<ConfirmLock>,
}

impl KeypairWallet {
    pub fn new(signing_key: SigningKey) -> Self {
        let public_key = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();
        Self {
            signing_key,
            public_key,
            approval: None,
        }
    }

    /// Load from a base58 key (32-byte seed or 64-byte keypair)
    pub fn from_base58(private_key: &str) -> Result<Self> {
        let seed = decode_private_key(private_key)?;
        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    /// Require terminal approval before each signature
    pub fn with_approval(mut self, lock: ConfirmLock) -> Self {
        self.approval = Some(lock);
        self
    }

    pub fn address(&self) -> &str {
        &self.public_key
    }

    fn sign_frame(&self, unsigned_transaction: &[u8]) -> Result<Vec<u8>, SignerError> {
        let frame = TransactionFrame::parse(unsigned_transaction)
            .map_err(|e| SignerError::Malformed(e.to_string()))?;
        let pubkey = self.signing_key.verifying_key().to_bytes();
        let index = frame
            .signer_index(&pubkey)
            .ok_or_else(|| {
                SignerError::Malformed(WireError::NotASigner(self.public_key.clone()).to_string())
            })?;
        let signature = self.signing_key.sign(frame.message());
        debug!(slot = index, "filled signature slot");
        Ok(frame.with_signature(index, &signature.to_bytes()))
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn public_key(&self) -> Option<String> {
        Some(self.public_key.clone())
    }

    async fn sign(&self, unsigned_transaction: &[u8]) -> Result<Vec<u8>, SignerError> {
        if let Some(lock) = &self.approval {
            let details = format!("{} bytes for {}", unsigned_transaction.len(), self.public_key);
            approve_on_terminal(lock, "sign transaction", &details).await?;
            info!("transaction approved on terminal");
        }
        self.sign_frame(unsigned_transaction)
    }
}

/// Generate a new Ed25519 keypair. Returns (private_key_base58, public_key_base58).
pub fn generate_keypair() -> (String, String) {
    use rand::rngs::OsRng;

    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    // 64-byte keypair form: seed followed by public key
    let mut keypair_bytes = [0u8; 64];
    keypair_bytes[..32].copy_from_slice(signing_key.as_bytes());
    keypair_bytes[32..].copy_from_slice(verifying_key.as_bytes());
    let private_key_b58 = bs58::encode(&keypair_bytes).into_string();
    let public_key_b58 = bs58::encode(verifying_key.as_bytes()).into_string();

    (private_key_b58, public_key_b58)
}
