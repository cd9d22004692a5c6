//! Base configuration for the MintCraft agent
//!
//! Assembled from two sources:
//! 1. `.env` / process env: endpoints, wallet key, explorer
//! 2. `agent.toml`: timeouts, commitment, journal, mint and marketplace defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ledger::{Commitment, LedgerRpcConfig};
use crate::rpc_client::AuthorityRpcConfig;
use crate::session::MintDefaults;

// ============================================================================
// Agent TOML (agent.toml)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentToml {
    #[serde(default = "default_finality_timeout_secs")]
    finality_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_commitment")]
    commitment: Commitment,
    #[serde(default = "default_journal_path")]
    journal_path: PathBuf,
    #[serde(default = "default_require_approval")]
    require_approval: bool,
    #[serde(default)]
    mint: MintToml,
    #[serde(default)]
    marketplace: MarketplaceToml,
}

/// `[mint]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintToml {
    #[serde(default = "default_mint_name")]
    pub name: String,
    #[serde(default = "default_mint_symbol")]
    pub symbol: String,
    #[serde(default = "default_royalty_percentage")]
    pub royalty_percentage: u8,
}

impl Default for MintToml {
    fn default() -> Self {
        Self {
            name: default_mint_name(),
            symbol: default_mint_symbol(),
            royalty_percentage: default_royalty_percentage(),
        }
    }
}

/// `[marketplace]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceToml {
    #[serde(default = "default_marketplace_id")]
    pub marketplace_id: u64,
}

impl Default for MarketplaceToml {
    fn default() -> Self {
        Self {
            marketplace_id: default_marketplace_id(),
        }
    }
}

// ============================================================================
// BaseConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct BaseConfig {
    // From env
    pub authority_url: String,
    pub ledger_rpc_url: String,
    pub wallet_private_key: Option<String>,
    pub explorer_url: String,
    pub ledger_cluster: String,

    // From agent.toml
    pub finality_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub commitment: Commitment,
    pub journal_path: PathBuf,
    pub require_approval: bool,
    pub mint: MintToml,
    pub marketplace: MarketplaceToml,
}

impl BaseConfig {
    /// Load configuration from the process env and `agent.toml`.
    ///
    /// A missing `agent.toml` falls back to defaults.
    pub fn load<P: AsRef<Path>>(agent_toml_path: P) -> Result<Self> {
        let path = agent_toml_path.as_ref();
        let agent_toml_str = if path.exists() {
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            tracing::warn!("{} not found, using default agent settings", path.display());
            String::new()
        };
        Self::from_sources(&agent_toml_str, |key| std::env::var(key).ok())
            .with_context(|| format!("Invalid configuration ({})", path.display()))
    }

    /// Build from `agent.toml` contents and an env lookup
    pub fn from_sources(agent_toml: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let agent: AgentToml = toml::from_str(agent_toml).context("Failed to parse agent.toml")?;

        let authority_url = env("MINTCRAFT_AUTHORITY_URL")
            .ok_or_else(|| anyhow!("MINTCRAFT_AUTHORITY_URL env var is required"))?;
        let ledger_rpc_url =
            env("LEDGER_RPC_URL").ok_or_else(|| anyhow!("LEDGER_RPC_URL env var is required"))?;
        let wallet_private_key = env("WALLET_PRIVATE_KEY").filter(|k| !k.trim().is_empty());
        let explorer_url =
            env("EXPLORER_URL").unwrap_or_else(|| "https://explorer.solana.com".to_string());
        let ledger_cluster = env("LEDGER_CLUSTER").unwrap_or_else(|| "devnet".to_string());

        anyhow::ensure!(
            agent.mint.royalty_percentage <= 100,
            "mint.royalty_percentage must be at most 100, got {}",
            agent.mint.royalty_percentage
        );
        anyhow::ensure!(agent.finality_timeout_secs > 0, "finality_timeout_secs must be positive");

        Ok(BaseConfig {
            authority_url,
            ledger_rpc_url,
            wallet_private_key,
            explorer_url,
            ledger_cluster,
            finality_timeout_secs: agent.finality_timeout_secs,
            poll_interval_ms: agent.poll_interval_ms,
            request_timeout_secs: agent.request_timeout_secs,
            commitment: agent.commitment,
            journal_path: agent.journal_path,
            require_approval: agent.require_approval,
            mint: agent.mint,
            marketplace: agent.marketplace,
        })
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.finality_timeout_secs)
    }

    pub fn authority_config(&self) -> AuthorityRpcConfig {
        let mut cfg = AuthorityRpcConfig::new(self.authority_url.clone());
        cfg.timeout = Duration::from_secs(self.request_timeout_secs);
        cfg
    }

    pub fn ledger_config(&self) -> LedgerRpcConfig {
        LedgerRpcConfig {
            rpc_url: self.ledger_rpc_url.clone(),
            timeout_ms: self.request_timeout_secs * 1000,
            poll_interval_ms: self.poll_interval_ms,
            commitment: self.commitment,
        }
    }

    pub fn mint_defaults(&self) -> MintDefaults {
        MintDefaults {
            name: self.mint.name.clone(),
            symbol: self.mint.symbol.clone(),
            royalty_percentage: self.mint.royalty_percentage,
        }
    }

    /// Explorer page for a transaction on the configured cluster
    pub fn explorer_tx_url(&self, signature: &str) -> String {
        format!(
            "{}/tx/{}?cluster={}",
            self.explorer_url.trim_end_matches('/'),
            signature,
            self.ledger_cluster
        )
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Decode base58 Ed25519 public key to 32 bytes
pub fn decode_public_key(base58_key: &str) -> Result<[u8; 32]> {
    let key_bytes = bs58::decode(base58_key)
        .into_vec()
        .context("Invalid base58 public key")?;

    if key_bytes.len() != 32 {
        anyhow::bail!(
            "Public key must be exactly 32 bytes, got {}",
            key_bytes.len()
        );
    }

    let mut arr = [0u8; 32];
    arr.copy_from_slice(&key_bytes);
    Ok(arr)
}

/// Decode base58 Ed25519 private key to 32-byte seed
///
/// Accepts a bare seed or the 64-byte seed+pubkey keypair form.
pub fn decode_private_key(base58_key: &str) -> Result<[u8; 32]> {
    let key_bytes = bs58::decode(base58_key.trim())
        .into_vec()
        .context("Invalid base58 private key")?;

    if key_bytes.len() < 32 {
        anyhow::bail!(
            "Private key too short: expected at least 32 bytes, got {}",
            key_bytes.len()
        );
    }

    let mut arr = [0u8; 32];
    arr.copy_from_slice(&key_bytes[..32]);
    Ok(arr)
}

// ============================================================================
// Defaults
// ============================================================================

fn default_finality_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_commitment() -> Commitment {
    Commitment::Finalized
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("mintcraft-journal.json")
}

fn default_require_approval() -> bool {
    true
}

fn default_mint_name() -> String {
    "AI Generated NFT".to_string()
}

fn default_mint_symbol() -> String {
    "AIGENNFT".to_string()
}

fn default_royalty_percentage() -> u8 {
    3
}

fn default_marketplace_id() -> u64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("MINTCRAFT_AUTHORITY_URL", "http://localhost:4000/trpc"),
            ("LEDGER_RPC_URL", "https://api.devnet.solana.com"),
        ]
    }

    #[test]
    fn test_decode_private_key() {
        let base58 = "EB92Q6V2a78t9ppqMuKLppyfzFgyYJciQEVHZKnXAhjEwVpx9aMbQN84SR4ceo3mbLUxQF7TLzaEujaTJnS7eRF";
        let bytes = decode_private_key(base58).unwrap();
        assert_eq!(bytes.len(), 32);
        assert!(decode_private_key("abc").is_err());
        assert!(decode_public_key("So11111111111111111111111111111111111111112").is_ok());
    }

    #[test]
    fn test_agent_toml_defaults() {
        let agent: AgentToml = toml::from_str("").unwrap();
        assert_eq!(agent.finality_timeout_secs, 60);
        assert_eq!(agent.poll_interval_ms, 500);
        assert_eq!(agent.request_timeout_secs, 30);
        assert_eq!(agent.commitment, Commitment::Finalized);
        assert_eq!(agent.journal_path, PathBuf::from("mintcraft-journal.json"));
        assert!(agent.require_approval);
        assert_eq!(agent.mint.symbol, "AIGENNFT");
        assert_eq!(agent.mint.royalty_percentage, 3);
        assert_eq!(agent.marketplace.marketplace_id, 1);
    }

    #[test]
    fn test_from_sources_overrides() {
        let toml_str = r#"
            finality_timeout_secs = 90
            commitment = "confirmed"
            require_approval = false

            [mint]
            name = "Fox"
            royalty_percentage = 7

            [marketplace]
            marketplace_id = 4
        "#;
        let mut vars = required();
        vars.push(("LEDGER_CLUSTER", "mainnet-beta"));
        let cfg = BaseConfig::from_sources(toml_str, env(&vars)).unwrap();

        assert_eq!(cfg.finality_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.ledger_config().commitment, Commitment::Confirmed);
        assert_eq!(cfg.ledger_config().timeout_ms, 30_000);
        assert!(!cfg.require_approval);
        assert_eq!(
            cfg.mint_defaults(),
            MintDefaults {
                name: "Fox".into(),
                symbol: "AIGENNFT".into(),
                royalty_percentage: 7
            }
        );
        assert_eq!(cfg.marketplace.marketplace_id, 4);
        assert!(cfg.wallet_private_key.is_none());
        assert_eq!(
            cfg.explorer_tx_url("sig"),
            "https://explorer.solana.com/tx/sig?cluster=mainnet-beta"
        );
    }

    #[test]
    fn test_missing_required_env() {
        let err = BaseConfig::from_sources("", env(&[("LEDGER_RPC_URL", "x")])).unwrap_err();
        assert!(err.to_string().contains("MINTCRAFT_AUTHORITY_URL"));
    }

    #[test]
    fn test_royalty_bound() {
        let err = BaseConfig::from_sources("[mint]\nroyalty_percentage = 150", env(&required()));
        assert!(err.is_err());
    }
}
