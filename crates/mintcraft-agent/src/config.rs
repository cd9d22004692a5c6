//! Configuration for the MintCraft CLI
//!
//! Uses `BaseConfig` from `mintcraft-agent-logic` and adds the checks only
//! the signing commands need.

use anyhow::{Context, Result};
use std::path::Path;

use mintcraft_agent_logic::config::BaseConfig;

/// Load configuration from .env + agent.toml
pub fn load<P: AsRef<Path>>(agent_toml_path: P) -> Result<BaseConfig> {
    BaseConfig::load(agent_toml_path)
}

/// Base58 wallet key required for any command that signs
pub fn wallet_key(config: &BaseConfig) -> Result<&str> {
    config
        .wallet_private_key
        .as_deref()
        .context("WALLET_PRIVATE_KEY env var is required (run `mintcraft generate-keypair`)")
}
