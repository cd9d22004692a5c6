//! Checks that run before phase 1
//!
//! A failure here means no collaborator was contacted.

use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;
use crate::signer::WalletSigner;
use crate::types::OperationParams;

pub const MAX_PROMPT_CHARS: usize = 500;

/// Entry of the authority's AI model catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModel {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub royalty_percentage: Option<u8>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

pub fn validate_prompt(prompt: &str) -> Result<(), PreconditionError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(PreconditionError::EmptyPrompt);
    }
    let len = trimmed.chars().count();
    if len > MAX_PROMPT_CHARS {
        return Err(PreconditionError::PromptTooLong {
            len,
            max: MAX_PROMPT_CHARS,
        });
    }
    Ok(())
}

/// Resolve the selected model against the catalog
pub fn validate_model(
    selected: Option<u64>,
    catalog: &[AiModel],
) -> Result<AiModel, PreconditionError> {
    let id = selected.ok_or(PreconditionError::NoModelSelected)?;
    let model = catalog
        .iter()
        .find(|m| m.id == id)
        .ok_or(PreconditionError::UnknownModel(id))?;
    if !model.is_active {
        return Err(PreconditionError::InactiveModel(id));
    }
    Ok(model.clone())
}

/// Connected wallet address
pub fn validate_wallet(signer: &dyn WalletSigner) -> Result<String, PreconditionError> {
    signer
        .public_key()
        .filter(|k| !k.is_empty())
        .ok_or(PreconditionError::WalletDisconnected)
}

fn is_base58_pubkey(s: &str) -> bool {
    bs58::decode(s)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

pub fn validate_params(params: &OperationParams) -> Result<(), PreconditionError> {
    let invalid = |msg: &str| Err(PreconditionError::InvalidParams(msg.to_string()));
    match params {
        OperationParams::ConfigInit { .. } => Ok(()),
        OperationParams::ContentGeneration(req) => {
            validate_prompt(&req.prompt)?;
            if req.name.trim().is_empty() {
                return invalid("content name is empty");
            }
            Ok(())
        }
        OperationParams::NftMint(req) => {
            if req.name.trim().is_empty() {
                return invalid("NFT name is empty");
            }
            if req.symbol.trim().is_empty() {
                return invalid("NFT symbol is empty");
            }
            if req.royalty_percentage > 100 {
                return invalid("royalty percentage exceeds 100");
            }
            Ok(())
        }
        OperationParams::NftListing(req) => {
            if req.price == 0 {
                return invalid("price must be greater than zero");
            }
            if !is_base58_pubkey(&req.mint_address) {
                return invalid("mint address is not a base58 public key");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentRequest, ListingRequest, MintRequest};

    fn catalog() -> Vec<AiModel> {
        serde_json::from_value(serde_json::json!([
            { "id": 1, "name": "sdxl", "royaltyPercentage": 5, "isActive": true },
            { "id": 2, "name": "legacy", "isActive": false },
            { "id": 3, "name": "flux" }
        ]))
        .unwrap()
    }

    #[test]
    fn prompt_bounds() {
        assert_eq!(validate_prompt("   "), Err(PreconditionError::EmptyPrompt));
        assert!(validate_prompt("a cat").is_ok());
        assert!(validate_prompt(&"x".repeat(MAX_PROMPT_CHARS)).is_ok());
        assert_eq!(
            validate_prompt(&"é".repeat(MAX_PROMPT_CHARS + 1)),
            Err(PreconditionError::PromptTooLong {
                len: MAX_PROMPT_CHARS + 1,
                max: MAX_PROMPT_CHARS
            })
        );
    }

    #[test]
    fn model_selection() {
        let models = catalog();
        assert_eq!(validate_model(None, &models), Err(PreconditionError::NoModelSelected));
        assert_eq!(validate_model(Some(9), &models), Err(PreconditionError::UnknownModel(9)));
        assert_eq!(validate_model(Some(2), &models), Err(PreconditionError::InactiveModel(2)));
        assert_eq!(validate_model(Some(1), &models).unwrap().royalty_percentage, Some(5));
        assert!(validate_model(Some(3), &models).unwrap().is_active);
    }

    #[test]
    fn params_checks() {
        assert!(validate_params(&OperationParams::ContentGeneration(ContentRequest::image(1, ""))).is_err());

        let mut mint = MintRequest {
            content_id: 1,
            name: "Cat".into(),
            symbol: "CAT".into(),
            royalty_percentage: 101,
        };
        assert!(validate_params(&OperationParams::NftMint(mint.clone())).is_err());
        mint.royalty_percentage = 5;
        assert!(validate_params(&OperationParams::NftMint(mint)).is_ok());

        let listing = ListingRequest {
            marketplace_id: 1,
            mint_address: "So11111111111111111111111111111111111111112".into(),
            price: 0,
        };
        assert!(validate_params(&OperationParams::NftListing(listing.clone())).is_err());
        let priced = ListingRequest { price: 10, ..listing };
        assert!(validate_params(&OperationParams::NftListing(priced.clone())).is_ok());
        let bad_mint = ListingRequest { mint_address: "not-a-key".into(), ..priced };
        assert!(validate_params(&OperationParams::NftListing(bad_mint)).is_err());
    }
}
