//! Shared types for the pending-operation protocol
//!
//! Contains the operation kinds, per-kind parameters and settlement results,
//! and the `PendingOperation` state record driven by the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OperationError;

/// Value-bearing action a pending operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    ConfigInit,
    ContentGeneration,
    NftMint,
    NftListing,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ConfigInit,
        OperationKind::ContentGeneration,
        OperationKind::NftMint,
        OperationKind::NftListing,
    ];
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::ConfigInit => write!(f, "CONFIG_INIT"),
            OperationKind::ContentGeneration => write!(f, "CONTENT_GENERATION"),
            OperationKind::NftMint => write!(f, "NFT_MINT"),
            OperationKind::NftListing => write!(f, "NFT_LISTING"),
        }
    }
}

/// Lifecycle state of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// Created locally, phase 1 not yet answered
    Created,
    /// Unsigned transaction received, waiting on the wallet
    AwaitingSignature,
    /// Signed transaction broadcast to the ledger
    Submitted,
    /// Waiting for ledger finality
    Confirming,
    /// Remote authority acknowledged the outcome
    Settled,
    /// Stopped; see the recorded error
    Failed,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Settled | OperationState::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            OperationState::Created => 0,
            OperationState::AwaitingSignature => 1,
            OperationState::Submitted => 2,
            OperationState::Confirming => 3,
            OperationState::Settled => 4,
            OperationState::Failed => 5,
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only machine.
    ///
    /// FAILED is reachable from every non-terminal state. SETTLED is reachable
    /// from CREATED (already-satisfied short-circuit) and from CONFIRMING.
    pub fn can_advance_to(&self, next: OperationState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            OperationState::Failed => true,
            OperationState::Settled => {
                matches!(self, OperationState::Created | OperationState::Confirming)
            }
            OperationState::Created => false,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Created => write!(f, "CREATED"),
            OperationState::AwaitingSignature => write!(f, "AWAITING_SIGNATURE"),
            OperationState::Submitted => write!(f, "SUBMITTED"),
            OperationState::Confirming => write!(f, "CONFIRMING"),
            OperationState::Settled => write!(f, "SETTLED"),
            OperationState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Opaque handle assigned by the remote authority in phase 1
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(String);

impl PendingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PendingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which per-user configuration record a CONFIG_INIT establishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigScope {
    /// Record required before paying for content generation or minting
    Content,
    /// Record required before listing on the marketplace
    Marketplace,
}

impl std::fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigScope::Content => write!(f, "content"),
            ConfigScope::Marketplace => write!(f, "marketplace"),
        }
    }
}

impl std::str::FromStr for ConfigScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "content" => Ok(ConfigScope::Content),
            "marketplace" => Ok(ConfigScope::Marketplace),
            other => Err(format!("unknown config scope '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
}

/// Paid AI content generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub model_id: u64,
    pub prompt: String,
    pub content_type: ContentType,
    pub name: String,
    pub description: String,
}

impl ContentRequest {
    /// Image generation with the default name and description
    pub fn image(model_id: u64, prompt: impl Into<String>) -> Self {
        Self {
            model_id,
            prompt: prompt.into(),
            content_type: ContentType::Image,
            name: "AI Generated Content".to_string(),
            description: "AI Generated Image".to_string(),
        }
    }
}

/// Mint previously generated content as an NFT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub content_id: u64,
    pub name: String,
    pub symbol: String,
    pub royalty_percentage: u8,
}

/// List a minted NFT on the marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRequest {
    pub marketplace_id: u64,
    pub mint_address: String,
    /// Price in the ledger's base unit
    pub price: u64,
}

/// Kind-specific payload of a pending operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationParams {
    ConfigInit { scope: ConfigScope },
    ContentGeneration(ContentRequest),
    NftMint(MintRequest),
    NftListing(ListingRequest),
}

impl OperationParams {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationParams::ConfigInit { .. } => OperationKind::ConfigInit,
            OperationParams::ContentGeneration(_) => OperationKind::ContentGeneration,
            OperationParams::NftMint(_) => OperationKind::NftMint,
            OperationParams::NftListing(_) => OperationKind::NftListing,
        }
    }

    /// Short human-readable description used in approval prompts and logs
    pub fn summary(&self) -> String {
        match self {
            OperationParams::ConfigInit { scope } => format!("initialize {} config", scope),
            OperationParams::ContentGeneration(req) => {
                format!("generate {:?} with model {}", req.content_type, req.model_id)
            }
            OperationParams::NftMint(req) => {
                format!("mint content {} as {} ({})", req.content_id, req.name, req.symbol)
            }
            OperationParams::NftListing(req) => format!(
                "list {} on marketplace {} for {}",
                req.mint_address, req.marketplace_id, req.price
            ),
        }
    }
}

/// Business result returned by phase-4 settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementResult {
    /// Phase 1 reported the precondition already holds; nothing was signed
    AlreadySatisfied,
    ConfigInitialized,
    ContentGenerated {
        content_id: Option<u64>,
        content_uri: String,
    },
    NftMinted {
        mint_address: String,
    },
    NftListed {
        listing_id: Option<String>,
    },
}

impl SettlementResult {
    /// Whether this result can settle an operation of `kind`
    pub fn matches_kind(&self, kind: OperationKind) -> bool {
        matches!(
            (self, kind),
            (SettlementResult::AlreadySatisfied, _)
                | (SettlementResult::ConfigInitialized, OperationKind::ConfigInit)
                | (SettlementResult::ContentGenerated { .. }, OperationKind::ContentGeneration)
                | (SettlementResult::NftMinted { .. }, OperationKind::NftMint)
                | (SettlementResult::NftListed { .. }, OperationKind::NftListing)
        )
    }

    pub fn content_uri(&self) -> Option<&str> {
        match self {
            SettlementResult::ContentGenerated { content_uri, .. } => Some(content_uri),
            _ => None,
        }
    }

    pub fn content_id(&self) -> Option<u64> {
        match self {
            SettlementResult::ContentGenerated { content_id, .. } => *content_id,
            _ => None,
        }
    }

    pub fn mint_address(&self) -> Option<&str> {
        match self {
            SettlementResult::NftMinted { mint_address } => Some(mint_address),
            _ => None,
        }
    }
}

/// One instance of the begin/sign/submit/settle protocol
///
/// Fields are only mutated by the coordinator through the crate-private
/// transition methods below, which keep these invariants:
/// - state never regresses; FAILED and SETTLED are terminal
/// - `signature` is set from SUBMITTED onward and survives a later failure
/// - `settlement_result` is set iff the state is SETTLED
/// - `error` is set iff the state is FAILED
#[derive(Debug, Clone, Serialize)]
pub struct PendingOperation {
    id: Option<PendingId>,
    kind: OperationKind,
    params: OperationParams,
    state: OperationState,
    #[serde(skip)]
    unsigned_transaction: Option<Vec<u8>>,
    signature: Option<String>,
    settlement_result: Option<SettlementResult>,
    #[serde(skip)]
    error: Option<OperationError>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(params: OperationParams) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            kind: params.kind(),
            params,
            state: OperationState::Created,
            unsigned_transaction: None,
            signature: None,
            settlement_result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Option<&PendingId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn params(&self) -> &OperationParams {
        &self.params
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn unsigned_transaction(&self) -> Option<&[u8]> {
        self.unsigned_transaction.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn settlement_result(&self) -> Option<&SettlementResult> {
        self.settlement_result.as_ref()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Consume a settled operation and return its settlement result
    pub fn into_settlement(self) -> Option<SettlementResult> {
        self.settlement_result
    }

    fn advance(&mut self, next: OperationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.updated_at = Utc::now();
    }

    pub(crate) fn await_signature(&mut self, id: PendingId, unsigned_transaction: Vec<u8>) {
        self.id = Some(id);
        self.unsigned_transaction = Some(unsigned_transaction);
        self.advance(OperationState::AwaitingSignature);
    }

    pub(crate) fn mark_submitted(&mut self, signature: String) {
        self.signature = Some(signature);
        self.advance(OperationState::Submitted);
    }

    pub(crate) fn mark_confirming(&mut self) {
        self.advance(OperationState::Confirming);
    }

    pub(crate) fn settle(&mut self, result: SettlementResult) {
        self.settlement_result = Some(result);
        self.advance(OperationState::Settled);
    }

    pub(crate) fn fail(&mut self, error: OperationError) {
        self.error = Some(error);
        self.advance(OperationState::Failed);
    }
}
