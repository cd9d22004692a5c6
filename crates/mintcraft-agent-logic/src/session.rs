//! User-facing flows composed from coordinator runs
//!
//! A `UserSession` validates inputs, takes the single-flight permit for the
//! flow, runs the coordinator and journals failures that may have left a
//! ledger effect. Content generation and listing first make sure the
//! matching per-user config record exists.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::coordinator::OperationCoordinator;
use crate::error::OperationFailure;
use crate::guard::{FlightPermit, SingleFlight};
use crate::precondition::{validate_model, validate_prompt, validate_wallet, AiModel};
use crate::reconcile::{ReconciliationEntry, ReconciliationJournal};
use crate::types::{
    ConfigScope, ContentRequest, ListingRequest, MintRequest, OperationKind, OperationParams,
    PendingOperation, SettlementResult,
};

/// Values used when minting without explicit metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintDefaults {
    pub name: String,
    pub symbol: String,
    pub royalty_percentage: u8,
}

impl Default for MintDefaults {
    fn default() -> Self {
        Self {
            name: "AI Generated NFT".to_string(),
            symbol: "AIGENNFT".to_string(),
            royalty_percentage: 3,
        }
    }
}

pub struct UserSession {
    coordinator: Arc<OperationCoordinator>,
    guard: SingleFlight,
    journal: Option<Arc<Mutex<ReconciliationJournal>>>,
    mint_defaults: MintDefaults,
    marketplace_id: u64,
}

impl UserSession {
    pub fn new(coordinator: Arc<OperationCoordinator>) -> Self {
        Self {
            coordinator,
            guard: SingleFlight::new(),
            journal: None,
            mint_defaults: MintDefaults::default(),
            marketplace_id: 1,
        }
    }

    pub fn with_journal(mut self, journal: ReconciliationJournal) -> Self {
        self.journal = Some(Arc::new(Mutex::new(journal)));
        self
    }

    pub fn with_mint_defaults(mut self, defaults: MintDefaults) -> Self {
        self.mint_defaults = defaults;
        self
    }

    pub fn with_marketplace(mut self, marketplace_id: u64) -> Self {
        self.marketplace_id = marketplace_id;
        self
    }

    fn permit(&self, kind: OperationKind) -> Result<FlightPermit, OperationFailure> {
        let user = validate_wallet(self.coordinator.signer().as_ref())
            .map_err(OperationFailure::precondition)?;
        self.guard
            .try_acquire(&user, kind)
            .map_err(OperationFailure::precondition)
    }

    /// Run `params` under an already held permit
    async fn execute(
        &self,
        params: OperationParams,
        cancel: &CancellationToken,
        _permit: &FlightPermit,
    ) -> Result<PendingOperation, OperationFailure> {
        let result = self.coordinator.run(params, cancel).await;
        if let Err(failure) = &result {
            self.journal_failure(failure);
        }
        result
    }

    async fn run_guarded(
        &self,
        params: OperationParams,
        cancel: &CancellationToken,
    ) -> Result<PendingOperation, OperationFailure> {
        let permit = self.permit(params.kind())?;
        self.execute(params, cancel, &permit).await
    }

    fn journal_failure(&self, failure: &OperationFailure) {
        let Some(journal) = &self.journal else {
            return;
        };
        let mut journal = journal.lock().unwrap_or_else(|e| e.into_inner());
        match journal.record(failure) {
            Ok(Some(id)) => info!(entry = id, "failure journaled for reconciliation"),
            Ok(None) => {}
            Err(e) => error!(error = %e, "failed to journal operation failure"),
        }
    }

    /// Make sure the per-user config record for `scope` exists
    pub async fn initialize_config(
        &self,
        scope: ConfigScope,
        cancel: &CancellationToken,
    ) -> Result<SettlementResult, OperationFailure> {
        let op = self
            .run_guarded(OperationParams::ConfigInit { scope }, cancel)
            .await?;
        if op.settlement_result() == Some(&SettlementResult::AlreadySatisfied) {
            info!(scope = %scope, "user configuration already present");
        }
        Ok(op.into_settlement().unwrap_or(SettlementResult::ConfigInitialized))
    }

    /// Pay for and generate content from `prompt` with the selected model
    pub async fn generate_content(
        &self,
        prompt: &str,
        model: Option<u64>,
        catalog: &[AiModel],
        cancel: &CancellationToken,
    ) -> Result<PendingOperation, OperationFailure> {
        validate_prompt(prompt).map_err(OperationFailure::precondition)?;
        let model = validate_model(model, catalog).map_err(OperationFailure::precondition)?;
        let params = OperationParams::ContentGeneration(ContentRequest::image(model.id, prompt.trim()));
        let permit = self.permit(params.kind())?;

        self.initialize_config(ConfigScope::Content, cancel).await?;
        info!(model = %model.name, "generating content");
        self.execute(params, cancel, &permit).await
    }

    /// Mint generated content with the session's mint defaults
    pub async fn mint_nft(
        &self,
        content_id: u64,
        cancel: &CancellationToken,
    ) -> Result<PendingOperation, OperationFailure> {
        let params = OperationParams::NftMint(MintRequest {
            content_id,
            name: self.mint_defaults.name.clone(),
            symbol: self.mint_defaults.symbol.clone(),
            royalty_percentage: self.mint_defaults.royalty_percentage,
        });
        self.run_guarded(params, cancel).await
    }

    /// List a minted NFT on the session's marketplace
    pub async fn list_nft(
        &self,
        mint_address: &str,
        price: u64,
        cancel: &CancellationToken,
    ) -> Result<PendingOperation, OperationFailure> {
        self.list_nft_on(self.marketplace_id, mint_address, price, cancel)
            .await
    }

    pub async fn list_nft_on(
        &self,
        marketplace_id: u64,
        mint_address: &str,
        price: u64,
        cancel: &CancellationToken,
    ) -> Result<PendingOperation, OperationFailure> {
        let params = OperationParams::NftListing(ListingRequest {
            marketplace_id,
            mint_address: mint_address.to_string(),
            price,
        });
        let permit = self.permit(params.kind())?;

        self.initialize_config(ConfigScope::Marketplace, cancel).await?;
        self.execute(params, cancel, &permit).await
    }

    pub fn journal_entries(&self) -> Vec<ReconciliationEntry> {
        match &self.journal {
            Some(journal) => journal
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entries()
                .to_vec(),
            None => Vec::new(),
        }
    }

    fn journal(&self) -> Result<&Arc<Mutex<ReconciliationJournal>>> {
        self.journal
            .as_ref()
            .ok_or_else(|| anyhow!("no reconciliation journal configured"))
    }

    /// Re-run settlement for a journaled operation; removes the entry on success.
    ///
    /// Holds the (user, kind) permit so the same entry is never confirmed twice
    /// concurrently. Once confirm succeeds the result is returned even if the
    /// journal cannot be updated.
    pub async fn resettle(&self, entry_id: u64, cancel: &CancellationToken) -> Result<SettlementResult> {
        let journal = self.journal()?;
        let entry = journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(entry_id)
            .cloned()
            .ok_or_else(|| anyhow!("journal entry {} not found", entry_id))?;
        let (Some(pending_id), Some(signature)) = (&entry.pending_id, &entry.signature) else {
            bail!(
                "journal entry {} has no ledger signature; check the explorer and dismiss it",
                entry_id
            );
        };
        let _permit = self.permit(entry.kind).map_err(|f| anyhow!(f.error))?;

        let result = self
            .coordinator
            .resettle(entry.kind, pending_id, signature, cancel)
            .await?;
        let removed = journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entry_id);
        if let Err(e) = removed {
            error!(
                entry = entry_id,
                error = %e,
                "settlement recorded but journal entry could not be removed; dismiss it"
            );
        }
        Ok(result)
    }

    /// Drop a journal entry without settling it
    pub fn dismiss(&self, entry_id: u64) -> Result<bool> {
        let removed = self
            .journal()?
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entry_id)?;
        Ok(removed.is_some())
    }
}
