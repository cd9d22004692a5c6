//! Four-phase pending-operation coordinator
//!
//! Drives one operation through begin, sign, submit/confirm and settle:
//!
//! 1. The remote authority issues an unsigned transaction (or reports the
//!    precondition already holds, which settles immediately).
//! 2. The wallet signs. This waits on a human and is never timed out.
//! 3. The signed transaction is submitted and the coordinator waits for
//!    ledger finality, bounded by `finality_timeout`.
//! 4. The remote authority records the outcome and returns the result.
//!
//! Every state transition is reported to the notification sink. The
//! coordinator never retries; any retry is a fresh `run` started by the
//! caller. Cancellation is checked at the start of every phase and raced
//! against every wait, except the submit call itself: once the signed
//! transaction is handed to the ledger the coordinator records the
//! signature before it stops.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authority::{BeginResponse, RemoteAuthority};
use crate::error::{OperationError, OperationFailure, Phase, Severity};
use crate::ledger::{Finality, LedgerConnection};
use crate::notify::{NotificationSink, PhaseEvent};
use crate::precondition::{validate_params, validate_wallet};
use crate::signer::WalletSigner;
use crate::types::{OperationKind, OperationParams, PendingId, PendingOperation, SettlementResult};

pub struct OperationCoordinator {
    authority: Arc<dyn RemoteAuthority>,
    signer: Arc<dyn WalletSigner>,
    ledger: Arc<dyn LedgerConnection>,
    sink: Arc<dyn NotificationSink>,
    finality_timeout: Duration,
}

fn checkpoint(
    cancel: &CancellationToken,
    phase: Phase,
    signature: Option<&str>,
) -> Result<(), OperationError> {
    if cancel.is_cancelled() {
        return Err(OperationError::Cancelled {
            phase,
            signature: signature.map(str::to_string),
        });
    }
    Ok(())
}

impl OperationCoordinator {
    pub fn new(
        authority: Arc<dyn RemoteAuthority>,
        signer: Arc<dyn WalletSigner>,
        ledger: Arc<dyn LedgerConnection>,
        sink: Arc<dyn NotificationSink>,
        finality_timeout: Duration,
    ) -> Self {
        Self {
            authority,
            signer,
            ledger,
            sink,
            finality_timeout,
        }
    }

    pub fn signer(&self) -> &Arc<dyn WalletSigner> {
        &self.signer
    }

    fn emit(&self, op: &PendingOperation) {
        self.sink.notify(&PhaseEvent::from_operation(op));
    }

    /// Run one operation to a terminal state.
    ///
    /// Returns the SETTLED operation, or the failure together with the
    /// FAILED operation snapshot. Parameter and wallet checks run first; if
    /// they fail no collaborator is contacted and no operation is created.
    pub async fn run(
        &self,
        params: OperationParams,
        cancel: &CancellationToken,
    ) -> Result<PendingOperation, OperationFailure> {
        validate_params(&params).map_err(OperationFailure::precondition)?;
        validate_wallet(self.signer.as_ref()).map_err(OperationFailure::precondition)?;

        let mut op = PendingOperation::new(params);
        info!(kind = %op.kind(), summary = %op.params().summary(), "operation created");
        self.emit(&op);

        match self.drive(&mut op, cancel).await {
            Ok(()) => {
                info!(
                    kind = %op.kind(),
                    pending_id = ?op.id().map(PendingId::as_str),
                    signature = ?op.signature(),
                    "operation settled"
                );
                Ok(op)
            }
            Err(err) => {
                let pending_id = op.id().map(|id| id.to_string());
                match err.severity() {
                    Severity::Error => warn!(
                        kind = %op.kind(),
                        ?pending_id,
                        state = %op.state(),
                        phase = %err.phase(),
                        error = %err,
                        "operation failed"
                    ),
                    _ => error!(
                        kind = %op.kind(),
                        ?pending_id,
                        state = %op.state(),
                        phase = %err.phase(),
                        signature = ?err.signature(),
                        error = %err,
                        "operation failed with possible ledger side effect"
                    ),
                }
                op.fail(err);
                self.emit(&op);
                Err(OperationFailure::from_operation(op))
            }
        }
    }

    async fn drive(
        &self,
        op: &mut PendingOperation,
        cancel: &CancellationToken,
    ) -> Result<(), OperationError> {
        let kind = op.kind();

        // Phase 1: begin
        checkpoint(cancel, Phase::Begin, None)?;
        let begin = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OperationError::Cancelled { phase: Phase::Begin, signature: None });
            }
            resp = self.authority.begin(op.params()) => resp,
        };
        let (pending_id, unsigned) = match begin {
            Ok(BeginResponse::AlreadySatisfied) => {
                info!(kind = %kind, "precondition already satisfied, skipping signature");
                op.settle(SettlementResult::AlreadySatisfied);
                self.emit(op);
                return Ok(());
            }
            Ok(BeginResponse::Pending {
                pending_id,
                unsigned_transaction,
            }) => {
                if unsigned_transaction.is_empty() {
                    return Err(OperationError::BeginFailed {
                        reason: format!("authority returned no transaction for {}", pending_id),
                    });
                }
                (pending_id, unsigned_transaction)
            }
            Err(e) => return Err(OperationError::BeginFailed { reason: e.to_string() }),
        };
        debug!(kind = %kind, pending_id = %pending_id, bytes = unsigned.len(), "unsigned transaction issued");
        op.await_signature(pending_id.clone(), unsigned.clone());
        self.emit(op);

        // Phase 2: sign
        checkpoint(cancel, Phase::Sign, None)?;
        let signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OperationError::Cancelled { phase: Phase::Sign, signature: None });
            }
            signed = self.signer.sign(&unsigned) => signed,
        };
        let signed = signed.map_err(|e| OperationError::SigningFailed { reason: e.to_string() })?;

        // Phase 3: submit and wait for finality
        checkpoint(cancel, Phase::Submit, None)?;
        let signature = self.ledger.submit(&signed).await.map_err(|e| {
            OperationError::SubmissionFailed {
                signature: None,
                reason: e.to_string(),
            }
        })?;
        op.mark_submitted(signature.clone());
        self.emit(op);

        checkpoint(cancel, Phase::Confirm, Some(signature.as_str()))?;
        op.mark_confirming();
        self.emit(op);

        let finality = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OperationError::Cancelled {
                    phase: Phase::Confirm,
                    signature: Some(signature.clone()),
                });
            }
            finality = self.ledger.await_finality(&signature, self.finality_timeout) => finality,
        };
        match finality {
            Ok(Finality::Finalized { slot }) => {
                debug!(kind = %kind, signature = %signature, ?slot, "ledger finality reached");
            }
            Ok(Finality::TimedOut) => {
                return Err(OperationError::ConfirmationTimeout {
                    signature,
                    timeout: self.finality_timeout,
                });
            }
            Ok(Finality::Failed { reason }) => {
                return Err(OperationError::SubmissionFailed {
                    signature: Some(signature),
                    reason: format!("transaction failed on ledger: {}", reason),
                });
            }
            Err(e) => {
                return Err(OperationError::SubmissionFailed {
                    signature: Some(signature),
                    reason: e.to_string(),
                });
            }
        }

        // Phase 4: settle
        let result = self.settle_once(kind, &pending_id, &signature, cancel).await?;
        op.settle(result);
        self.emit(op);
        Ok(())
    }

    async fn settle_once(
        &self,
        kind: OperationKind,
        pending_id: &PendingId,
        signature: &str,
        cancel: &CancellationToken,
    ) -> Result<SettlementResult, OperationError> {
        checkpoint(cancel, Phase::Settle, Some(signature))?;
        let confirmed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(OperationError::Cancelled {
                    phase: Phase::Settle,
                    signature: Some(signature.to_string()),
                });
            }
            confirmed = self.authority.confirm(kind, pending_id, signature) => confirmed,
        };
        match confirmed {
            Ok(SettlementResult::AlreadySatisfied) => Err(OperationError::SettlementFailed {
                signature: signature.to_string(),
                reason: "authority answered settlement with already-satisfied".to_string(),
            }),
            Ok(result) if !result.matches_kind(kind) => Err(OperationError::SettlementFailed {
                signature: signature.to_string(),
                reason: format!("settlement result does not belong to {}", kind),
            }),
            Ok(result) => Ok(result),
            Err(e) => Err(OperationError::SettlementFailed {
                signature: signature.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Re-run phase 4 for an operation whose transaction already landed.
    ///
    /// Never touches the signer or the ledger.
    pub async fn resettle(
        &self,
        kind: OperationKind,
        pending_id: &PendingId,
        signature: &str,
        cancel: &CancellationToken,
    ) -> Result<SettlementResult, OperationError> {
        info!(kind = %kind, pending_id = %pending_id, signature, "re-running settlement");
        let result = self.settle_once(kind, pending_id, signature, cancel).await;
        match &result {
            Ok(_) => info!(kind = %kind, pending_id = %pending_id, "settlement recorded"),
            Err(e) => warn!(kind = %kind, pending_id = %pending_id, error = %e, "settlement still failing"),
        }
        result
    }
}
