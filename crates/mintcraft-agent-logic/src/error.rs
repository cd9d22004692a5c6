//! Error taxonomy surfaced to callers of the operation coordinator
//!
//! Every phase failure comes back as a tagged `OperationError` so the UI can
//! render a phase-specific message. The tag also tells the caller whether a
//! ledger transaction may already exist for the failed operation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OperationKind, PendingOperation};

/// Protocol phase at which an operation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Caller-side validation before phase 1
    Precondition,
    /// Phase 1: remote authority issues the unsigned transaction
    Begin,
    /// Phase 2: wallet approval
    Sign,
    /// Phase 3a: broadcast to the ledger
    Submit,
    /// Phase 3b: waiting for ledger finality
    Confirm,
    /// Phase 4: remote authority records the outcome
    Settle,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Precondition => write!(f, "precondition"),
            Phase::Begin => write!(f, "begin"),
            Phase::Sign => write!(f, "sign"),
            Phase::Submit => write!(f, "submit"),
            Phase::Confirm => write!(f, "confirm"),
            Phase::Settle => write!(f, "settle"),
        }
    }
}

/// How the UI should present a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nothing happened on the ledger; the user may simply try again
    Error,
    /// A transaction may or may not have landed; check the explorer
    UnknownOutcome,
    /// The ledger effect exists but bookkeeping did not complete
    RecoverableWarning,
}

/// Caller-side rejections raised before any collaborator is invoked
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Please enter a message")]
    EmptyPrompt,

    #[error("Message too long ({len} characters, max {max})")]
    PromptTooLong { len: usize, max: usize },

    #[error("No AI model selected")]
    NoModelSelected,

    #[error("Selected model {0} not found")]
    UnknownModel(u64),

    #[error("Selected model {0} is not active")]
    InactiveModel(u64),

    #[error("Wallet not connected")]
    WalletDisconnected,

    #[error("{kind} already in progress for {user}")]
    AlreadyInFlight { user: String, kind: OperationKind },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// Terminal failure of a pending operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(#[from] PreconditionError),

    #[error("begin failed: {reason}")]
    BeginFailed { reason: String },

    #[error("signing failed: {reason}")]
    SigningFailed { reason: String },

    #[error("submission failed (outcome unknown): {reason}")]
    SubmissionFailed {
        signature: Option<String>,
        reason: String,
    },

    #[error("confirmation of {signature} timed out after {}s (outcome unknown)", .timeout.as_secs())]
    ConfirmationTimeout { signature: String, timeout: Duration },

    #[error("settlement of {signature} failed after ledger confirmation: {reason}")]
    SettlementFailed { signature: String, reason: String },

    #[error("cancelled during {phase}")]
    Cancelled {
        phase: Phase,
        signature: Option<String>,
    },
}

impl OperationError {
    /// Phase at which the failure occurred
    pub fn phase(&self) -> Phase {
        match self {
            OperationError::PreconditionFailed(_) => Phase::Precondition,
            OperationError::BeginFailed { .. } => Phase::Begin,
            OperationError::SigningFailed { .. } => Phase::Sign,
            OperationError::SubmissionFailed { .. } => Phase::Submit,
            OperationError::ConfirmationTimeout { .. } => Phase::Confirm,
            OperationError::SettlementFailed { .. } => Phase::Settle,
            OperationError::Cancelled { phase, .. } => *phase,
        }
    }

    /// Whether a ledger transaction may already exist for this operation.
    ///
    /// A cancelled operation counts only if cancellation happened after the
    /// signed transaction was handed to the ledger.
    pub fn side_effect_possible(&self) -> bool {
        match self {
            OperationError::PreconditionFailed(_)
            | OperationError::BeginFailed { .. }
            | OperationError::SigningFailed { .. } => false,
            OperationError::SubmissionFailed { .. }
            | OperationError::ConfirmationTimeout { .. }
            | OperationError::SettlementFailed { .. } => true,
            OperationError::Cancelled { phase, .. } => {
                matches!(phase, Phase::Confirm | Phase::Settle)
            }
        }
    }

    /// Whether a fresh `run` is safe without checking the ledger first
    pub fn is_safe_to_retry(&self) -> bool {
        !self.side_effect_possible()
    }

    pub fn severity(&self) -> Severity {
        match self {
            OperationError::SettlementFailed { .. } => Severity::RecoverableWarning,
            e if e.side_effect_possible() => Severity::UnknownOutcome,
            _ => Severity::Error,
        }
    }

    /// Ledger signature associated with the failure, if one was produced
    pub fn signature(&self) -> Option<&str> {
        match self {
            OperationError::SubmissionFailed { signature, .. }
            | OperationError::Cancelled { signature, .. } => signature.as_deref(),
            OperationError::ConfirmationTimeout { signature, .. }
            | OperationError::SettlementFailed { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Phase-specific text for user-visible feedback.
    ///
    /// `tx_url` maps a signature to its explorer page (cluster included);
    /// when a signature is known the message links to it.
    pub fn user_message(&self, tx_url: Option<&dyn Fn(&str) -> String>) -> String {
        let link = match (tx_url, self.signature()) {
            (Some(tx_url), Some(sig)) => format!(" ({})", tx_url(sig)),
            _ => String::new(),
        };
        match self {
            OperationError::PreconditionFailed(e) => e.to_string(),
            OperationError::BeginFailed { reason } => {
                format!("Request was not accepted: {}. Nothing was charged; try again.", reason)
            }
            OperationError::SigningFailed { .. } => {
                "Transaction signing failed. Nothing was submitted; try again.".to_string()
            }
            OperationError::SubmissionFailed { .. } | OperationError::ConfirmationTimeout { .. } => {
                format!("Unknown outcome, check explorer before retrying{}", link)
            }
            OperationError::SettlementFailed { .. } => format!(
                "Transaction landed on the ledger but could not be recorded. \
                 Reconcile it from the journal{}",
                link
            ),
            OperationError::Cancelled { .. } if self.side_effect_possible() => {
                format!("Stopped waiting; the transaction may still land{}", link)
            }
            OperationError::Cancelled { .. } => "Operation cancelled".to_string(),
        }
    }
}

/// Failure returned from a coordinator run or a session flow
///
/// Carries the operation snapshot at the moment it failed so callers can
/// inspect `signature` and the last reached state. Precondition failures
/// happen before an operation exists and carry none.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct OperationFailure {
    pub error: OperationError,
    pub operation: Option<Box<PendingOperation>>,
}

impl OperationFailure {
    pub fn precondition(error: PreconditionError) -> Self {
        Self {
            error: OperationError::PreconditionFailed(error),
            operation: None,
        }
    }

    pub(crate) fn from_operation(operation: PendingOperation) -> Self {
        let error = operation
            .error()
            .cloned()
            .unwrap_or(OperationError::BeginFailed {
                reason: "operation failed without a recorded error".to_string(),
            });
        Self {
            error,
            operation: Some(Box::new(operation)),
        }
    }
}
