//! Reconciliation journal for operations that may have a ledger side effect
//!
//! Failures after the signed transaction was handed to the ledger are
//! appended here so the user can re-run settlement later or dismiss the
//! entry once checked on an explorer. The journal is a JSON file written
//! atomically (write to `.tmp`, then rename).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::{OperationFailure, Phase, Severity};
use crate::types::{OperationKind, OperationParams, PendingId};

const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal format error: {0}")]
    Format(#[from] serde_json::Error),
    #[error("journal version {found} is not supported")]
    UnsupportedVersion { found: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub id: u64,
    pub kind: OperationKind,
    pub params: OperationParams,
    pub pending_id: Option<PendingId>,
    pub signature: Option<String>,
    pub phase: Phase,
    pub severity: Severity,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl ReconciliationEntry {
    /// Settlement can be re-run only when both handles are known
    pub fn can_resettle(&self) -> bool {
        self.pending_id.is_some() && self.signature.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalFile {
    version: u32,
    next_id: u64,
    entries: Vec<ReconciliationEntry>,
}

impl Default for JournalFile {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            next_id: 1,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ReconciliationJournal {
    path: PathBuf,
    file: JournalFile,
}

impl ReconciliationJournal {
    /// Open the journal at `path`; a missing file is an empty journal
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let file = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let file: JournalFile = serde_json::from_str(&data)?;
            if file.version != JOURNAL_VERSION {
                return Err(JournalError::UnsupportedVersion {
                    found: file.version,
                });
            }
            info!(path = %path.display(), entries = file.entries.len(), "journal loaded");
            file
        } else {
            JournalFile::default()
        };
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ReconciliationEntry] {
        &self.file.entries
    }

    pub fn get(&self, id: u64) -> Option<&ReconciliationEntry> {
        self.file.entries.iter().find(|e| e.id == id)
    }

    /// Append an entry when the failure may have left a ledger effect.
    ///
    /// Returns the new entry id, or `None` when nothing needed recording.
    pub fn record(&mut self, failure: &OperationFailure) -> Result<Option<u64>, JournalError> {
        let Some(op) = failure.operation.as_deref() else {
            return Ok(None);
        };
        if !failure.error.side_effect_possible() {
            return Ok(None);
        }

        let id = self.file.next_id;
        let entry = ReconciliationEntry {
            id,
            kind: op.kind(),
            params: op.params().clone(),
            pending_id: op.id().cloned(),
            signature: op
                .signature()
                .or_else(|| failure.error.signature())
                .map(str::to_string),
            phase: failure.error.phase(),
            severity: failure.error.severity(),
            reason: failure.error.to_string(),
            recorded_at: Utc::now(),
        };
        warn!(
            id,
            kind = %entry.kind,
            pending_id = ?entry.pending_id,
            signature = ?entry.signature,
            "recording operation for reconciliation"
        );
        let mut next = self.file.clone();
        next.next_id += 1;
        next.entries.push(entry);
        self.commit(next)?;
        Ok(Some(id))
    }

    /// Drop an entry; returns it if it existed
    pub fn remove(&mut self, id: u64) -> Result<Option<ReconciliationEntry>, JournalError> {
        let Some(pos) = self.file.entries.iter().position(|e| e.id == id) else {
            return Ok(None);
        };
        let mut next = self.file.clone();
        let entry = next.entries.remove(pos);
        self.commit(next)?;
        info!(id, kind = %entry.kind, "journal entry removed");
        Ok(Some(entry))
    }

    /// Memory is only updated once `next` is on disk
    fn commit(&mut self, next: JournalFile) -> Result<(), JournalError> {
        self.save(&next)?;
        self.file = next;
        Ok(())
    }

    fn save(&self, file: &JournalFile) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(file)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
