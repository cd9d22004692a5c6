//! Scripted collaborators for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::authority::{AuthorityError, BeginResponse, RemoteAuthority};
use crate::coordinator::OperationCoordinator;
use crate::ledger::{Finality, LedgerConnection, LedgerError};
use crate::notify::{NotificationSink, PhaseEvent};
use crate::signer::{SignerError, WalletSigner};
use crate::types::{OperationKind, OperationParams, OperationState, PendingId, SettlementResult};

pub(crate) const WALLET: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

pub(crate) fn pending(id: &str, tx: &[u8]) -> Result<BeginResponse, AuthorityError> {
    Ok(BeginResponse::Pending {
        pending_id: PendingId::new(id),
        unsigned_transaction: tx.to_vec(),
    })
}

#[derive(Default)]
pub(crate) struct FakeAuthority {
    begin: Mutex<HashMap<OperationKind, Result<BeginResponse, AuthorityError>>>,
    confirm: Mutex<HashMap<OperationKind, Result<SettlementResult, AuthorityError>>>,
    pub begin_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub confirmed: Mutex<Vec<(OperationKind, PendingId, String)>>,
    /// When set, `confirm` waits for this gate before answering
    confirm_gate: Option<Arc<Notify>>,
    pub confirm_started: Arc<Notify>,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_begin(self, kind: OperationKind, resp: Result<BeginResponse, AuthorityError>) -> Self {
        self.begin.lock().unwrap().insert(kind, resp);
        self
    }

    pub fn on_confirm(
        self,
        kind: OperationKind,
        resp: Result<SettlementResult, AuthorityError>,
    ) -> Self {
        self.set_confirm(kind, resp);
        self
    }

    pub fn set_confirm(&self, kind: OperationKind, resp: Result<SettlementResult, AuthorityError>) {
        self.confirm.lock().unwrap().insert(kind, resp);
    }

    pub fn gated_confirm(mut self, gate: Arc<Notify>) -> Self {
        self.confirm_gate = Some(gate);
        self
    }

    pub fn begins(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn confirms(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn begin(&self, params: &OperationParams) -> Result<BeginResponse, AuthorityError> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        self.begin
            .lock()
            .unwrap()
            .get(&params.kind())
            .cloned()
            .unwrap_or_else(|| Err(AuthorityError::Network("unscripted begin".into())))
    }

    async fn confirm(
        &self,
        kind: OperationKind,
        pending_id: &PendingId,
        signature: &str,
    ) -> Result<SettlementResult, AuthorityError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.confirmed
            .lock()
            .unwrap()
            .push((kind, pending_id.clone(), signature.to_string()));
        self.confirm_started.notify_one();
        if let Some(gate) = &self.confirm_gate {
            gate.notified().await;
        }
        self.confirm
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Err(AuthorityError::Network("unscripted confirm".into())))
    }
}

pub(crate) struct FakeSigner {
    public_key: Option<String>,
    result: Result<Vec<u8>, SignerError>,
    /// When set, `sign` waits for this gate before answering
    gate: Option<Arc<Notify>>,
    pub started: Arc<Notify>,
    pub calls: AtomicUsize,
}

impl FakeSigner {
    pub fn signing(signed: &[u8]) -> Self {
        Self {
            public_key: Some(WALLET.to_string()),
            result: Ok(signed.to_vec()),
            gate: None,
            started: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            result: Err(SignerError::Rejected("user closed the popup".into())),
            ..Self::signing(b"")
        }
    }

    pub fn disconnected() -> Self {
        Self {
            public_key: None,
            ..Self::signing(b"")
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for FakeSigner {
    fn public_key(&self) -> Option<String> {
        self.public_key.clone()
    }

    async fn sign(&self, _unsigned_transaction: &[u8]) -> Result<Vec<u8>, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.result.clone()
    }
}

pub(crate) struct FakeLedger {
    submit: Result<String, LedgerError>,
    finality: Result<Finality, LedgerError>,
    pub submitted: Mutex<Vec<Vec<u8>>>,
    pub finality_calls: AtomicUsize,
    /// Finality never resolves
    stalled: bool,
    pub finality_started: Arc<Notify>,
}

impl FakeLedger {
    pub fn landing(signature: &str) -> Self {
        Self {
            submit: Ok(signature.to_string()),
            finality: Ok(Finality::Finalized { slot: Some(1) }),
            submitted: Mutex::new(Vec::new()),
            finality_calls: AtomicUsize::new(0),
            stalled: false,
            finality_started: Arc::new(Notify::new()),
        }
    }

    pub fn stalled(signature: &str) -> Self {
        Self {
            stalled: true,
            ..Self::landing(signature)
        }
    }

    pub fn with_finality(mut self, finality: Result<Finality, LedgerError>) -> Self {
        self.finality = finality;
        self
    }

    pub fn failing_submit(reason: &str) -> Self {
        Self {
            submit: Err(LedgerError::Network(reason.to_string())),
            ..Self::landing("")
        }
    }

    pub fn submits(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn finality_waits(&self) -> usize {
        self.finality_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerConnection for FakeLedger {
    async fn submit(&self, signed_transaction: &[u8]) -> Result<String, LedgerError> {
        self.submitted.lock().unwrap().push(signed_transaction.to_vec());
        self.submit.clone()
    }

    async fn await_finality(
        &self,
        _signature: &str,
        _timeout: Duration,
    ) -> Result<Finality, LedgerError> {
        self.finality_calls.fetch_add(1, Ordering::SeqCst);
        self.finality_started.notify_one();
        if self.stalled {
            std::future::pending::<()>().await;
        }
        self.finality.clone()
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<PhaseEvent>>,
}

impl RecordingSink {
    pub fn states(&self) -> Vec<OperationState> {
        self.events.lock().unwrap().iter().map(|e| e.state).collect()
    }

    pub fn states_for(&self, kind: OperationKind) -> Vec<OperationState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.state)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &PhaseEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Collaborators plus a coordinator wired to them
pub(crate) struct Harness {
    pub authority: Arc<FakeAuthority>,
    pub signer: Arc<FakeSigner>,
    pub ledger: Arc<FakeLedger>,
    pub sink: Arc<RecordingSink>,
    pub coordinator: OperationCoordinator,
}

impl Harness {
    pub fn new(authority: FakeAuthority, signer: FakeSigner, ledger: FakeLedger) -> Self {
        let authority = Arc::new(authority);
        let signer = Arc::new(signer);
        let ledger = Arc::new(ledger);
        let sink = Arc::new(RecordingSink::default());
        let coordinator = OperationCoordinator::new(
            authority.clone(),
            signer.clone(),
            ledger.clone(),
            sink.clone(),
            Duration::from_secs(60),
        );
        Self {
            authority,
            signer,
            ledger,
            sink,
            coordinator,
        }
    }
}
