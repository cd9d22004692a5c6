//! Phase-change notifications
//!
//! The coordinator emits one `PhaseEvent` per state transition. Sinks are
//! purely observational: `notify` is synchronous, infallible and must not
//! block, so a slow or absent UI can never hold up the protocol.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::OperationError;
use crate::types::{OperationKind, OperationState, PendingId, PendingOperation};

/// Progress event for user-visible feedback
#[derive(Debug, Clone, Serialize)]
pub struct PhaseEvent {
    pub kind: OperationKind,
    pub pending_id: Option<PendingId>,
    pub state: OperationState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub error: Option<OperationError>,
}

impl PhaseEvent {
    pub fn from_operation(op: &PendingOperation) -> Self {
        Self {
            kind: op.kind(),
            pending_id: op.id().cloned(),
            state: op.state(),
            timestamp: op.updated_at(),
            error: op.error().cloned(),
        }
    }

    /// Toast-style text for the event
    pub fn message(&self) -> String {
        let what = match self.kind {
            OperationKind::ConfigInit => "user configuration",
            OperationKind::ContentGeneration => "content generation",
            OperationKind::NftMint => "NFT minting",
            OperationKind::NftListing => "NFT listing",
        };
        match self.state {
            OperationState::Created => format!("Starting {}...", what),
            OperationState::AwaitingSignature => {
                format!("Please sign the {} transaction...", what)
            }
            OperationState::Submitted => format!("Submitted {} transaction", what),
            OperationState::Confirming => format!("Confirming {}...", what),
            OperationState::Settled => format!("{} complete", capitalize(what)),
            OperationState::Failed => match &self.error {
                Some(e) => format!("{} failed: {}", capitalize(what), e),
                None => format!("{} failed", capitalize(what)),
            },
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &PhaseEvent);
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn notify(&self, event: &PhaseEvent) {
        (**self).notify(event)
    }
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &PhaseEvent) {
        let pending_id = event.pending_id.as_ref().map(|id| id.as_str()).unwrap_or("-");
        match &event.error {
            Some(err) => warn!(
                kind = %event.kind,
                pending_id,
                state = %event.state,
                phase = %err.phase(),
                "{}",
                event.message()
            ),
            None => info!(kind = %event.kind, pending_id, state = %event.state, "{}", event.message()),
        }
    }
}

/// Forwards events to an async consumer (e.g. a UI task)
///
/// A dropped receiver is ignored; notifications never fail the protocol.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PhaseEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PhaseEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: &PhaseEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Delivers each event to several sinks in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, event: &PhaseEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
