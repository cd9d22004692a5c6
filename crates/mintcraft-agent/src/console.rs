//! Terminal output: progress lines on stderr, results on stdout

use mintcraft_agent_logic::notify::{NotificationSink, PhaseEvent};
use mintcraft_agent_logic::precondition::AiModel;
use mintcraft_agent_logic::reconcile::ReconciliationEntry;
use mintcraft_agent_logic::types::{OperationState, PendingOperation};

/// Prints one progress line per phase event
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, event: &PhaseEvent) {
        let marker = match event.state {
            OperationState::Settled => "ok",
            OperationState::Failed => "!!",
            _ => "..",
        };
        eprintln!("[{}] {}", marker, event.message());
    }
}

pub fn print_operation(op: &PendingOperation, explorer_tx_url: impl Fn(&str) -> String) {
    println!("Kind:        {}", op.kind());
    println!("State:       {}", op.state());
    if let Some(id) = op.id() {
        println!("Pending id:  {}", id);
    }
    if let Some(sig) = op.signature() {
        println!("Signature:   {}", sig);
        println!("Explorer:    {}", explorer_tx_url(sig));
    }
    if let Some(result) = op.settlement_result() {
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("Result:\n{}", json),
            Err(_) => println!("Result:      {:?}", result),
        }
    }
}

pub fn print_models(models: &[AiModel]) {
    if models.is_empty() {
        println!("No models available");
        return;
    }
    println!("{:<6} {:<28} {:<8} {:>8}", "ID", "NAME", "ACTIVE", "ROYALTY");
    for m in models {
        let royalty = m
            .royalty_percentage
            .map(|r| format!("{}%", r))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<6} {:<28} {:<8} {:>8}", m.id, m.name, m.is_active, royalty);
    }
}

pub fn print_journal(entries: &[ReconciliationEntry]) {
    if entries.is_empty() {
        println!("Journal is empty");
        return;
    }
    for e in entries {
        println!(
            "#{:<4} {:<18} {:<10} pending={} sig={} [{}]",
            e.id,
            e.kind.to_string(),
            e.phase.to_string(),
            e.pending_id.as_ref().map(|p| p.as_str()).unwrap_or("-"),
            e.signature.as_deref().unwrap_or("-"),
            e.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        );
        println!("      {}", e.reason);
    }
}
