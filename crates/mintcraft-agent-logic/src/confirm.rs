//! Interactive approval before the local wallet signs
//!
//! Prompts go to stderr so they stay out of structured logs. Prompts are
//! serialized with a lock so concurrent sessions never interleave on stdin.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::signer::SignerError;

/// Lock serializing stdin prompts across concurrent tasks
pub type ConfirmLock = Arc<Mutex<()>>;

pub fn new_confirm_lock() -> ConfirmLock {
    Arc::new(Mutex::new(()))
}

/// Write the prompt to `output` and read a y/N answer from `input`.
///
/// Anything other than `y` or `yes` (case-insensitive) declines.
pub fn prompt_decision<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    action: &str,
    details: &str,
) -> Result<(), SignerError> {
    write!(output, "\n[CONFIRM] {}: {}\n  Sign and submit? [y/N]: ", action, details).ok();
    output.flush().ok();

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|e| SignerError::Other(format!("failed to read stdin: {}", e)))?;

    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(SignerError::Rejected(format!("declined {}", action))),
    }
}

/// Ask the operator on the terminal whether to sign.
///
/// Non-interactive stdin auto-declines.
pub async fn approve_on_terminal(
    lock: &ConfirmLock,
    action: &str,
    details: &str,
) -> Result<(), SignerError> {
    let _guard = lock.lock().await;

    if !std::io::stdin().is_terminal() {
        return Err(SignerError::Rejected(format!(
            "non-interactive stdin, auto-declining {}",
            action
        )));
    }

    let action = action.to_string();
    let details = details.to_string();
    tokio::task::spawn_blocking(move || {
        prompt_decision(std::io::stdin().lock(), std::io::stderr(), &action, &details)
    })
    .await
    .map_err(|e| SignerError::Other(format!("prompt task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_approves() {
        let mut out = Vec::new();
        assert!(prompt_decision(&b"YES\n"[..], &mut out, "mint", "content 3").is_ok());
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("[CONFIRM] mint: content 3"));
    }

    #[test]
    fn anything_else_declines() {
        for answer in [&b"n\n"[..], &b"\n"[..], &b"maybe\n"[..], &b""[..]] {
            let result = prompt_decision(answer, Vec::new(), "list", "x");
            assert!(matches!(result, Err(SignerError::Rejected(_))));
        }
    }
}
