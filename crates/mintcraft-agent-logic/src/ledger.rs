//! Ledger connection boundary and JSON-RPC implementation
//!
//! `submit` broadcasts a signed transaction and returns its ledger signature;
//! `await_finality` polls the signature status until the configured
//! commitment is reached, the ledger reports an execution error, or the
//! timeout elapses. Transient polling errors are logged and polling
//! continues; only the deadline ends the wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Outcome of waiting for finality
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finality {
    /// Target commitment reached
    Finalized { slot: Option<u64> },
    /// Deadline passed without reaching the target commitment
    TimedOut,
    /// Transaction landed but the ledger reports it failed
    Failed { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait LedgerConnection: Send + Sync {
    /// Broadcast a signed transaction, returning its ledger signature
    async fn submit(&self, signed_transaction: &[u8]) -> Result<String, LedgerError>;

    /// Wait until `signature` is final or `timeout` elapses
    async fn await_finality(
        &self,
        signature: &str,
        timeout: Duration,
    ) -> Result<Finality, LedgerError>;
}

/// Confirmation level a transaction must reach to count as final
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl std::str::FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment '{}'", other)),
        }
    }
}

/// Configuration for the JSON-RPC ledger client
#[derive(Debug, Clone)]
pub struct LedgerRpcConfig {
    pub rpc_url: String,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub commitment: Commitment,
}


#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct SignatureStatuses {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: Option<u64>,
    err: Option<serde_json::Value>,
    confirmation_status: Option<Commitment>,
}

/// Ledger connection speaking the Solana-style JSON-RPC dialect
pub struct JsonRpcLedger {
    cfg: LedgerRpcConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(cfg: LedgerRpcConfig) -> Result<Self, LedgerError> {
        if cfg.rpc_url.trim().is_empty() {
            return Err(LedgerError::Config("rpc_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            cfg,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T>(&self, method: &str, params: serde_json::Value) -> Result<T, LedgerError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, url = %self.cfg.rpc_url, "ledger rpc call");
        let resp = self
            .client
            .post(&self.cfg.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(LedgerError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RpcResponse<T> =
            serde_json::from_str(&body).map_err(|e| LedgerError::Decode(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{method}: missing result")))
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, LedgerError> {
        let statuses: SignatureStatuses = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }
}

#[async_trait]
impl LedgerConnection for JsonRpcLedger {
    async fn submit(&self, signed_transaction: &[u8]) -> Result<String, LedgerError> {
        let encoded = BASE64.encode(signed_transaction);
        let signature: String = self
            .call(
                "sendTransaction",
                serde_json::json!([
                    encoded,
                    { "encoding": "base64", "preflightCommitment": "confirmed" }
                ]),
            )
            .await?;
        info!(signature = %signature, "transaction submitted");
        Ok(signature)
    }

    async fn await_finality(
        &self,
        signature: &str,
        timeout: Duration,
    ) -> Result<Finality, LedgerError> {
        let deadline = Instant::now() + timeout;
        let poll = Duration::from_millis(self.cfg.poll_interval_ms.max(1));
        loop {
            match self.signature_status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        warn!(signature, error = %err, "transaction failed on ledger");
                        return Ok(Finality::Failed {
                            reason: err.to_string(),
                        });
                    }
                    if status
                        .confirmation_status
                        .is_some_and(|level| level >= self.cfg.commitment)
                    {
                        info!(signature, slot = ?status.slot, commitment = self.cfg.commitment.as_str(), "transaction final");
                        return Ok(Finality::Finalized { slot: status.slot });
                    }
                    debug!(signature, status = ?status.confirmation_status, "not yet final");
                }
                Ok(None) => debug!(signature, "signature not yet visible"),
                Err(e) => warn!(signature, error = %e, "signature status poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(signature, timeout_secs = timeout.as_secs(), "finality wait timed out");
                return Ok(Finality::TimedOut);
            }
            sleep(poll.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(rpc_url: String, commitment: Commitment) -> LedgerRpcConfig {
        LedgerRpcConfig {
            rpc_url,
            timeout_ms: 1_000,
            poll_interval_ms: 10,
            commitment,
        }
    }

    fn status_body(status: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "context": { "slot": 10 }, "value": [status] }
        })
    }

    #[tokio::test]
    async fn submit_returns_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "method": "sendTransaction" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": "ledgerSig456"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ledger = JsonRpcLedger::new(test_config(server.uri(), Commitment::Finalized)).unwrap();
        let sig = ledger.submit(b"signed").await.unwrap();
        assert_eq!(sig, "ledgerSig456");
    }

    #[tokio::test]
    async fn submit_rpc_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": -32002, "message": "Blockhash not found" }
            })))
            .mount(&server)
            .await;

        let ledger = JsonRpcLedger::new(test_config(server.uri(), Commitment::Finalized)).unwrap();
        let err = ledger.submit(b"signed").await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Rpc {
                code: -32002,
                message: "Blockhash not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn finality_reached_at_target_commitment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "method": "getSignatureStatuses" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(serde_json::json!({
                "slot": 42, "confirmations": null, "err": null, "confirmationStatus": "finalized"
            }))))
            .mount(&server)
            .await;

        let ledger = JsonRpcLedger::new(test_config(server.uri(), Commitment::Confirmed)).unwrap();
        let result = ledger.await_finality("sig", Duration::from_secs(1)).await.unwrap();
        assert_eq!(result, Finality::Finalized { slot: Some(42) });
    }

    #[tokio::test]
    async fn finality_times_out_when_below_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(serde_json::json!({
                "slot": 42, "confirmations": 3, "err": null, "confirmationStatus": "confirmed"
            }))))
            .mount(&server)
            .await;

        let ledger = JsonRpcLedger::new(test_config(server.uri(), Commitment::Finalized)).unwrap();
        let result = ledger.await_finality("sig", Duration::from_millis(50)).await.unwrap();
        assert_eq!(result, Finality::TimedOut);
    }

    #[tokio::test]
    async fn finality_keeps_polling_through_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(serde_json::Value::Null)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(serde_json::json!({
                "slot": 7, "err": null, "confirmationStatus": "finalized"
            }))))
            .mount(&server)
            .await;

        let ledger = JsonRpcLedger::new(test_config(server.uri(), Commitment::Finalized)).unwrap();
        let result = ledger.await_finality("sig", Duration::from_secs(2)).await.unwrap();
        assert_eq!(result, Finality::Finalized { slot: Some(7) });
    }

    #[tokio::test]
    async fn ledger_error_status_is_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body(serde_json::json!({
                "slot": 9, "err": { "InstructionError": [0, "Custom"] }, "confirmationStatus": "confirmed"
            }))))
            .mount(&server)
            .await;

        let ledger = JsonRpcLedger::new(test_config(server.uri(), Commitment::Finalized)).unwrap();
        let result = ledger.await_finality("sig", Duration::from_secs(1)).await.unwrap();
        assert!(matches!(result, Finality::Failed { .. }));
    }

    #[test]
    fn commitment_ordering() {
        assert!(Commitment::Finalized > Commitment::Confirmed);
        assert!(Commitment::Confirmed > Commitment::Processed);
        assert_eq!("confirmed".parse::<Commitment>(), Ok(Commitment::Confirmed));
    }

    #[test]
    fn config_rejects_empty_url() {
        let result = JsonRpcLedger::new(test_config(String::new(), Commitment::Finalized));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
