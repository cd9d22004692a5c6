//! HTTP client for the MintCraft remote authority
//!
//! The authority speaks tRPC over plain HTTP: mutations are `POST
//! {base}/{procedure}` with the raw JSON input as body, queries are `GET
//! {base}/{procedure}`. Responses are wrapped as `{"result":{"data":…}}` or
//! `{"error":{"message":…,"data":{"code":…}}}`.
//!
//! Every request identifies the caller by wallet address in the
//! `x-wallet-address` header and as a bearer token. Mutations are never
//! retried here; the model catalog query retries with backoff.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::authority::{AuthorityError, BeginResponse, RemoteAuthority};
use crate::precondition::AiModel;
use crate::types::{ConfigScope, OperationKind, OperationParams, PendingId, SettlementResult};

const MODELS_PROCEDURE: &str = "aiModelRouter.getAll";

/// Procedure names for one operation kind
struct Procedures {
    begin: &'static str,
    /// Field of the begin response holding the pending id
    pending_field: &'static str,
}

fn procedures(params: &OperationParams) -> Procedures {
    match params {
        OperationParams::ConfigInit { scope } => Procedures {
            begin: match scope {
                ConfigScope::Content => "contentRouter.initilizeUserConfig",
                ConfigScope::Marketplace => "marketplaceRouter.initilizeUserConfig",
            },
            pending_field: "",
        },
        OperationParams::ContentGeneration(_) => Procedures {
            begin: "contentRouter.generate",
            pending_field: "pendingContentId",
        },
        OperationParams::NftMint(_) => Procedures {
            begin: "contentRouter.mintAsNft",
            pending_field: "pendingNftId",
        },
        OperationParams::NftListing(_) => Procedures {
            begin: "marketplaceRouter.listNft",
            pending_field: "pendingListId",
        },
    }
}

fn confirm_procedure(kind: OperationKind) -> Option<(&'static str, &'static str)> {
    match kind {
        OperationKind::ConfigInit => None,
        OperationKind::ContentGeneration => {
            Some(("contentRouter.confirmContentSubmission", "pendingContentId"))
        }
        OperationKind::NftMint => Some(("contentRouter.confirmNFTSubmission", "pendingNftId")),
        OperationKind::NftListing => Some(("marketplaceRouter.confirmListing", "pendingListId")),
    }
}

fn begin_input(params: &OperationParams) -> Value {
    match params {
        OperationParams::ConfigInit { .. } => Value::Null,
        OperationParams::ContentGeneration(req) => json!({
            "aiModelId": req.model_id,
            "prompt": req.prompt,
            "contentType": req.content_type,
            "name": req.name,
            "description": req.description,
        }),
        OperationParams::NftMint(req) => json!({
            "contentId": req.content_id,
            "name": req.name,
            "symbol": req.symbol,
            "royaltyPercentage": req.royalty_percentage,
        }),
        OperationParams::NftListing(req) => json!({
            "marketplaceId": req.marketplace_id,
            "nft_mint_address": req.mint_address,
            "price": req.price,
        }),
    }
}

/// Pending ids arrive as JSON numbers or strings; keep them as text.
fn pending_id_from(value: &Value) -> Option<PendingId> {
    match value {
        Value::Number(n) => Some(PendingId::new(n.to_string())),
        Value::String(s) if !s.is_empty() => Some(PendingId::new(s.clone())),
        _ => None,
    }
}

/// Send a pending id back in the form the authority issued it
fn pending_id_value(id: &PendingId) -> Value {
    id.as_str()
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(id.as_str().to_string()))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    result: Option<EnvelopeResult>,
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeResult {
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    message: String,
    #[serde(default)]
    data: Option<EnvelopeErrorData>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeErrorData {
    code: Option<String>,
}

/// Configuration for the authority client
#[derive(Debug, Clone)]
pub struct AuthorityRpcConfig {
    /// Base URL of the tRPC endpoint, e.g. `http://localhost:4000/trpc`
    pub base_url: String,
    pub timeout: Duration,
    /// Attempts for idempotent queries
    pub query_attempts: u32,
    pub query_backoff: Duration,
}

impl AuthorityRpcConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            query_attempts: 3,
            query_backoff: Duration::from_millis(250),
        }
    }
}

/// tRPC-over-HTTP client for the remote authority
pub struct AuthorityRpcClient {
    cfg: AuthorityRpcConfig,
    http: reqwest::Client,
    wallet_address: String,
    /// Content URIs announced by `generate`, keyed by pending id
    announced_uris: Mutex<HashMap<PendingId, String>>,
}

impl AuthorityRpcClient {
    pub fn new(cfg: AuthorityRpcConfig, wallet_address: impl Into<String>) -> Result<Self, AuthorityError> {
        if cfg.base_url.trim().is_empty() {
            return Err(AuthorityError::Config("authority base URL is empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| AuthorityError::Config(format!("failed to build http client: {e}")))?;
        info!(url = %cfg.base_url, "authority client ready");
        Ok(Self {
            cfg,
            http,
            wallet_address: wallet_address.into(),
            announced_uris: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, procedure: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), procedure)
    }

    fn with_identity(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let address = &self.wallet_address;
        if address.is_empty() {
            return req;
        }
        req.header("x-wallet", address)
            .header("x-wallet-address", address)
            .bearer_auth(address)
    }

    async fn decode(procedure: &str, resp: reqwest::Response) -> Result<Value, AuthorityError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthorityError::Network(e.to_string()))?;

        let envelope: Option<Envelope> = serde_json::from_str(&body).ok();
        match envelope {
            Some(Envelope {
                error: Some(err), ..
            }) => Err(AuthorityError::Rejected {
                procedure: procedure.to_string(),
                code: err
                    .data
                    .and_then(|d| d.code)
                    .unwrap_or_else(|| status.as_u16().to_string()),
                message: err.message,
            }),
            _ if !status.is_success() => Err(AuthorityError::HttpStatus {
                status: status.as_u16(),
                message: body,
            }),
            Some(Envelope {
                result: Some(result),
                ..
            }) => Ok(result.data),
            _ => Err(AuthorityError::Decode(format!(
                "{procedure}: response is not a result envelope"
            ))),
        }
    }

    async fn mutation(&self, procedure: &str, input: Value) -> Result<Value, AuthorityError> {
        debug!(procedure, "authority mutation");
        let mut req = self.with_identity(self.http.post(self.url(procedure)));
        req = if input.is_null() {
            req.header(reqwest::header::CONTENT_TYPE, "application/json")
        } else {
            req.json(&input)
        };
        let resp = req
            .send()
            .await
            .map_err(|e| AuthorityError::Network(e.to_string()))?;
        Self::decode(procedure, resp).await
    }

    async fn query(&self, procedure: &str) -> Result<Value, AuthorityError> {
        let attempts = self.cfg.query_attempts.max(1);
        let mut delay = self.cfg.query_backoff;
        let mut attempt = 1;
        loop {
            let result = match self
                .with_identity(self.http.get(self.url(procedure)))
                .send()
                .await
            {
                Ok(resp) => Self::decode(procedure, resp).await,
                Err(e) => Err(AuthorityError::Network(e.to_string())),
            };
            match result {
                Err(e) if attempt < attempts && is_transient(&e) => {
                    warn!(procedure, attempt, error = %e, "query failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Catalog of AI models the authority offers
    pub async fn list_models(&self) -> Result<Vec<AiModel>, AuthorityError> {
        let data = self.query(MODELS_PROCEDURE).await?;
        serde_json::from_value(data)
            .map_err(|e| AuthorityError::Decode(format!("{MODELS_PROCEDURE}: {e}")))
    }
}

fn is_transient(err: &AuthorityError) -> bool {
    match err {
        AuthorityError::Network(_) => true,
        AuthorityError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
        _ => false,
    }
}

fn ensure_success(procedure: &str, data: &Value) -> Result<(), AuthorityError> {
    if data.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(AuthorityError::Rejected {
            procedure: procedure.to_string(),
            code: "UNSUCCESSFUL".to_string(),
            message: data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("authority reported failure")
                .to_string(),
        });
    }
    Ok(())
}

fn decode_transaction(procedure: &str, data: &Value) -> Result<Vec<u8>, AuthorityError> {
    let encoded = data
        .get("serializedTransaction")
        .and_then(Value::as_str)
        .ok_or_else(|| AuthorityError::Decode(format!("{procedure}: missing serializedTransaction")))?;
    BASE64
        .decode(encoded.trim())
        .map_err(|e| AuthorityError::Decode(format!("{procedure}: transaction is not base64: {e}")))
}

#[async_trait]
impl RemoteAuthority for AuthorityRpcClient {
    async fn begin(&self, params: &OperationParams) -> Result<BeginResponse, AuthorityError> {
        let procs = procedures(params);
        let data = self.mutation(procs.begin, begin_input(params)).await?;

        if let OperationParams::ConfigInit { scope } = params {
            if data.get("alreadyExists").and_then(Value::as_bool) == Some(true) {
                return Ok(BeginResponse::AlreadySatisfied);
            }
            // no server-side pending record for config init
            return Ok(BeginResponse::Pending {
                pending_id: PendingId::new(format!("user-config-{}", scope)),
                unsigned_transaction: decode_transaction(procs.begin, &data)?,
            });
        }

        ensure_success(procs.begin, &data)?;
        let pending_id = data
            .get(procs.pending_field)
            .and_then(pending_id_from)
            .ok_or_else(|| {
                AuthorityError::Decode(format!("{}: missing {}", procs.begin, procs.pending_field))
            })?;
        let unsigned_transaction = decode_transaction(procs.begin, &data)?;

        if let Some(uri) = data.get("contentUri").and_then(Value::as_str) {
            self.announced_uris
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(pending_id.clone(), uri.to_string());
        }
        debug!(procedure = procs.begin, pending_id = %pending_id, "pending operation issued");
        Ok(BeginResponse::Pending {
            pending_id,
            unsigned_transaction,
        })
    }

    async fn confirm(
        &self,
        kind: OperationKind,
        pending_id: &PendingId,
        signature: &str,
    ) -> Result<SettlementResult, AuthorityError> {
        let Some((procedure, id_field)) = confirm_procedure(kind) else {
            return Ok(SettlementResult::ConfigInitialized);
        };
        let mut input = json!({ "transactionSignature": signature });
        input[id_field] = pending_id_value(pending_id);

        let data = self.mutation(procedure, input).await?;
        ensure_success(procedure, &data)?;

        match kind {
            OperationKind::ContentGeneration => {
                let content = data.get("content");
                let announced = self
                    .announced_uris
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(pending_id);
                let content_uri = content
                    .and_then(|c| c.get("contentUri"))
                    .or_else(|| data.get("contentUri"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or(announced)
                    .ok_or_else(|| AuthorityError::Decode(format!("{procedure}: missing contentUri")))?;
                Ok(SettlementResult::ContentGenerated {
                    content_id: content.and_then(|c| c.get("id")).and_then(Value::as_u64),
                    content_uri,
                })
            }
            OperationKind::NftMint => {
                let mint_address = data
                    .get("nft")
                    .and_then(|n| n.get("mintAddress"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| AuthorityError::Decode(format!("{procedure}: missing nft.mintAddress")))?;
                Ok(SettlementResult::NftMinted {
                    mint_address: mint_address.to_string(),
                })
            }
            OperationKind::NftListing => Ok(SettlementResult::NftListed {
                listing_id: data
                    .get("listing")
                    .and_then(|l| l.get("id"))
                    .and_then(pending_id_from)
                    .map(|id| id.to_string()),
            }),
            OperationKind::ConfigInit => Ok(SettlementResult::ConfigInitialized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentRequest, ListingRequest};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDR: &str = "DLkK7oCoDct33byQ3uiLfSVTZTM988EJDksjfte7UN6m";

    fn client(server: &MockServer) -> AuthorityRpcClient {
        let mut cfg = AuthorityRpcConfig::new(format!("{}/trpc", server.uri()));
        cfg.query_backoff = Duration::from_millis(5);
        AuthorityRpcClient::new(cfg, ADDR).unwrap()
    }

    fn ok(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "result": { "data": data } }))
    }

    #[tokio::test]
    async fn generate_then_confirm_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/contentRouter.generate"))
            .and(header("x-wallet-address", ADDR))
            .and(header("authorization", format!("Bearer {}", ADDR).as_str()))
            .respond_with(ok(json!({
                "success": true,
                "pendingContentId": 7,
                "serializedTransaction": "AQAB",
                "contentUri": "https://cdn.example/img.png"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/trpc/contentRouter.confirmContentSubmission"))
            .and(body_json(json!({
                "transactionSignature": "ledgerSig456",
                "pendingContentId": 7
            })))
            .respond_with(ok(json!({ "success": true, "content": { "id": 12 } })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let params = OperationParams::ContentGeneration(ContentRequest::image(1, "a red fox"));
        let begin = client.begin(&params).await.unwrap();
        assert_eq!(
            begin,
            BeginResponse::Pending {
                pending_id: PendingId::new("7"),
                unsigned_transaction: vec![0x01, 0x00, 0x01],
            }
        );

        let result = client
            .confirm(OperationKind::ContentGeneration, &PendingId::new("7"), "ledgerSig456")
            .await
            .unwrap();
        assert_eq!(
            result,
            SettlementResult::ContentGenerated {
                content_id: Some(12),
                content_uri: "https://cdn.example/img.png".to_string()
            }
        );
    }

    #[tokio::test]
    async fn config_init_already_exists_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/marketplaceRouter.initilizeUserConfig"))
            .respond_with(ok(json!({ "alreadyExists": true })))
            .mount(&server)
            .await;

        let client = client(&server);
        let begin = client
            .begin(&OperationParams::ConfigInit {
                scope: ConfigScope::Marketplace,
            })
            .await
            .unwrap();
        assert_eq!(begin, BeginResponse::AlreadySatisfied);

        // settled locally, no request made
        let settled = client
            .confirm(OperationKind::ConfigInit, &PendingId::new("user-config-marketplace"), "sig")
            .await
            .unwrap();
        assert_eq!(settled, SettlementResult::ConfigInitialized);
    }

    #[tokio::test]
    async fn config_init_pending_gets_synthetic_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/contentRouter.initilizeUserConfig"))
            .respond_with(ok(json!({ "alreadyExists": false, "serializedTransaction": "AQID" })))
            .mount(&server)
            .await;

        let begin = client(&server)
            .begin(&OperationParams::ConfigInit {
                scope: ConfigScope::Content,
            })
            .await
            .unwrap();
        assert_eq!(
            begin,
            BeginResponse::Pending {
                pending_id: PendingId::new("user-config-content"),
                unsigned_transaction: vec![1, 2, 3],
            }
        );
    }

    #[tokio::test]
    async fn structured_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/marketplaceRouter.listNft"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "NFT not owned by wallet",
                    "code": -32600,
                    "data": { "code": "BAD_REQUEST", "httpStatus": 400 }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let params = OperationParams::NftListing(ListingRequest {
            marketplace_id: 1,
            mint_address: "So11111111111111111111111111111111111111112".into(),
            price: 1000,
        });
        let err = client(&server).begin(&params).await.unwrap_err();
        assert_eq!(
            err,
            AuthorityError::Rejected {
                procedure: "marketplaceRouter.listNft".into(),
                code: "BAD_REQUEST".into(),
                message: "NFT not owned by wallet".into(),
            }
        );
    }

    #[tokio::test]
    async fn mutation_is_not_retried_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/contentRouter.confirmNFTSubmission"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .confirm(OperationKind::NftMint, &PendingId::new("4"), "sig")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::HttpStatus { status: 502, .. }));
    }

    #[tokio::test]
    async fn unsuccessful_flag_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/contentRouter.confirmNFTSubmission"))
            .respond_with(ok(json!({ "success": false })))
            .mount(&server)
            .await;

        let err = client(&server)
            .confirm(OperationKind::NftMint, &PendingId::new("4"), "sig")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthorityError::Rejected { ref code, .. } if code == "UNSUCCESSFUL"));
    }

    #[tokio::test]
    async fn mint_confirm_returns_mint_address() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/trpc/contentRouter.confirmNFTSubmission"))
            .and(body_json(json!({ "transactionSignature": "sig", "pendingNftId": "abc" })))
            .respond_with(ok(json!({ "success": true, "nft": { "mintAddress": "Mint111" } })))
            .mount(&server)
            .await;

        let result = client(&server)
            .confirm(OperationKind::NftMint, &PendingId::new("abc"), "sig")
            .await
            .unwrap();
        assert_eq!(result.mint_address(), Some("Mint111"));
    }

    #[tokio::test]
    async fn model_query_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trpc/aiModelRouter.getAll"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/trpc/aiModelRouter.getAll"))
            .respond_with(ok(json!([
                { "id": 1, "name": "sdxl", "isActive": true, "royaltyPercentage": 5 }
            ])))
            .mount(&server)
            .await;

        let models = client(&server).list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "sdxl");
    }

    #[tokio::test]
    async fn identity_headers_carry_wallet_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trpc/aiModelRouter.getAll"))
            .and(header("x-wallet-address", ADDR))
            .and(header("authorization", format!("Bearer {}", ADDR).as_str()))
            .respond_with(ok(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).list_models().await.unwrap().is_empty());
    }
}
