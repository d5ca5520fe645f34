//! # REST + WebSocket API
//!
//! The axum router over the ledger and both registries. Writes are signed
//! with the node's own identity.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                        |
//! |--------|-----------------------------|------------------------------------|
//! | GET    | `/health`                   | Liveness probe                     |
//! | GET    | `/status`                   | Height, tip, difficulty, identity  |
//! | GET    | `/chain/verify`             | Full chain audit                   |
//! | POST   | `/content`                  | Register content as a new block    |
//! | GET    | `/content/:id`              | Block by id                        |
//! | GET    | `/content/:id/verify`       | Verify a block                     |
//! | GET    | `/content/:id/history`      | Block and its revisions            |
//! | POST   | `/content/:id/revisions`    | Register a revision                |
//! | POST   | `/certificates`             | Issue an access certificate        |
//! | GET    | `/certificates/:id`         | Certificate with derived state     |
//! | GET    | `/certificates/:id/verify`  | Verify a certificate               |
//! | POST   | `/certificates/:id/revoke`  | Revoke a certificate               |
//! | POST   | `/copyrights`               | Register a copyright               |
//! | GET    | `/copyrights/:id`           | Copyright record                   |
//! | POST   | `/copyrights/:id/transfer`  | Transfer a copyright               |
//! | GET    | `/ws`                       | Live ledger events                 |

use std::sync::Arc;
use std::time::Instant;

use attest_protocol::config::{DEFAULT_CERTIFICATE_TTL, PROTOCOL_VERSION};
use attest_protocol::identity::{IdentityProvider, LocalIdentity};
use attest_protocol::ledger::{Block, BlockContent, ChainReport, Ledger};
use attest_protocol::{LedgerError, LedgerResult};
use attest_registry::{
    CertificateRegistry, CertificateState, CopyrightRecord, CopyrightRegistration,
    CopyrightRegistry, CopyrightTransfer, DigitalCertificate, Permission, RegistryError,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::SharedMetrics;

/// Capacity of the event channel feeding WebSocket subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub ledger: Arc<Ledger>,
    pub certificates: Arc<CertificateRegistry>,
    pub copyrights: Arc<CopyrightRegistry>,
    /// Signs every write made through the API.
    pub identity: Arc<LocalIdentity>,
    pub event_tx: broadcast::Sender<NodeEvent>,
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(
        ledger: Arc<Ledger>,
        certificates: Arc<CertificateRegistry>,
        copyrights: Arc<CopyrightRegistry>,
        identity: Arc<LocalIdentity>,
        metrics: SharedMetrics,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        metrics
            .chain_height
            .set(ledger.len().saturating_sub(1) as i64);
        Self {
            version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
            ledger,
            certificates,
            copyrights,
            identity,
            event_tx,
            metrics,
        }
    }

    fn publish(&self, event: NodeEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    /// Record metrics and publish the event for a finished append.
    fn finish_append(
        &self,
        result: LedgerResult<Block>,
        started: Instant,
    ) -> Result<Block, ApiError> {
        match result {
            Ok(block) => {
                let height = self.ledger.height_of(&block.id).unwrap_or_default();
                self.metrics.record_block(height, started.elapsed());
                self.publish(NodeEvent::BlockCreated {
                    id: block.id.clone(),
                    hash: block.hash.clone(),
                    previous_hash: block.previous_hash.clone(),
                    height: height as u64,
                    timestamp: block.timestamp,
                });
                Ok(block)
            }
            Err(e) => {
                if matches!(e, LedgerError::MiningTimeout { .. }) {
                    self.metrics.mining_timeouts_total.inc();
                }
                Err(e.into())
            }
        }
    }
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    BlockCreated {
        id: String,
        hash: String,
        previous_hash: String,
        height: u64,
        timestamp: u64,
    },
    CertificateIssued {
        id: String,
        content_id: String,
        owner: String,
    },
    CertificateRevoked {
        id: String,
        content_id: String,
    },
    CopyrightRegistered {
        id: String,
        content_id: String,
        owner: String,
    },
    CopyrightTransferred {
        id: String,
        transfer_id: String,
        from: String,
        to: String,
    },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all routes, CORS and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/chain/verify", get(chain_verify_handler))
        .route("/content", post(create_content_handler))
        .route("/content/:id", get(content_handler))
        .route("/content/:id/verify", get(content_verify_handler))
        .route("/content/:id/history", get(content_history_handler))
        .route("/content/:id/revisions", post(create_revision_handler))
        .route("/certificates", post(issue_certificate_handler))
        .route("/certificates/:id", get(certificate_handler))
        .route("/certificates/:id/verify", get(certificate_verify_handler))
        .route("/certificates/:id/revoke", post(revoke_certificate_handler))
        .route("/copyrights", post(register_copyright_handler))
        .route("/copyrights/:id", get(copyright_handler))
        .route("/copyrights/:id/transfer", post(transfer_copyright_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Generic error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Registry(RegistryError),
    NotFound(String),
    Invalid(String),
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Ledger(e)
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Registry(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(e) => match e {
                LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::MiningTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                LedgerError::MiningAborted(_)
                | LedgerError::Storage(_)
                | LedgerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Registry(e) => match e {
                RegistryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
                RegistryError::Duplicate { .. } => StatusCode::CONFLICT,
                RegistryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
                RegistryError::Storage(_) | RegistryError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Ledger(e) => e.to_string(),
            ApiError::Registry(e) => e.to_string(),
            ApiError::NotFound(what) => format!("{what} not found"),
            ApiError::Invalid(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self.message(), "request failed");
        }
        (status, Json(ErrorResponse { error: self.message() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Height of the tip; genesis is 0.
    pub height: u64,
    pub tip_hash: String,
    pub difficulty: u32,
    /// Address the node signs with.
    pub identity: String,
    pub timestamp: String,
}

/// Body of `POST /content` and `POST /content/:id/revisions`.
#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl From<ContentRequest> for BlockContent {
    fn from(req: ContentRequest) -> Self {
        BlockContent {
            title: req.title,
            body: req.body,
            author: req.author,
            metadata: req.metadata,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub id: String,
    pub valid: bool,
}

/// Body of `POST /certificates`.
#[derive(Debug, Deserialize)]
pub struct IssueCertificateRequest {
    pub content_id: String,
    pub permissions: Vec<Permission>,
    pub owner: String,
    /// Lifetime in milliseconds; may be negative. Defaults to one year.
    #[serde(default)]
    pub ttl_ms: Option<i64>,
    #[serde(default)]
    pub never_expires: bool,
}

impl IssueCertificateRequest {
    fn ttl(&self) -> Result<Option<chrono::Duration>, ApiError> {
        if self.never_expires {
            return Ok(None);
        }
        match self.ttl_ms {
            Some(ms) => chrono::Duration::try_milliseconds(ms)
                .map(Some)
                .ok_or_else(|| ApiError::Invalid(format!("ttl_ms {ms} is out of range"))),
            None => chrono::Duration::from_std(DEFAULT_CERTIFICATE_TTL)
                .map(Some)
                .map_err(|e| ApiError::Invalid(e.to_string())),
        }
    }
}

/// A certificate together with its state at the time of the request.
#[derive(Debug, Serialize, Deserialize)]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: DigitalCertificate,
    pub state: CertificateState,
    pub valid: bool,
}

/// Body of `POST /copyrights/:id/transfer`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub terms: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers: node & chain
// ---------------------------------------------------------------------------

/// `GET /health`: liveness only.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let tip = state.ledger.tip();
    Json(StatusResponse {
        version: state.version.clone(),
        height: state.ledger.len().saturating_sub(1) as u64,
        tip_hash: tip.hash,
        difficulty: state.ledger.config().difficulty,
        identity: state.identity.current_address(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /chain/verify`: audits every block. Always 200; check `valid`.
async fn chain_verify_handler(State(state): State<AppState>) -> Json<ChainReport> {
    let report = state.ledger.chain_report();
    if !report.valid {
        tracing::warn!(faults = report.faults.len(), "chain audit failed");
    }
    Json(report)
}

// ---------------------------------------------------------------------------
// Handlers: content
// ---------------------------------------------------------------------------

async fn create_content_handler(
    State(state): State<AppState>,
    Json(req): Json<ContentRequest>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let started = Instant::now();
    let result = state
        .ledger
        .create_block(req.into(), state.identity.as_ref())
        .await;
    let block = state.finish_append(result, started)?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn create_revision_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ContentRequest>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let started = Instant::now();
    let result = state
        .ledger
        .create_revision(&id, req.into(), state.identity.as_ref())
        .await;
    let block = state.finish_append(result, started)?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn content_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Block>, ApiError> {
    state
        .ledger
        .get_block(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("content {id}")))
}

/// Unknown ids verify as `false`, not 404.
async fn content_verify_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<VerifyResponse> {
    let valid = state.ledger.verify_content(&id);
    Json(VerifyResponse { id, valid })
}

async fn content_history_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<Vec<Block>> {
    Json(state.ledger.get_history(&id))
}

// ---------------------------------------------------------------------------
// Handlers: certificates
// ---------------------------------------------------------------------------

async fn issue_certificate_handler(
    State(state): State<AppState>,
    Json(req): Json<IssueCertificateRequest>,
) -> Result<(StatusCode, Json<DigitalCertificate>), ApiError> {
    let ttl = req.ttl()?;
    let cert = state.certificates.issue_certificate(
        &req.content_id,
        req.permissions,
        state.identity.as_ref(),
        &req.owner,
        ttl,
    )?;

    state.metrics.certificates_issued_total.inc();
    state.publish(NodeEvent::CertificateIssued {
        id: cert.id.clone(),
        content_id: cert.content_id.clone(),
        owner: cert.owner.clone(),
    });
    Ok((StatusCode::CREATED, Json(cert)))
}

async fn certificate_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CertificateView>, ApiError> {
    let certificate = state
        .certificates
        .get_certificate(&id)
        .ok_or_else(|| ApiError::NotFound(format!("certificate {id}")))?;
    let now = chrono::Utc::now();
    Ok(Json(CertificateView {
        state: certificate.state_at(now),
        valid: state.certificates.verify_certificate_at(&id, now),
        certificate,
    }))
}

async fn certificate_verify_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<VerifyResponse> {
    let valid = state.certificates.verify_certificate(&id);
    Json(VerifyResponse { id, valid })
}

async fn revoke_certificate_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DigitalCertificate>, ApiError> {
    let (cert, changed) = state.certificates.revoke_certificate(&id)?;

    if changed {
        state.metrics.certificates_revoked_total.inc();
        state.publish(NodeEvent::CertificateRevoked {
            id: cert.id.clone(),
            content_id: cert.content_id.clone(),
        });
    }
    Ok(Json(cert))
}

// ---------------------------------------------------------------------------
// Handlers: copyrights
// ---------------------------------------------------------------------------

async fn register_copyright_handler(
    State(state): State<AppState>,
    Json(registration): Json<CopyrightRegistration>,
) -> Result<(StatusCode, Json<CopyrightRecord>), ApiError> {
    let record = state.copyrights.register_copyright(registration)?;

    state.metrics.copyrights_registered_total.inc();
    state.publish(NodeEvent::CopyrightRegistered {
        id: record.id.clone(),
        content_id: record.content_id.clone(),
        owner: record.owner.clone(),
    });
    Ok((StatusCode::CREATED, Json(record)))
}

async fn copyright_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<CopyrightRecord>, ApiError> {
    state
        .copyrights
        .get_copyright(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("copyright {id}")))
}

/// Only succeeds while the node's identity owns the copyright.
async fn transfer_copyright_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<CopyrightTransfer>, ApiError> {
    let transfer = state.copyrights.transfer_copyright(
        &id,
        state.identity.as_ref(),
        &req.to,
        req.price,
        req.terms.as_deref(),
    )?;

    state.metrics.copyright_transfers_total.inc();
    state.publish(NodeEvent::CopyrightTransferred {
        id,
        transfer_id: transfer.id.clone(),
        from: transfer.from.clone(),
        to: transfer.to.clone(),
    });
    Ok(Json(transfer))
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// `GET /ws`: JSON-encoded [`NodeEvent`]s. Client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
