// src/services/api_server.rs
//! API Server for the diploma system
//!
//! REST interface over the issuer, verifier, keyring and record store. QR
//! texts travel as plain strings in JSON bodies so a scanner front end can
//! pass them through untouched.
//!
//! Endpoints:
//! - diploma issuance, QR import and listing
//! - usage-right delegation ("sell diplomas") and claim import
//! - verification and reimbursement of claims
//! - skill documents on the content store
//! - keyring accounts, backup export and import

use crate::encoding::qr::{letter_to_text, QrPayload};
use crate::error::ProtocolError;
use crate::models::keys::{Amount, ContentId, PublicKeyBytes, SignatureBytes};
use crate::services::diploma_issuer::{DiplomaIssuer, IssueRequest};
use crate::services::verifier::{Verdict, Verifier};
use crate::storage::ContentStore;
use crate::wallet::backup::Backup;
use crate::wallet::credential_storage::RecordStore;
use crate::wallet::key_management::KeyManager;
use axum::{
    body::Bytes,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

type ApiResponse = (StatusCode, Json<Value>);

/// Request payload for issuing a diploma
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueDiplomaRequest {
    referee: PublicKeyBytes,
    worker: PublicKeyBytes,
    worker_id: String,
    cid: ContentId,
    amount: Option<Amount>,
    days_valid: Option<u64>,
}

/// Request payload carrying scanned QR text
#[derive(Deserialize)]
struct QrRequest {
    qr: String,
}

/// Request payload for delegating letters to an employer
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SellDiplomasRequest {
    worker: PublicKeyBytes,
    name: Option<String>,
    employer: PublicKeyBytes,
    /// Receipt signatures of the letters to delegate
    letters: Vec<SignatureBytes>,
}

#[derive(Deserialize)]
struct WorkerQuery {
    worker: Option<PublicKeyBytes>,
}

#[derive(Deserialize)]
struct CreateAccountRequest {
    name: String,
}

fn verdict_json(verdict: &Verdict) -> Value {
    json!({ "valid": verdict.is_valid(), "verdict": verdict.to_string() })
}

/// Status code and body for a failed operation.
fn error_response(e: &ProtocolError) -> ApiResponse {
    let status = match e {
        ProtocolError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        ProtocolError::SignerUnavailable(_) => StatusCode::LOCKED,
        ProtocolError::BlockTimeUnknown => StatusCode::SERVICE_UNAVAILABLE,
        ProtocolError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProtocolError::Expired { .. } => StatusCode::GONE,
        ProtocolError::AlreadyUsed => StatusCode::CONFLICT,
        ProtocolError::Chain(_) | ProtocolError::Storage(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!("api: {}", e);
    }
    (status, Json(json!({ "error": e.to_string() })))
}

fn not_found(what: &str) -> ApiResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{} not found", what) })))
}

/// Shared state of all handlers.
#[derive(Clone)]
pub struct ApiServer {
    issuer: Arc<DiplomaIssuer>,
    verifier: Arc<Verifier>,
    key_manager: KeyManager,
    store: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
}

impl ApiServer {
    /// Creates the server state from the protocol services.
    ///
    /// # Arguments
    /// * `issuer` - Issues and delegates letters
    /// * `verifier` - Verifies and reimburses claims
    /// * `key_manager` - Accounts listed and created through `/accounts`
    /// * `store` - Record store behind the list, import and backup routes
    /// * `content` - Skill documents
    pub fn new(
        issuer: DiplomaIssuer,
        verifier: Verifier,
        key_manager: KeyManager,
        store: Arc<dyn RecordStore>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        ApiServer {
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
            key_manager,
            store,
            content,
        }
    }

    /// Builds the route table over a shared copy of the state.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/letters", post(Self::issue_handler).get(Self::list_letters_handler))
            .route("/letters/import", post(Self::import_letter_handler))
            .route("/letters/sell", post(Self::sell_diplomas_handler))
            .route("/letters/:sign/verify", get(Self::verify_letter_handler))
            .route("/insurances", get(Self::list_insurances_handler))
            .route("/insurances/import", post(Self::import_insurances_handler))
            .route("/insurances/:sign/verify", get(Self::verify_insurance_handler))
            .route("/insurances/:sign/reimburse", post(Self::reimburse_handler))
            .route("/skills", post(Self::store_skill_handler))
            .route("/skills/:cid", get(Self::fetch_skill_handler))
            .route("/accounts", get(Self::list_accounts_handler).post(Self::create_account_handler))
            .route("/backup", get(Self::export_backup_handler).post(Self::import_backup_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Binds `addr` and serves until the process stops.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("api: listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    // =====================
    // Diploma Handlers
    // =====================

    /// Issues a diploma.
    ///
    /// # Endpoint
    /// POST /letters
    ///
    /// # Responses
    /// - 200 OK: the letter and its ADD_DIPLOMA QR text
    /// - 423 Locked: referee account locked
    /// - 503 Service Unavailable: chain reports no block time
    async fn issue_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<IssueDiplomaRequest>,
    ) -> ApiResponse {
        let request = IssueRequest {
            referee: payload.referee,
            worker: payload.worker,
            worker_id: payload.worker_id,
            cid: payload.cid,
            amount: payload.amount,
            valid_for_secs: None,
            days_valid: payload.days_valid,
        };
        match state.issuer.issue(request).await {
            Ok(letter) => {
                let qr = QrPayload::AddDiploma(Box::new(letter.clone())).encode();
                (StatusCode::OK, Json(json!({ "letter": letter, "qr": qr })))
            }
            Err(e) => error_response(&e),
        }
    }

    /// GET /letters[?worker=<key>]
    async fn list_letters_handler(
        State(state): State<Arc<ApiServer>>,
        Query(query): Query<WorkerQuery>,
    ) -> ApiResponse {
        let letters = match query.worker {
            Some(worker) => state.store.letters_for_worker(&worker),
            None => state.store.letters(),
        };
        let rows: Vec<Value> = letters
            .iter()
            .map(|letter| {
                json!({
                    "letter": letter,
                    "text": letter_to_text(letter),
                    "status": state.store.letter_status(&letter.sign_over_receipt),
                })
            })
            .collect();
        (StatusCode::OK, Json(Value::Array(rows)))
    }

    /// Stores a diploma scanned by its worker.
    ///
    /// # Endpoint
    /// POST /letters/import
    ///
    /// # Responses
    /// - 200 OK: stored (or already known)
    /// - 400 Bad Request: not an ADD_DIPLOMA code
    /// - 422 Unprocessable Entity: signatures do not verify
    async fn import_letter_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<QrRequest>,
    ) -> ApiResponse {
        let letter = match QrPayload::decode(&payload.qr) {
            Ok(QrPayload::AddDiploma(letter)) => *letter,
            Ok(other) => {
                return error_response(&ProtocolError::malformed(format!(
                    "expected a diploma code, got {:?}",
                    other.action()
                )))
            }
            Err(e) => return error_response(&ProtocolError::from(e)),
        };
        let verdict = match state.verifier.verify_letter(&letter).await {
            Ok(verdict) => verdict,
            Err(e) => return error_response(&e),
        };
        if let Verdict::Invalid(reason) = verdict {
            return error_response(&ProtocolError::Invalid(reason));
        }
        let added = state.store.store_letter(letter.clone());
        (
            StatusCode::OK,
            Json(json!({ "letter": letter, "added": added, "verification": verdict_json(&verdict) })),
        )
    }

    /// Delegates a worker's letters to an employer.
    ///
    /// # Endpoint
    /// POST /letters/sell
    ///
    /// # Responses
    /// - 200 OK: SELL_DIPLOMAS QR text for the employer
    /// - 404 Not Found: an unknown letter signature
    async fn sell_diplomas_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<SellDiplomasRequest>,
    ) -> ApiResponse {
        let mut letters = Vec::with_capacity(payload.letters.len());
        for sign in &payload.letters {
            match state.store.letter(sign) {
                Some(letter) => letters.push(letter),
                None => return not_found(&format!("letter {}", sign)),
            }
        }
        match state
            .issuer
            .sell_diplomas(payload.worker, payload.name, payload.employer, &letters)
            .await
        {
            Ok(qr) => (StatusCode::OK, Json(json!({ "qr": qr, "count": letters.len() }))),
            Err(e) => error_response(&e),
        }
    }

    /// GET /letters/:sign/verify
    async fn verify_letter_handler(
        State(state): State<Arc<ApiServer>>,
        Path(sign): Path<SignatureBytes>,
    ) -> ApiResponse {
        let Some(letter) = state.store.letter(&sign) else {
            return not_found("letter");
        };
        match state.verifier.verify_letter(&letter).await {
            Ok(verdict) => (StatusCode::OK, Json(verdict_json(&verdict))),
            Err(e) => error_response(&e),
        }
    }

    // =====================
    // Insurance Handlers
    // =====================

    /// GET /insurances
    async fn list_insurances_handler(State(state): State<Arc<ApiServer>>) -> ApiResponse {
        (StatusCode::OK, Json(json!(state.store.insurances())))
    }

    /// Stores the claims of a scanned SELL_DIPLOMAS or ADD_INSURANCES code.
    ///
    /// # Endpoint
    /// POST /insurances/import
    ///
    /// Claims that fail verification are reported and skipped.
    async fn import_insurances_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<QrRequest>,
    ) -> ApiResponse {
        let insurances = match QrPayload::decode(&payload.qr) {
            Ok(QrPayload::SellDiplomas { insurances, .. })
            | Ok(QrPayload::AddInsurances { insurances, .. }) => insurances,
            Ok(other) => {
                return error_response(&ProtocolError::malformed(format!(
                    "expected an insurances code, got {:?}",
                    other.action()
                )))
            }
            Err(e) => return error_response(&ProtocolError::from(e)),
        };

        let mut results = Vec::with_capacity(insurances.len());
        for insurance in insurances {
            let verdict = match state.verifier.verify_insurance(&insurance).await {
                Ok(verdict) => verdict,
                Err(e) => return error_response(&e),
            };
            let added = match verdict {
                Verdict::Invalid(_) => false,
                _ => state.store.store_insurance(insurance.clone()),
            };
            results.push(json!({
                "workerSign": insurance.worker_sign,
                "added": added,
                "verification": verdict_json(&verdict),
            }));
        }
        (StatusCode::OK, Json(Value::Array(results)))
    }

    /// GET /insurances/:sign/verify
    async fn verify_insurance_handler(
        State(state): State<Arc<ApiServer>>,
        Path(sign): Path<SignatureBytes>,
    ) -> ApiResponse {
        let Some(insurance) = state.store.insurance(&sign) else {
            return not_found("insurance");
        };
        match state.verifier.verify_insurance(&insurance).await {
            Ok(verdict) => (StatusCode::OK, Json(verdict_json(&verdict))),
            Err(e) => error_response(&e),
        }
    }

    /// Claims the stake behind a stored insurance.
    ///
    /// # Endpoint
    /// POST /insurances/:sign/reimburse
    ///
    /// # Responses
    /// - 200 OK: transaction included
    /// - 409 Conflict: already reimbursed
    /// - 410 Gone: expired
    /// - 502 Bad Gateway: chain rejected or dropped the call
    async fn reimburse_handler(
        State(state): State<Arc<ApiServer>>,
        Path(sign): Path<SignatureBytes>,
    ) -> ApiResponse {
        let Some(insurance) = state.store.insurance(&sign) else {
            return not_found("insurance");
        };
        match state.verifier.reimburse(&insurance).await {
            Ok(reimbursement) => (StatusCode::OK, Json(json!(reimbursement))),
            Err(e) => error_response(&e),
        }
    }

    // =====================
    // Skill Handlers
    // =====================

    /// POST /skills with the raw skill document as body
    async fn store_skill_handler(State(state): State<Arc<ApiServer>>, body: Bytes) -> ApiResponse {
        match state.content.put(&body).await {
            Ok(cid) => (StatusCode::OK, Json(json!({ "cid": cid }))),
            Err(e) => error_response(&ProtocolError::from(e)),
        }
    }

    /// GET /skills/:cid
    async fn fetch_skill_handler(
        State(state): State<Arc<ApiServer>>,
        Path(cid): Path<ContentId>,
    ) -> Result<Vec<u8>, ApiResponse> {
        state.content.fetch(&cid).await.map_err(|e| error_response(&ProtocolError::from(e)))
    }

    // =====================
    // Account Handlers
    // =====================

    /// GET /accounts
    async fn list_accounts_handler(State(state): State<Arc<ApiServer>>) -> ApiResponse {
        (StatusCode::OK, Json(json!(state.key_manager.accounts())))
    }

    /// POST /accounts
    async fn create_account_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateAccountRequest>,
    ) -> ApiResponse {
        let public_key = state.key_manager.generate_account(&payload.name);
        (StatusCode::OK, Json(json!({ "publicKey": public_key })))
    }

    // =====================
    // Backup Handlers
    // =====================

    /// GET /backup
    async fn export_backup_handler(State(state): State<Arc<ApiServer>>) -> Result<String, ApiResponse> {
        Backup::export(state.store.as_ref())
            .to_json()
            .map_err(|e| error_response(&e))
    }

    /// POST /backup with an export document as body
    async fn import_backup_handler(State(state): State<Arc<ApiServer>>, body: String) -> ApiResponse {
        match Backup::from_json(&body) {
            Ok(backup) => {
                let summary = backup.import_into(state.store.as_ref());
                (StatusCode::OK, Json(json!(summary)))
            }
            Err(e) => error_response(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ChainError;
    use crate::error::InvalidReason;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ProtocolError::malformed("x"), StatusCode::BAD_REQUEST),
            (ProtocolError::SignerUnavailable("locked".into()), StatusCode::LOCKED),
            (ProtocolError::BlockTimeUnknown, StatusCode::SERVICE_UNAVAILABLE),
            (ProtocolError::Invalid(InvalidReason::WrongGenesis), StatusCode::UNPROCESSABLE_ENTITY),
            (ProtocolError::Expired { expiry_block: 1, current_block: 2 }, StatusCode::GONE),
            (ProtocolError::AlreadyUsed, StatusCode::CONFLICT),
            (ProtocolError::Chain(ChainError::Dropped), StatusCode::BAD_GATEWAY),
        ];
        for (error, status) in cases {
            assert_eq!(error_response(&error).0, status);
        }
    }

    #[test]
    fn test_verdict_body() {
        let body = verdict_json(&Verdict::AlreadyUsed);
        assert_eq!(body["valid"], false);
        assert_eq!(body["verdict"], "already used");
    }
}
