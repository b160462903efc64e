//! TV fleet endpoints
//!
//! - `GET /list` - configured TVs with pairing status
//! - `GET /{tv_id}` - one TV or 404
//! - `POST /validate` - per-id existence report
//! - `POST /pair` - concurrent pairing batch
//! - `POST /execute/{operation}` - generic operation dispatch
//! - `POST /reload` - atomic fleet reload

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiState};
use crate::dispatch::BatchResult;
use crate::registry::{TvRegistry, TvStatus};
use crate::Error;

/// Build the TV router
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/list", get(list_tvs))
        .route("/validate", post(validate_tvs))
        .route("/pair", post(pair_tvs))
        .route("/execute/{operation}", post(execute_operation))
        .route("/reload", post(reload_fleet))
        .route("/{tv_id}", get(get_tv))
        .with_state(state)
}

// === Request/Response types ===

/// Target list shared by pair and validate requests
#[derive(Debug, Deserialize)]
pub struct TargetsRequest {
    pub tv_ids: Vec<String>,
}

/// Generic execute request; operation name comes from the path
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub tv_ids: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_concurrent")]
    pub concurrent: bool,
}

const fn default_concurrent() -> bool {
    true
}

/// Fleet listing response
#[derive(Debug, Serialize)]
pub struct TvListResponse {
    pub tvs: Vec<TvStatus>,
    pub count: usize,
}

/// One id's validation verdict
#[derive(Debug, Serialize)]
pub struct Validation {
    pub tv_id: String,
    pub exists: bool,
    pub message: &'static str,
}

/// Validation batch response
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub validations: Vec<Validation>,
    pub summary: String,
    pub all_valid: bool,
}

/// Reload response
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub count: usize,
}

/// Reject malformed target lists before any dispatch work
///
/// Duplicates are allowed for generic execution (independent invocations)
/// but rejected for pairing, where re-running the handshake twice in one
/// batch is always a caller mistake.
fn validate_targets(
    tv_ids: &[String],
    max_batch: usize,
    allow_duplicates: bool,
) -> Result<(), Error> {
    if tv_ids.is_empty() {
        return Err(Error::Validation("tv_ids cannot be empty".to_string()));
    }
    if tv_ids.len() > max_batch {
        return Err(Error::Validation(format!(
            "cannot target more than {max_batch} TVs at once"
        )));
    }
    if tv_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(Error::Validation("tv_ids cannot contain blank ids".to_string()));
    }
    if !allow_duplicates {
        let mut seen = std::collections::HashSet::new();
        for id in tv_ids {
            if !seen.insert(id.as_str()) {
                return Err(Error::Validation(format!("duplicate tv_id: {id}")));
            }
        }
    }
    Ok(())
}

/// Check each id against the registry; shared by the endpoint and the CLI
#[must_use]
pub fn validation_report(registry: &TvRegistry, tv_ids: &[String]) -> ValidationResponse {
    let validations: Vec<Validation> = tv_ids
        .iter()
        .map(|tv_id| {
            let exists = registry.contains(tv_id);
            Validation {
                tv_id: tv_id.clone(),
                exists,
                message: if exists {
                    "TV ID is valid"
                } else {
                    "TV ID not found in configuration"
                },
            }
        })
        .collect();

    let valid_count = validations.iter().filter(|v| v.exists).count();
    let total = validations.len();
    ValidationResponse {
        summary: format!("{valid_count}/{total} TV IDs are valid"),
        all_valid: valid_count == total,
        validations,
    }
}

// === Handlers ===

async fn list_tvs(State(state): State<ApiState>) -> Json<TvListResponse> {
    let tvs = state.registry.list_with_pairing(&state.tokens).await;
    let count = tvs.len();
    Json(TvListResponse { tvs, count })
}

async fn get_tv(
    State(state): State<ApiState>,
    Path(tv_id): Path<String>,
) -> Result<Json<TvStatus>, ApiError> {
    let tv = state.registry.lookup(&tv_id)?;
    let token = state.tokens.get(&tv.id).await;
    Ok(Json(TvStatus {
        tv_id: tv.id,
        name: tv.name,
        host: tv.host,
        port: tv.port,
        mac_address: tv.mac_address,
        is_paired: token.is_some(),
        paired_at: token.map(|t| t.paired_at),
    }))
}

async fn validate_tvs(
    State(state): State<ApiState>,
    Json(request): Json<TargetsRequest>,
) -> Result<Json<ValidationResponse>, ApiError> {
    validate_targets(&request.tv_ids, state.max_batch, true)?;
    Ok(Json(validation_report(&state.registry, &request.tv_ids)))
}

async fn pair_tvs(
    State(state): State<ApiState>,
    Json(request): Json<TargetsRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    validate_targets(&request.tv_ids, state.max_batch, false)?;
    let batch = state
        .dispatcher
        .run("pair", &request.tv_ids, &[], true)
        .await?;
    Ok(Json(batch))
}

async fn execute_operation(
    State(state): State<ApiState>,
    Path(operation): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    validate_targets(&request.tv_ids, state.max_batch, true)?;
    let batch = state
        .dispatcher
        .run(&operation, &request.tv_ids, &request.args, request.concurrent)
        .await?;
    Ok(Json(batch))
}

async fn reload_fleet(State(state): State<ApiState>) -> Result<Json<ReloadResponse>, ApiError> {
    let count = state.registry.reload()?;
    Ok(Json(ReloadResponse { count }))
}
