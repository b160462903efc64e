//! HTTP API server
//!
//! Routing and validation only; all fleet work goes through the dispatcher.
//! Per-target outcomes are always 200-class and encoded in `results[]`;
//! request-level failures map to 400 (validation) or 404 (unknown
//! operation or TV).

pub mod health;
pub mod tv;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatch::Dispatcher;
use crate::registry::TvRegistry;
use crate::tokens::TokenStore;
use crate::{Error, Result};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<TvRegistry>,
    pub tokens: TokenStore,
    pub dispatcher: Dispatcher,
    /// Maximum targets accepted per batch request
    pub max_batch: usize,
}

/// Request-level error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error wrapper mapping gateway errors to HTTP statuses
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::OperationNotFound(_) | Error::TvNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build the full application router
#[must_use]
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .nest("/api/v1/tv", tv::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until shutdown
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(state: ApiState, host: &str, port: u16) -> Result<()> {
    let app = router(state);
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!(host, port, "tvfleet gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
