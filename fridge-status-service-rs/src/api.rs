//! HTTP surface of the prediction service.
//!
//! `POST /predict/` runs the pipeline, `GET /` answers with a fixed message
//! whatever the pipeline state, and `GET /health` reports readiness.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::classifier::PredictionResult;
use crate::error::PredictionError;
use crate::schema::RawRequestRecord;
use crate::service::PredictionService;

/// Maximum accepted request body (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Fixed reply of the root endpoint
pub const ROOT_MESSAGE: &str = "Fridge post-maintenance status prediction API is up and running!";

/// Shared application state
pub struct AppState {
    pub service_name: String,
    pub service: PredictionService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service_name: impl Into<String>, service: PredictionService) -> Self {
        Self {
            service_name: service_name.into(),
            service,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: u64,
    pub status: String,
    pub pipeline_loaded: bool,
    pub persistence_enabled: bool,
    pub persisted: u64,
    pub persistence_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: u16,
}

/// Client-visible failure of a request
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        Self {
            status: err.status_code(),
            detail: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection {
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            detail: format!("Invalid request body: {}", rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                detail: self.detail,
                code: self.status.as_u16(),
            }),
        )
            .into_response()
    }
}

/// Build the CORS policy for the configured origins.
///
/// A `*` entry opens the API to any origin, without credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Create the router with all routes and middleware.
pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .route("/predict/", post(predict_handler))
        .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: ROOT_MESSAGE,
    })
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let service = &state.service;
    let pipeline_loaded = service.is_ready();
    let persistence_enabled = service.persistence_enabled();

    let status = match (pipeline_loaded, persistence_enabled) {
        (true, true) => "SERVING",
        (true, false) => "DEGRADED",
        (false, _) => "CRITICAL",
    };

    Json(HealthResponse {
        healthy: true,
        service_name: state.service_name.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        status: status.to_string(),
        pipeline_loaded,
        persistence_enabled,
        persisted: service.stats().succeeded(),
        persistence_failures: service.stats().failed(),
    })
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RawRequestRecord>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);

    let Json(record) = payload.map_err(|rejection| {
        span.in_scope(|| tracing::warn!(error = %rejection.body_text(), "malformed prediction request"));
        ApiError::from(rejection)
    })?;

    let result = span.in_scope(|| state.service.predict(&record))?;
    Ok(Json(result))
}
