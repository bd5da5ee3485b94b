//! HTTP surface: prediction, metrics scrape, health, and the admin triggers
//! for refresh and retraining.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::artifact::LoadError;
use crate::server::gateway::{PredictError, PredictionResponse, ServingGateway};
use crate::server::loader::ModelLoader;
use crate::server::metrics::MetricsRegistry;
use crate::server::retrain::{RetrainError, RetrainingCoordinator};
use crate::store::StoreError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ServingGateway>,
    pub loader: Arc<ModelLoader>,
    pub coordinator: Arc<RetrainingCoordinator>,
    pub metrics: Arc<MetricsRegistry>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Retrain(#[from] RetrainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Predict(PredictError::Input(_)) => StatusCode::BAD_REQUEST,
            ApiError::Predict(PredictError::Schema(_)) => StatusCode::BAD_REQUEST,
            ApiError::Predict(PredictError::Prediction(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Load(LoadError::Store(StoreError::Unavailable(_))) => StatusCode::BAD_GATEWAY,
            ApiError::Load(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Retrain(RetrainError::AlreadyRunning) => StatusCode::CONFLICT,
            ApiError::Retrain(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Create the router with all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/admin/refresh", post(refresh))
        .route("/admin/retrain", post(retrain))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn predict(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let response = state.gateway.predict(&body)?;
    Ok(Json(response))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "model_version": state.loader.version(),
    }))
}

async fn refresh(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let version = state.loader.refresh().await?;
    Ok(Json(json!({ "model_version": version })))
}

async fn retrain(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let version = state.coordinator.run().await?;
    Ok(Json(json!({
        "status": "succeeded",
        "published_version": version,
    })))
}
