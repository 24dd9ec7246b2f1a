use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::observability::{MetricsRegistry, TimingGuard};
use crate::policy::DecisionEngine;

use super::request::ImageReview;
use super::response::{ErrorResponse, HealthResponse, ImageReviewResponse, ReadyResponse};

/// Shared application state.
pub struct AppState {
    /// Decision engine wrapping the shared store handle
    pub engine: DecisionEngine,

    /// Request counters
    pub metrics: MetricsRegistry,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

impl AppState {
    pub fn new(engine: DecisionEngine) -> Self {
        AppState {
            engine,
            metrics: MetricsRegistry::new(),
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/review", post(handle_review))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle image review requests.
async fn handle_review(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ImageReview>, JsonRejection>,
) -> Response {
    let _timer = TimingGuard::new(&state.metrics);

    let Json(review) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            state.metrics.record_bad_request();
            warn!(error = %rejection.body_text(), "Rejected malformed review");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    let start = Instant::now();
    let request = review.to_review_request();

    match state.engine.review(&request).await {
        Ok(decision) => {
            state.metrics.record_decision(&decision);
            info!(
                namespace = %request.namespace,
                images = ?request.images,
                decision = %decision,
                latency_ms = start.elapsed().as_millis(),
                "Review completed"
            );

            (
                StatusCode::OK,
                Json(ImageReviewResponse::new(
                    review.kind,
                    review.api_version,
                    decision,
                )),
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.record_failure();
            error!(
                namespace = %request.namespace,
                error = %e,
                retryable = e.is_retryable(),
                "Review failed"
            );

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint; ready when the rule store answers.
async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.store().list(1).await {
        Ok(listing) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                rules: listing.total,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Rule store not reachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = state.metrics.to_prometheus(
        state.start_time.elapsed().as_secs(),
        state.engine.invalid_patterns(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}
