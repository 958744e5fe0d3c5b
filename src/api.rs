//! HTTP surface: webhook receivers, manual classification, stats,
//! analytics reports.
//!
//! Webhook handlers accept fast and process in the background: the desk
//! platform retries or disables endpoints that respond slowly, so the
//! pipeline must never run inside the request. Pipeline failures are
//! logged and land in the analytics, not in the webhook response.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::analytics::logger::now_timestamp;
use crate::analytics::Aggregator;
use crate::classify::Classifier;
use crate::desk::{parse_webhook_envelope, DeskClient};
use crate::pipeline::TicketProcessor;
use crate::routing::route;
use crate::store::CorrectionStore;

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiState {
    pub desk: Arc<DeskClient>,
    pub classifier: Arc<dyn Classifier>,
    pub processor: Arc<TicketProcessor>,
    pub corrections: Arc<CorrectionStore>,
    pub aggregator: Arc<Aggregator>,
    /// Caps concurrent background pipelines so a webhook burst cannot
    /// stack unbounded LLM calls.
    pub pipeline_permits: Arc<Semaphore>,
}

/// Build the full application router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/webhooks/desk/ticket-created",
            get(webhook_validation).post(ticket_created),
        )
        .route(
            "/webhooks/desk/ticket-updated",
            get(webhook_validation).post(ticket_updated),
        )
        .route("/classify", post(classify_adhoc))
        .route("/test-tagging/{ticket_id}", post(test_tagging))
        .route("/stats", get(stats))
        .route("/analytics/summary", get(analytics_summary))
        .route("/analytics/classifications", get(analytics_classifications))
        .route("/analytics/corrections", get(analytics_corrections))
        .route("/analytics/entities", get(analytics_entities))
        .route("/analytics/performance", get(analytics_performance))
        .route("/analytics/api-usage", get(analytics_api_usage))
        .layer(desk_cors())
        .with_state(state)
}

// ── CORS ────────────────────────────────────────────────────────────

/// Desk data-center origins allowed to call the API from widgets.
const DESK_ORIGINS: [&str; 9] = [
    "https://desk.zoho.com",
    "https://desk.zoho.eu",
    "https://desk.zoho.in",
    "https://desk.zoho.com.au",
    "https://desk.zoho.com.cn",
    "https://desk.zoho.jp",
    "https://127.0.0.1:5000",
    "http://127.0.0.1:5000",
    "http://localhost:5000",
];

fn origin_allowed(origin: &str) -> bool {
    // Widget iframes are served from per-org subdomains of
    // zappsusercontent.com, so those are matched by suffix.
    DESK_ORIGINS.contains(&origin)
        || (origin.starts_with("https://") && origin.ends_with(".zappsusercontent.com"))
}

fn desk_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            origin.to_str().is_ok_and(origin_allowed)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// ── Health ──────────────────────────────────────────────────────────

/// GET /
async fn root() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "permit-desk",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": now_timestamp(),
    }))
}

/// GET /health
///
/// Probes the desk API with a departments listing. An empty listing means
/// the token works but the org looks wrong, reported as degraded.
async fn health(State(state): State<ApiState>) -> Response {
    match state.desk.get_departments().await {
        Ok(departments) => {
            let connected = !departments.is_empty();
            Json(json!({
                "status": if connected { "healthy" } else { "degraded" },
                "desk_api": if connected { "connected" } else { "disconnected" },
                "classifier": "ready",
                "timestamp": now_timestamp(),
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "timestamp": now_timestamp(),
                })),
            )
                .into_response()
        }
    }
}

// ── Webhooks ────────────────────────────────────────────────────────

/// GET on either webhook path.
///
/// The desk platform validates a webhook URL with a GET when it is saved
/// and refuses the configuration unless it gets a 200.
async fn webhook_validation() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// POST /webhooks/desk/ticket-created
async fn ticket_created(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let event = match parse_webhook_envelope(&body) {
        Ok(event) => event,
        Err(e) => return bad_webhook(e),
    };
    info!(
        ticket_id = %event.ticket_id,
        event_type = %event.event_type,
        "Ticket-created webhook received"
    );

    let processor = state.processor.clone();
    let permits = state.pipeline_permits.clone();
    let ticket_id = event.ticket_id.clone();
    tokio::spawn(async move {
        let Ok(_permit) = permits.acquire_owned().await else {
            return;
        };
        if let Err(e) = processor.process_ticket(&ticket_id).await {
            error!(ticket_id = %ticket_id, error = %e, "Background pipeline failed");
        }
    });

    Json(json!({
        "status": "accepted",
        "ticket_id": event.ticket_id,
        "message": "Ticket queued for classification",
        "timestamp": now_timestamp(),
    }))
    .into_response()
}

/// POST /webhooks/desk/ticket-updated
///
/// Fires on every ticket update; the only ones that matter here are CSR
/// intent corrections, which the processor filters for.
async fn ticket_updated(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let event = match parse_webhook_envelope(&body) {
        Ok(event) => event,
        Err(e) => return bad_webhook(e),
    };
    info!(ticket_id = %event.ticket_id, "Ticket-updated webhook received");

    let processor = state.processor.clone();
    let ticket_id = event.ticket_id.clone();
    tokio::spawn(async move {
        if let Err(e) = processor.process_correction(&event).await {
            error!(ticket_id = %event.ticket_id, error = %e, "Correction processing failed");
        }
    });

    Json(json!({
        "status": "accepted",
        "ticket_id": ticket_id,
        "timestamp": now_timestamp(),
    }))
    .into_response()
}

fn bad_webhook(e: crate::error::DeskError) -> Response {
    warn!(error = %e, "Rejected webhook payload");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": e.to_string()})),
    )
        .into_response()
}

// ── Manual classification ───────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct ClassifyRequest {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
}

/// POST /classify: classify arbitrary text without touching a ticket.
async fn classify_adhoc(
    State(state): State<ApiState>,
    Json(request): Json<ClassifyRequest>,
) -> Response {
    match state
        .classifier
        .classify(&request.subject, &request.body, None)
        .await
    {
        Ok(classification) => {
            let queue = route(&classification);
            Json(json!({
                "classification": classification,
                "routing": {"queue": queue, "reason": queue.reason()},
                "timestamp": now_timestamp(),
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Ad-hoc classification failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": format!("Classification failed: {e}")})),
            )
                .into_response()
        }
    }
}

/// POST /test-tagging/{ticket_id}: run the full pipeline synchronously
/// against an existing ticket. Used to verify custom fields are wired up.
async fn test_tagging(State(state): State<ApiState>, Path(ticket_id): Path<String>) -> Response {
    info!(ticket_id, "Manual classify-and-tag requested");
    match state.processor.process_ticket(&ticket_id).await {
        Ok(outcome) => Json(json!({
            "ticket_id": outcome.ticket_id,
            "classification": outcome.classification,
            "routing": {"queue": outcome.queue, "reason": outcome.queue.reason()},
            "tagging_success": outcome.tagging_success,
            "timestamp": now_timestamp(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

// ── Stats and analytics ─────────────────────────────────────────────

/// GET /stats: CSR correction summary.
async fn stats(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "corrections": state.corrections.summary().await,
        "timestamp": now_timestamp(),
    }))
}

#[derive(Debug, serde::Deserialize)]
struct WindowQuery {
    /// Trailing window in days; absent means all time.
    days: Option<u32>,
}

/// GET /analytics/summary
async fn analytics_summary(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Value> {
    Json(state.aggregator.summary(query.days))
}

/// GET /analytics/classifications
async fn analytics_classifications(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Value> {
    Json(state.aggregator.classification_analytics(query.days))
}

/// GET /analytics/corrections
async fn analytics_corrections(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Value> {
    Json(state.aggregator.correction_analytics(query.days))
}

/// GET /analytics/entities
async fn analytics_entities(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Value> {
    Json(state.aggregator.entity_analytics(query.days))
}

/// GET /analytics/performance
async fn analytics_performance(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Value> {
    Json(state.aggregator.performance_analytics(query.days))
}

/// GET /analytics/api-usage
async fn analytics_api_usage(
    State(state): State<ApiState>,
    Query(query): Query<WindowQuery>,
) -> Json<Value> {
    Json(state.aggregator.api_usage_analytics(query.days))
}
