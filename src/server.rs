//! HTTP read surface
//!
//! Three routes, one shared state:
//!
//! - GET  /health          liveness probe
//! - GET  /api/best-deals  the current snapshot, verbatim
//! - POST /api/refresh     wake the scheduler early (bearer token)
//!
//! Handlers never compute anything per request beyond serializing the
//! already-built snapshot; all aggregation work happens in the
//! refresh cycle.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;

use crate::cache::SnapshotCache;
use crate::config::ServerConfig;
use crate::metrics::METRICS;

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<SnapshotCache>,
    pub refresh: Arc<Notify>,
    /// Bearer token for POST /api/refresh; `None` disables the route.
    pub admin_token: Option<String>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(serde::Serialize)]
struct RefreshAccepted {
    status: &'static str,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/best-deals", get(best_deals))
        .route("/api/refresh", post(kick_refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves until the process exits.
pub async fn serve(config: &ServerConfig, state: ApiState) -> anyhow::Result<()> {
    use anyhow::Context;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    log::info!("[server] listening on {}", config.bind);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Serves the latest snapshot, or 503 until the first cycle publishes.
async fn best_deals(State(state): State<ApiState>) -> Response {
    METRICS.http_requests.fetch_add(1, Ordering::Relaxed);

    match state.cache.current() {
        Some(snapshot) => Json(&*snapshot).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "no data yet",
            }),
        )
            .into_response(),
    }
}

/// Wakes the scheduler for an out-of-band cycle. Requires
/// `Authorization: Bearer <token>` matching the configured admin
/// token; without a configured token the route always refuses.
async fn kick_refresh(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    METRICS.http_requests.fetch_add(1, Ordering::Relaxed);

    let Some(expected) = state.admin_token.as_deref() else {
        log::warn!("[server] refresh rejected: no admin token configured");
        return unauthorized();
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => {
            state.refresh.notify_one();
            log::info!("[server] refresh kick accepted");
            (
                StatusCode::ACCEPTED,
                Json(RefreshAccepted {
                    status: "refresh scheduled",
                }),
            )
                .into_response()
        }
        _ => {
            log::warn!("[server] refresh rejected: bad or missing bearer token");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized",
        }),
    )
        .into_response()
}
