//! # HTTP API
//!
//! REST surface under `/api/v1`, plus `/healthz`.
//!
//! Request pipeline, outermost first:
//! 1. Request tracing
//! 2. CORS
//! 3. Global rate limit (429)
//! 4. API key check, when a key is configured (401)
//! 5. Kill-switch gate: mutating requests are refused with 423 while the
//!    kill switch is active, except on the kill switch itself

pub mod automation;
pub mod devices;
pub mod error;
pub mod events;
pub mod scenes;
pub mod sensors;
pub mod system;
pub mod zones;

pub use error::{ApiError, ApiResult};

use crate::state::AppState;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use subtle::ConstantTimeEq;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Prefix of every API route.
pub const API_PREFIX: &str = "/api/v1";

/// Build the full application router.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/health", get(system::health))
        // Zones
        .route("/zones", get(zones::list_zones).post(zones::create_zone))
        .route("/zones/{id}", get(zones::get_zone))
        // Devices & outlets
        .route("/devices", get(devices::list_devices))
        .route("/devices/{id}", get(devices::get_device))
        .route("/devices/{id}/outlets", get(devices::list_outlets))
        .route(
            "/devices/{id}/outlets/{outlet_id}/switch",
            post(devices::switch_outlet),
        )
        .route(
            "/devices/{id}/outlets/{outlet_id}/config",
            put(devices::configure_outlet),
        )
        .route(
            "/devices/{id}/outlets/{outlet_id}/override",
            delete(devices::clear_override),
        )
        .route("/devices/{id}/switch-all", post(devices::switch_device))
        .route(
            "/devices/zone/{zone_id}/switch-all",
            post(devices::switch_zone),
        )
        // Sensors
        .route("/sensors/ingest", post(sensors::ingest))
        .route("/sensors/zone/{id}", get(sensors::list_zone_sensors))
        .route("/sensors/zone/{id}/latest", get(sensors::latest_for_zone))
        // Scenes & rules
        .route(
            "/scenes/zone/{zone_id}",
            get(scenes::list_scenes).post(scenes::create_scene),
        )
        .route(
            "/scenes/{id}",
            get(scenes::get_scene)
                .put(scenes::update_scene)
                .delete(scenes::delete_scene),
        )
        .route(
            "/scenes/{id}/rules",
            get(scenes::list_rules).post(scenes::create_rule),
        )
        .route(
            "/scenes/rules/{rule_id}",
            put(scenes::update_rule).delete(scenes::delete_rule),
        )
        .route("/scenes/{id}/activate", post(scenes::activate_scene))
        .route("/scenes/{id}/deactivate", post(scenes::deactivate_scene))
        .route("/scenes/{id}/evaluate", post(scenes::evaluate_scene))
        // Automation sessions
        .route(
            "/automation/zone/{id}/status",
            get(automation::session_status),
        )
        .route("/automation/zone/{id}/start", post(automation::start_session))
        .route("/automation/zone/{id}/stop", post(automation::stop_session))
        .route("/automation/zone/{id}/history", get(automation::history))
        // Safety & system
        .route(
            "/kill",
            get(system::kill_status)
                .post(system::activate_kill)
                .delete(system::deactivate_kill),
        )
        .route("/audit", get(system::audit_log))
        .route("/snapshot", get(system::snapshot))
        .route("/events/sse", get(events::sse));

    Router::new()
        .route("/healthz", get(system::health))
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            kill_switch_gate,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

fn is_health_path(path: &str) -> bool {
    path == "/healthz" || path == "/api/v1/health"
}

async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            return ApiError::rate_limited().into_response();
        }
    }
    next.run(req).await
}

fn provided_key(req: &Request) -> Option<&str> {
    let headers = req.headers();
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(req).await;
    };
    if is_health_path(req.uri().path()) || req.method() == Method::OPTIONS {
        return next.run(req).await;
    }
    let authorized = provided_key(&req)
        .is_some_and(|key| bool::from(key.as_bytes().ct_eq(expected.as_bytes())));
    if !authorized {
        return ApiError::unauthorized("missing or invalid API key").into_response();
    }
    next.run(req).await
}

async fn kill_switch_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method();
    let read_only = method == Method::GET || method == Method::HEAD || method == Method::OPTIONS;
    let path = req.uri().path();
    let exempt = path.starts_with("/api/v1/kill") || is_health_path(path);
    if !read_only && !exempt && state.home().await.kill_switch().active {
        return ApiError::locked("kill switch is active, all operations are disabled")
            .into_response();
    }
    next.run(req).await
}
