//! API routes

pub mod auth;
pub mod context;
pub mod employees;
pub mod health;
pub mod locations;
pub mod organizations;
pub mod signup;
pub mod tenant;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::{
    error::ApiError, routing::tenant_gate, security::security_headers_middleware, state::AppState,
};

/// `{"success": true}` body returned by mutations without a payload
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    // Health checks sit outside the tenant gate so probes work on any host
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_routes = Router::new()
        // Legacy shared admin password
        .route("/auth", post(auth::login).delete(auth::logout))
        .route("/context", get(context::current_context))
        .route("/organizations", post(organizations::create_org))
        .route("/organizations/current", get(organizations::current_org))
        .route(
            "/locations",
            get(locations::list_locations).post(locations::create_location),
        )
        // GET takes a location slug (public tipping page), PUT/DELETE an id
        .route(
            "/locations/:location",
            get(locations::tipping_page)
                .put(locations::update_location)
                .delete(locations::delete_location),
        )
        .route(
            "/employees",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route(
            "/employees/:id",
            put(employees::update_employee).delete(employees::delete_employee),
        )
        .route("/employees/:id/approve", post(employees::approve_employee))
        // Public, tenant subdomain only
        .route("/signup", post(signup::signup));

    // Everything else (pages included) is classified and gated; unknown
    // paths that get past the gate are 404s.
    let gated = Router::new()
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn_with_state(state.gate_state(), tenant_gate));

    Router::new()
        .merge(health_routes)
        .merge(gated)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
