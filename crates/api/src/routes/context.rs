//! Resolved request context, as seen by handlers

use axum::Json;
use serde::Serialize;

use crate::routing::RequestContext;

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub subdomain_type: &'static str,
    pub subdomain: Option<String>,
    pub organization_slug: Option<String>,
}

/// Echo the context the tenant gate attached to this request
pub async fn current_context(context: RequestContext) -> Json<ContextResponse> {
    Json(ContextResponse {
        subdomain_type: context.subdomain_type().as_str(),
        subdomain: context.subdomain().map(str::to_string),
        organization_slug: context.organization_slug().map(str::to_string),
    })
}
