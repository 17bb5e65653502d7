//! Principal extractor for API handlers

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{
    cookies::{CookieJar, ResponseCookies},
    identity::{authenticate, Authentication, Principal},
};
use crate::{error::ApiError, state::AppState};

/// The authenticated caller.
///
/// Reuses the principal the tenant gate already resolved for this request;
/// otherwise asks the configured identity provider and queues any refreshed
/// session cookies for the response. Rejects with 401.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(CurrentPrincipal(principal.clone()));
        }

        let cookies = CookieJar::from_headers(&parts.headers);
        match authenticate(state.identity.as_ref(), &cookies).await {
            Authentication::Authenticated(session) => {
                if !session.refreshed_cookies.is_empty() {
                    // The old refresh token is spent once rotated
                    match parts.extensions.get::<ResponseCookies>() {
                        Some(queue) => queue.extend(session.refreshed_cookies),
                        None => tracing::warn!("Refreshed session cookies have no response to ride on"),
                    }
                }
                parts.extensions.insert(session.principal.clone());
                Ok(CurrentPrincipal(session.principal))
            }
            Authentication::Unauthenticated => Err(ApiError::Unauthorized),
        }
    }
}
