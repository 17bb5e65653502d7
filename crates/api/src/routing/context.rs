//! Typed tenant context carried through the request
//!
//! The resolver attaches a [`RequestContext`] to every non-asset request, both
//! as a request extension (for handlers in this process) and as headers (for
//! anything across a process boundary).

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue},
};

use crate::error::ApiError;

use super::classifier::SUPERADMIN_SUBDOMAIN;

/// Header carrying the subdomain type tag
pub const SUBDOMAIN_TYPE_HEADER: HeaderName = HeaderName::from_static("x-subdomain-type");
/// Header carrying the raw subdomain
pub const SUBDOMAIN_HEADER: HeaderName = HeaderName::from_static("x-subdomain");
/// Header carrying the organization slug (tenant requests only)
pub const ORGANIZATION_SLUG_HEADER: HeaderName = HeaderName::from_static("x-organization-slug");

/// Login page every unauthenticated gated request is sent to
pub const LOGIN_PATH: &str = "/login";

/// Only tenant paths under this prefix need a session
pub const TENANT_PROTECTED_PREFIX: &str = "/dashboard";

/// Classification of an inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdomainType {
    Marketing,
    Tenant,
    Superadmin,
}

impl SubdomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubdomainType::Marketing => "marketing",
            SubdomainType::Tenant => "tenant",
            SubdomainType::Superadmin => "superadmin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "marketing" => Some(SubdomainType::Marketing),
            "tenant" => Some(SubdomainType::Tenant),
            "superadmin" => Some(SubdomainType::Superadmin),
            _ => None,
        }
    }
}

/// Resolved tenant context of one request.
///
/// The organization slug only exists on the `Tenant` variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// Root marketing site
    Marketing,
    /// A customer organization's subdomain
    Tenant { slug: String },
    /// Platform operator area
    Superadmin,
}

impl RequestContext {
    pub fn subdomain_type(&self) -> SubdomainType {
        match self {
            RequestContext::Marketing => SubdomainType::Marketing,
            RequestContext::Tenant { .. } => SubdomainType::Tenant,
            RequestContext::Superadmin => SubdomainType::Superadmin,
        }
    }

    pub fn subdomain(&self) -> Option<&str> {
        match self {
            RequestContext::Marketing => None,
            RequestContext::Tenant { slug } => Some(slug),
            RequestContext::Superadmin => Some(SUPERADMIN_SUBDOMAIN),
        }
    }

    pub fn organization_slug(&self) -> Option<&str> {
        match self {
            RequestContext::Tenant { slug } => Some(slug),
            _ => None,
        }
    }

    /// Whether `path` may only be served with a valid session
    pub fn requires_session(&self, path: &str) -> bool {
        match self {
            RequestContext::Superadmin => !is_login_path(path),
            RequestContext::Tenant { .. } => path.starts_with(TENANT_PROTECTED_PREFIX),
            RequestContext::Marketing => false,
        }
    }

    /// Replace any context headers on `headers` with this context
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        strip_context_headers(headers);

        headers.insert(
            SUBDOMAIN_TYPE_HEADER,
            HeaderValue::from_static(self.subdomain_type().as_str()),
        );

        // Subdomains are limited to [A-Za-z0-9_-] by the classifier
        if let Some(Ok(value)) = self.subdomain().map(HeaderValue::from_str) {
            headers.insert(SUBDOMAIN_HEADER, value);
        }
        if let Some(Ok(value)) = self.organization_slug().map(HeaderValue::from_str) {
            headers.insert(ORGANIZATION_SLUG_HEADER, value);
        }
    }

    /// Rebuild a context from boundary headers written by [`Self::write_headers`].
    ///
    /// Returns `None` when the headers are absent or inconsistent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let kind = headers
            .get(&SUBDOMAIN_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(SubdomainType::parse)?;
        let slug = headers
            .get(&ORGANIZATION_SLUG_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());

        match (kind, slug) {
            (SubdomainType::Tenant, Some(slug)) => Some(RequestContext::Tenant {
                slug: slug.to_string(),
            }),
            (SubdomainType::Marketing, None) => Some(RequestContext::Marketing),
            (SubdomainType::Superadmin, None) => Some(RequestContext::Superadmin),
            _ => None,
        }
    }
}

/// Remove client-supplied context headers so they cannot be spoofed
pub fn strip_context_headers(headers: &mut HeaderMap) {
    headers.remove(&SUBDOMAIN_TYPE_HEADER);
    headers.remove(&SUBDOMAIN_HEADER);
    headers.remove(&ORGANIZATION_SLUG_HEADER);
}

fn is_login_path(path: &str) -> bool {
    path == LOGIN_PATH
        || path
            .strip_prefix(LOGIN_PATH)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestContext>().cloned().ok_or_else(|| {
            tracing::error!("RequestContext missing - is the tenant gate layer installed?");
            ApiError::Internal
        })
    }
}
