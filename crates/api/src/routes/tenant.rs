//! Tenant-scoped extractors
//!
//! `TenantOrg` resolves the organization named by the request's subdomain;
//! `TenantAdmin` additionally requires the caller to manage it.

use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::PgPool;
use tipjar_shared::{Organization, UserRole};
use uuid::Uuid;

use crate::{
    auth::{CurrentPrincipal, Principal},
    error::{ApiError, ApiResult},
    routing::RequestContext,
    state::AppState,
};

/// Organization for the current tenant subdomain
#[derive(Debug, Clone)]
pub struct TenantOrg(pub Organization);

#[axum::async_trait]
impl FromRequestParts<AppState> for TenantOrg {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let context = RequestContext::from_request_parts(parts, state).await?;
        let slug = context.organization_slug().ok_or(ApiError::TenantRequired)?;

        let organization = state
            .directory
            .lookup_organization(slug)
            .await?
            .ok_or(ApiError::OrganizationNotFound)?;

        Ok(TenantOrg(organization))
    }
}

/// Tenant organization plus a principal allowed to manage it
#[derive(Debug, Clone)]
pub struct TenantAdmin {
    pub organization: Organization,
    pub principal: Principal,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for TenantAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentPrincipal(principal) = CurrentPrincipal::from_request_parts(parts, state).await?;
        let TenantOrg(organization) = TenantOrg::from_request_parts(parts, state).await?;

        authorize_member(&state.pool, organization.id, &principal).await?;

        Ok(TenantAdmin {
            organization,
            principal,
        })
    }
}

/// Allow platform admins, super admins, and members of the organization
pub async fn authorize_member(pool: &PgPool, org_id: Uuid, principal: &Principal) -> ApiResult<()> {
    if principal.is_platform_admin() {
        return Ok(());
    }

    let user_id = principal.user_id.ok_or(ApiError::Forbidden)?;

    let (allowed,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM organization_members
            WHERE organization_id = $1 AND user_id = $2
        ) OR EXISTS (
            SELECT 1 FROM users WHERE id = $2 AND role = $3
        )
        "#,
    )
    .bind(org_id)
    .bind(user_id)
    .bind(UserRole::SuperAdmin.as_str())
    .fetch_one(pool)
    .await?;

    if !allowed {
        tracing::warn!(user_id = %user_id, org_id = %org_id, "Non-member tried to manage organization");
        return Err(ApiError::Forbidden);
    }

    Ok(())
}
