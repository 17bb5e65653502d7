//! Organization routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tipjar_shared::{validate_org_slug, MemberRole, Organization, UserRole};
use uuid::Uuid;

use crate::{
    auth::CurrentPrincipal,
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::tenant::TenantOrg;

const MAX_ORG_NAME_LEN: usize = 100;

#[derive(Debug, Deserialize)]
pub struct CreateOrgRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct CreateOrgResponse {
    pub success: bool,
    pub organization: Organization,
}

/// GET /api/organizations/current - organization behind the tenant subdomain
pub async fn current_org(TenantOrg(organization): TenantOrg) -> Json<Organization> {
    Json(organization)
}

/// POST /api/organizations - create an organization owned by the caller
pub async fn create_org(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(req): Json<CreateOrgRequest>,
) -> ApiResult<Json<CreateOrgResponse>> {
    // Organizations belong to user accounts, not the shared admin login
    let user_id = principal.user_id.ok_or(ApiError::Forbidden)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Business name is required".to_string()));
    }
    if name.chars().count() > MAX_ORG_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Business name must be at most {MAX_ORG_NAME_LEN} characters"
        )));
    }

    let slug = req.slug.trim();
    validate_org_slug(slug).map_err(|e| ApiError::Validation(e.to_string()))?;

    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM organizations WHERE slug = $1")
        .bind(slug)
        .fetch_optional(&state.pool)
        .await?;

    if existing.is_some() {
        return Err(ApiError::BadRequest("This URL is already taken".to_string()));
    }

    let mut tx = state.pool.begin().await?;

    let organization: Organization = sqlx::query_as(
        r#"
        INSERT INTO organizations (name, slug)
        VALUES ($1, $2)
        RETURNING id, name, slug, logo_url, primary_color, secondary_color, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(slug)
    .fetch_one(&mut *tx)
    .await?;

    let email = principal.email.clone().unwrap_or_default();
    let display_name = email.split('@').next().unwrap_or_default().to_string();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&display_name)
    .bind(UserRole::CustomerAdmin.as_str())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO organization_members (organization_id, user_id, role)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(organization.id)
    .bind(user_id)
    .bind(MemberRole::Owner.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    // Drop any cached "no such organization" for this subdomain
    state.directory.invalidate(slug);

    tracing::info!(
        org_id = %organization.id,
        slug = %organization.slug,
        owner = %user_id,
        "Organization created"
    );

    Ok(Json(CreateOrgResponse {
        success: true,
        organization,
    }))
}
