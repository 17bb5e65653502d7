//! Location routes (tenant-scoped)

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tipjar_shared::{generate_slug, EmployeeStatus, Location, Organization};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::{
    tenant::{TenantAdmin, TenantOrg},
    SuccessResponse,
};

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    #[serde(default)]
    pub name: String,
}

/// Validated name and derived slug
fn name_and_slug(req: &LocationRequest) -> ApiResult<(&str, String)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }

    let slug = generate_slug(name);
    if slug.is_empty() {
        return Err(ApiError::Validation(
            "Name must contain at least one letter or number".to_string(),
        ));
    }

    Ok((name, slug))
}

/// Reject a slug already used by another location of the organization
async fn ensure_slug_free(
    pool: &PgPool,
    org_id: Uuid,
    slug: &str,
    except: Option<Uuid>,
) -> ApiResult<()> {
    let existing: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM locations
        WHERE organization_id = $1 AND slug = $2 AND ($3::uuid IS NULL OR id <> $3)
        "#,
    )
    .bind(org_id)
    .bind(slug)
    .bind(except)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Err(ApiError::BadRequest(
            "A location with a similar name already exists".to_string(),
        ));
    }
    Ok(())
}

/// Location with its count of approved employees
#[derive(Debug, Serialize, FromRow)]
pub struct LocationSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub location: Location,
    pub approved_employees: i64,
}

/// What a customer sees when tipping: only what they need to pay someone
#[derive(Debug, Serialize, FromRow)]
pub struct TippableEmployee {
    pub id: Uuid,
    pub name: String,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub venmo: Option<String>,
    pub cashapp: Option<String>,
    pub zelle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TippingPage {
    pub organization: Organization,
    pub location: Location,
    /// Every location of the organization, for switching between them
    pub locations: Vec<Location>,
    pub employees: Vec<TippableEmployee>,
}

/// GET /api/locations - the organization's locations by name
pub async fn list_locations(
    State(state): State<AppState>,
    tenant: TenantAdmin,
) -> ApiResult<Json<Vec<LocationSummary>>> {
    let locations: Vec<LocationSummary> = sqlx::query_as(
        r#"
        SELECT l.id, l.name, l.slug, l.organization_id, l.created_at,
               COUNT(e.id) AS approved_employees
        FROM locations l
        LEFT JOIN employee_locations el ON el.location_id = l.id
        LEFT JOIN employees e ON e.id = el.employee_id AND e.status = $2
        WHERE l.organization_id = $1
        GROUP BY l.id
        ORDER BY l.name
        "#,
    )
    .bind(tenant.organization.id)
    .bind(EmployeeStatus::Approved.as_str())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(locations))
}

/// GET /api/locations/:slug - public tipping page for one location
///
/// Only approved employees are listed.
pub async fn tipping_page(
    State(state): State<AppState>,
    TenantOrg(organization): TenantOrg,
    Path(slug): Path<String>,
) -> ApiResult<Json<TippingPage>> {
    // Anything generate_slug would not produce cannot name a location
    let slug = slug.trim().to_ascii_lowercase();
    if slug.is_empty() || generate_slug(&slug) != slug {
        return Err(ApiError::NotFound);
    }

    let location: Location = sqlx::query_as(
        r#"
        SELECT id, name, slug, organization_id, created_at
        FROM locations
        WHERE organization_id = $1 AND slug = $2
        "#,
    )
    .bind(organization.id)
    .bind(&slug)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound)?;

    let locations: Vec<Location> = sqlx::query_as(
        r#"
        SELECT id, name, slug, organization_id, created_at
        FROM locations
        WHERE organization_id = $1
        ORDER BY name
        "#,
    )
    .bind(organization.id)
    .fetch_all(&state.pool)
    .await?;

    let employees: Vec<TippableEmployee> = sqlx::query_as(
        r#"
        SELECT e.id, e.name, e.photo_url, e.bio, e.venmo, e.cashapp, e.zelle
        FROM employees e
        JOIN employee_locations el ON el.employee_id = e.id
        WHERE el.location_id = $1 AND e.organization_id = $2 AND e.status = $3
        ORDER BY e.name
        "#,
    )
    .bind(location.id)
    .bind(organization.id)
    .bind(EmployeeStatus::Approved.as_str())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(TippingPage {
        organization,
        location,
        locations,
        employees,
    }))
}

/// POST /api/locations
pub async fn create_location(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Json<Location>> {
    let org_id = tenant.organization.id;
    let (name, slug) = name_and_slug(&req)?;

    ensure_slug_free(&state.pool, org_id, &slug, None).await?;

    let location: Location = sqlx::query_as(
        r#"
        INSERT INTO locations (name, slug, organization_id)
        VALUES ($1, $2, $3)
        RETURNING id, name, slug, organization_id, created_at
        "#,
    )
    .bind(name)
    .bind(&slug)
    .bind(org_id)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(org_id = %org_id, location_id = %location.id, slug = %slug, "Location created");

    Ok(Json(location))
}

/// PUT /api/locations/:id - rename (and reslug) a location
pub async fn update_location(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Path(location_id): Path<Uuid>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let org_id = tenant.organization.id;
    let (name, slug) = name_and_slug(&req)?;

    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM locations WHERE id = $1 AND organization_id = $2")
            .bind(location_id)
            .bind(org_id)
            .fetch_optional(&state.pool)
            .await?;

    if existing.is_none() {
        return Err(ApiError::NotFound);
    }

    ensure_slug_free(&state.pool, org_id, &slug, Some(location_id)).await?;

    sqlx::query("UPDATE locations SET name = $1, slug = $2 WHERE id = $3 AND organization_id = $4")
        .bind(name)
        .bind(&slug)
        .bind(location_id)
        .bind(org_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// DELETE /api/locations/:id
pub async fn delete_location(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Path(location_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let org_id = tenant.organization.id;

    let result = sqlx::query("DELETE FROM locations WHERE id = $1 AND organization_id = $2")
        .bind(location_id)
        .bind(org_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() > 0 {
        tracing::info!(org_id = %org_id, location_id = %location_id, "Location deleted");
    }

    Ok(Json(SuccessResponse::ok()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn req(name: &str) -> LocationRequest {
        LocationRequest { name: name.into() }
    }

    #[test]
    fn test_name_and_slug() {
        let r = req("  Main St. Café ");
        let (name, slug) = name_and_slug(&r).unwrap();
        assert_eq!(name, "Main St. Café");
        assert_eq!(slug, "main-st-caf");

        assert!(matches!(name_and_slug(&req("   ")), Err(ApiError::Validation(_))));
        assert!(matches!(name_and_slug(&req("!!!")), Err(ApiError::Validation(_))));
    }
}
