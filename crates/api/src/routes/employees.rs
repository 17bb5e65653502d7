//! Employee routes (tenant-scoped)
//!
//! Employees are created by tenant admins (approved by default) or through the
//! public signup form (pending until approved here).

use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tipjar_shared::{Employee, EmployeeStatus};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::{tenant::TenantAdmin, SuccessResponse};

/// Employee profile fields shared by the admin and signup forms
#[derive(Debug, Default, Deserialize)]
pub struct EmployeeFields {
    #[serde(default)]
    pub name: String,
    pub bio: Option<String>,
    pub venmo: Option<String>,
    pub cashapp: Option<String>,
    pub zelle: Option<String>,
    /// Already-uploaded photo; stored as given
    pub photo_url: Option<String>,
    #[serde(default)]
    pub location_ids: Vec<Uuid>,
}

/// Profile after trimming; blank optional fields become `None`
#[derive(Debug, PartialEq, Eq)]
pub struct CleanEmployee {
    pub name: String,
    pub bio: Option<String>,
    pub venmo: Option<String>,
    pub cashapp: Option<String>,
    pub zelle: Option<String>,
    pub photo_url: Option<String>,
    pub location_ids: Vec<Uuid>,
}

impl CleanEmployee {
    pub fn has_payment_handle(&self) -> bool {
        self.venmo.is_some() || self.cashapp.is_some() || self.zelle.is_some()
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl EmployeeFields {
    /// Trim fields and require a name
    pub fn clean(self) -> ApiResult<CleanEmployee> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::Validation("Name is required".to_string()));
        }

        let location_ids: Vec<Uuid> = self
            .location_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(CleanEmployee {
            name,
            bio: clean(self.bio),
            venmo: clean(self.venmo),
            cashapp: clean(self.cashapp),
            zelle: clean(self.zelle),
            photo_url: clean(self.photo_url),
            location_ids,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    #[serde(flatten)]
    pub fields: EmployeeFields,
    pub status: Option<EmployeeStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeRequest {
    #[serde(flatten)]
    pub fields: EmployeeFields,
    /// Unchanged when omitted
    pub status: Option<EmployeeStatus>,
}

#[derive(Debug, Serialize)]
pub struct CreateEmployeeResponse {
    pub success: bool,
    pub id: Uuid,
}

/// Every location must belong to the organization
pub async fn ensure_locations_in_org(
    pool: &PgPool,
    org_id: Uuid,
    location_ids: &[Uuid],
) -> ApiResult<()> {
    if location_ids.is_empty() {
        return Ok(());
    }

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM locations WHERE organization_id = $1 AND id = ANY($2)",
    )
    .bind(org_id)
    .bind(location_ids)
    .fetch_one(pool)
    .await?;

    if count != location_ids.len() as i64 {
        return Err(ApiError::Validation("Unknown location".to_string()));
    }
    Ok(())
}

/// Insert an employee and link it to its locations
pub async fn insert_employee(
    tx: &mut Transaction<'_, Postgres>,
    org_id: Uuid,
    employee: &CleanEmployee,
    status: EmployeeStatus,
) -> ApiResult<Uuid> {
    let (employee_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO employees (name, bio, venmo, cashapp, zelle, photo_url, status, organization_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(&employee.name)
    .bind(&employee.bio)
    .bind(&employee.venmo)
    .bind(&employee.cashapp)
    .bind(&employee.zelle)
    .bind(&employee.photo_url)
    .bind(status.as_str())
    .bind(org_id)
    .fetch_one(&mut **tx)
    .await?;

    link_locations(tx, employee_id, &employee.location_ids).await?;
    Ok(employee_id)
}

async fn link_locations(
    tx: &mut Transaction<'_, Postgres>,
    employee_id: Uuid,
    location_ids: &[Uuid],
) -> ApiResult<()> {
    if location_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO employee_locations (employee_id, location_id)
        SELECT $1, UNNEST($2::uuid[])
        "#,
    )
    .bind(employee_id)
    .bind(location_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListEmployeesQuery {
    pub status: Option<String>,
}

impl ListEmployeesQuery {
    /// Status filter; blank means every status
    pub fn status_filter(&self) -> ApiResult<Option<EmployeeStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => EmployeeStatus::parse(raw)
                .map(Some)
                .ok_or_else(|| ApiError::Validation(format!("Unknown employee status: {raw}"))),
        }
    }
}

/// Employee row plus the locations it works at
#[derive(Debug, Serialize, FromRow)]
pub struct EmployeeListing {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub employee: Employee,
    pub location_ids: Vec<Uuid>,
}

/// GET /api/employees?status= - the organization's employees
///
/// The pending queue lists newest signups first; other listings are by name.
pub async fn list_employees(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Query(query): Query<ListEmployeesQuery>,
) -> ApiResult<Json<Vec<EmployeeListing>>> {
    let status = query.status_filter()?;
    let order = match status {
        Some(EmployeeStatus::Pending) => "e.created_at DESC",
        _ => "e.name",
    };

    let employees: Vec<EmployeeListing> = sqlx::query_as(&format!(
        r#"
        SELECT e.id, e.name, e.photo_url, e.bio, e.venmo, e.cashapp, e.zelle,
               e.status, e.organization_id, e.created_at,
               ARRAY(
                   SELECT el.location_id FROM employee_locations el
                   WHERE el.employee_id = e.id
               ) AS location_ids
        FROM employees e
        WHERE e.organization_id = $1 AND ($2::text IS NULL OR e.status = $2)
        ORDER BY {order}
        "#
    ))
    .bind(tenant.organization.id)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(employees))
}

/// POST /api/employees
pub async fn create_employee(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Json(req): Json<CreateEmployeeRequest>,
) -> ApiResult<Json<CreateEmployeeResponse>> {
    let org_id = tenant.organization.id;
    let employee = req.fields.clean()?;

    if employee.location_ids.is_empty() {
        return Err(ApiError::Validation("At least one location is required".to_string()));
    }
    ensure_locations_in_org(&state.pool, org_id, &employee.location_ids).await?;

    let status = req.status.unwrap_or_default();

    let mut tx = state.pool.begin().await?;
    let employee_id = insert_employee(&mut tx, org_id, &employee, status).await?;
    tx.commit().await?;

    tracing::info!(
        org_id = %org_id,
        employee_id = %employee_id,
        status = status.as_str(),
        "Employee created"
    );

    Ok(Json(CreateEmployeeResponse {
        success: true,
        id: employee_id,
    }))
}

/// PUT /api/employees/:id - update profile and replace location links
pub async fn update_employee(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Path(employee_id): Path<Uuid>,
    Json(req): Json<UpdateEmployeeRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let org_id = tenant.organization.id;
    let employee = req.fields.clean()?;
    ensure_locations_in_org(&state.pool, org_id, &employee.location_ids).await?;

    let mut tx = state.pool.begin().await?;

    // A new photo replaces the old one; omitting it keeps the current photo
    let result = sqlx::query(
        r#"
        UPDATE employees
        SET name = $1, bio = $2, venmo = $3, cashapp = $4, zelle = $5,
            photo_url = COALESCE($6, photo_url),
            status = COALESCE($7, status)
        WHERE id = $8 AND organization_id = $9
        "#,
    )
    .bind(&employee.name)
    .bind(&employee.bio)
    .bind(&employee.venmo)
    .bind(&employee.cashapp)
    .bind(&employee.zelle)
    .bind(&employee.photo_url)
    .bind(req.status.map(|s| s.as_str()))
    .bind(employee_id)
    .bind(org_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    sqlx::query("DELETE FROM employee_locations WHERE employee_id = $1")
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;
    link_locations(&mut tx, employee_id, &employee.location_ids).await?;

    tx.commit().await?;

    Ok(Json(SuccessResponse::ok()))
}

/// DELETE /api/employees/:id (location links cascade)
pub async fn delete_employee(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Path(employee_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let org_id = tenant.organization.id;

    sqlx::query("DELETE FROM employees WHERE id = $1 AND organization_id = $2")
        .bind(employee_id)
        .bind(org_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// POST /api/employees/:id/approve
pub async fn approve_employee(
    State(state): State<AppState>,
    tenant: TenantAdmin,
    Path(employee_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse>> {
    let org_id = tenant.organization.id;

    let result = sqlx::query("UPDATE employees SET status = $1 WHERE id = $2 AND organization_id = $3")
        .bind(EmployeeStatus::Approved.as_str())
        .bind(employee_id)
        .bind(org_id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    tracing::info!(org_id = %org_id, employee_id = %employee_id, "Employee approved");
    Ok(Json(SuccessResponse::ok()))
}
