//! Public employee self-signup on a tenant subdomain

use axum::{extract::State, Json};
use tipjar_shared::EmployeeStatus;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

use super::{
    employees::{ensure_locations_in_org, insert_employee, EmployeeFields},
    tenant::TenantOrg,
    SuccessResponse,
};

/// POST /api/signup - submit a profile for approval
pub async fn signup(
    State(state): State<AppState>,
    TenantOrg(organization): TenantOrg,
    Json(fields): Json<EmployeeFields>,
) -> ApiResult<Json<SuccessResponse>> {
    let employee = fields.clean()?;

    if !employee.has_payment_handle() {
        return Err(ApiError::Validation(
            "At least one payment method is required".to_string(),
        ));
    }
    if employee.location_ids.is_empty() {
        return Err(ApiError::Validation("At least one location is required".to_string()));
    }
    ensure_locations_in_org(&state.pool, organization.id, &employee.location_ids).await?;

    let mut tx = state.pool.begin().await?;
    let employee_id =
        insert_employee(&mut tx, organization.id, &employee, EmployeeStatus::Pending).await?;
    tx.commit().await?;

    tracing::info!(
        org_id = %organization.id,
        employee_id = %employee_id,
        "Employee signed up, awaiting approval"
    );

    Ok(Json(SuccessResponse::ok()))
}
