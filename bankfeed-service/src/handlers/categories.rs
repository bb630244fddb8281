//! Category reference-data handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::CreateCategoryRequest;
use crate::middleware::TenantContext;
use crate::models::Category;
use crate::startup::AppState;

pub async fn create_category(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    payload.validate()?;

    let category = state
        .db
        .create_category(
            tenant.tenant_id,
            &payload.name,
            payload.kind,
            payload.color.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = state.db.list_categories(tenant.tenant_id).await?;

    Ok(Json(categories))
}
