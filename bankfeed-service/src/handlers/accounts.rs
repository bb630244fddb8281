//! Bank account registry handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::{AccountListResponse, RegisterAccountRequest};
use crate::middleware::TenantContext;
use crate::models::BankAccount;
use crate::startup::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ListAccountsQuery {
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

pub async fn register_account(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<RegisterAccountRequest>,
) -> Result<(StatusCode, Json<BankAccount>), AppError> {
    payload.validate()?;

    let account = state
        .db
        .create_bank_account(
            tenant.tenant_id,
            &payload.bank_name,
            &payload.account_number_masked,
            &payload.currency,
        )
        .await?;

    tracing::info!(
        bank_account_id = %account.bank_account_id,
        tenant_id = %tenant.tenant_id,
        "Bank account registered"
    );

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(account_id): Path<Uuid>,
) -> Result<Json<BankAccount>, AppError> {
    let account = state
        .db
        .get_bank_account(tenant.tenant_id, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bank account not found")))?;

    Ok(Json(account))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListAccountsQuery>,
) -> Result<Json<AccountListResponse>, AppError> {
    let (accounts, next_page_token) = state
        .db
        .list_bank_accounts(
            tenant.tenant_id,
            query.page_size.unwrap_or(50),
            query.page_token,
        )
        .await?;

    Ok(Json(AccountListResponse {
        accounts,
        next_page_token,
    }))
}
