//! Statement line handlers: import, listing, suggestions, match lifecycle.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::{
    ApplyMatchRequest, ExcludeRequest, ImportRequest, ImportResponse, ListTransactionsQuery,
    StatsQuery, SuggestionsResponse, TransactionListResponse,
};
use crate::matching::suggest::suggest;
use crate::middleware::TenantContext;
use crate::models::{
    BankTransaction, MatchLink, MatchTargetKind, TransactionStats,
};
use crate::services::database::{ImportedRow, TransactionFilter};
use crate::services::metrics::{record_transaction_import, record_transaction_match};
use crate::startup::AppState;

/// Accept a pre-parsed batch of statement lines for one account.
pub async fn import_transactions(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportResponse>), AppError> {
    payload.validate()?;

    for (index, row) in payload.rows.iter().enumerate() {
        if row.amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Row {index}: amount must not be negative"
            )));
        }
    }

    // Ownership check before any write
    state
        .db
        .get_bank_account(tenant.tenant_id, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bank account not found")))?;

    let rows: Vec<ImportedRow> = payload
        .rows
        .iter()
        .map(|r| ImportedRow {
            transaction_date: r.transaction_date,
            description: r.description.clone(),
            reference: r.reference.clone(),
            amount: r.amount,
            transaction_type: r.transaction_type,
            balance: r.balance,
        })
        .collect();

    let upload = state
        .db
        .import_transactions(
            tenant.tenant_id,
            account_id,
            &payload.file_name,
            payload.bank_preset.as_deref(),
            &rows,
        )
        .await
        .inspect_err(|_| record_transaction_import("failed", rows.len() as u64))?;

    record_transaction_import("imported", upload.transaction_count as u64);

    tracing::info!(
        upload_id = %upload.upload_id,
        bank_account_id = %account_id,
        count = upload.transaction_count,
        "Statement lines imported"
    );

    let transaction_count = upload.transaction_count;
    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            upload,
            transaction_count,
        }),
    ))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(account_id): Path<Uuid>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<TransactionListResponse>, AppError> {
    state
        .db
        .get_bank_account(tenant.tenant_id, account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bank account not found")))?;

    let filter = TransactionFilter {
        match_status: query.match_status,
        transaction_type: query.transaction_type,
        reconciled: query.reconciled,
    };

    let (transactions, next_page_token) = state
        .db
        .list_transactions(
            tenant.tenant_id,
            account_id,
            filter,
            query.page_size.unwrap_or(50),
            query.page_token,
        )
        .await?;

    Ok(Json(TransactionListResponse {
        transactions,
        next_page_token,
    }))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    let transaction = state
        .db
        .get_bank_transaction(tenant.tenant_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    Ok(Json(transaction))
}

/// Ranked candidate matches for one transaction. Read-only.
pub async fn get_suggestions(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let transaction = state
        .db
        .get_bank_transaction(tenant.tenant_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    let directories = state.db.directory_snapshot(tenant.tenant_id).await?;
    let suggestions = suggest(&transaction, &directories);

    Ok(Json(SuggestionsResponse { suggestions }))
}

/// Explicitly link a transaction to an entity, document, or category.
pub async fn apply_match(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<ApplyMatchRequest>,
) -> Result<Json<BankTransaction>, AppError> {
    payload.validate()?;
    let confidence = payload.confidence.unwrap_or(1.0);

    let transaction = state
        .db
        .get_bank_transaction(tenant.tenant_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    if !transaction.transaction_type.allows_target(payload.match_type) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "A {} cannot be linked to a {}",
            payload.match_type.as_str(),
            transaction.transaction_type.as_str()
        )));
    }

    let mut link = MatchLink {
        confidence,
        ..Default::default()
    };

    match payload.match_type {
        MatchTargetKind::Customer => {
            if !state
                .db
                .customer_exists(tenant.tenant_id, payload.target_id)
                .await?
            {
                return Err(AppError::NotFound(anyhow::anyhow!("Customer not found")));
            }
            link.customer_id = Some(payload.target_id);
        }
        MatchTargetKind::Vendor => {
            if !state
                .db
                .vendor_exists(tenant.tenant_id, payload.target_id)
                .await?
            {
                return Err(AppError::NotFound(anyhow::anyhow!("Vendor not found")));
            }
            link.vendor_id = Some(payload.target_id);
        }
        MatchTargetKind::Invoice => {
            let invoice = state
                .db
                .invoice_summary(tenant.tenant_id, payload.target_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
            // Back-fill the owning customer so both sides of the link are set
            link.invoice_id = Some(invoice.invoice_id);
            link.customer_id = Some(invoice.customer_id);
        }
        MatchTargetKind::Bill => {
            let bill = state
                .db
                .bill_summary(tenant.tenant_id, payload.target_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bill not found")))?;
            link.bill_id = Some(bill.bill_id);
            link.vendor_id = Some(bill.vendor_id);
        }
        MatchTargetKind::Category => {
            let category = state
                .db
                .get_category(tenant.tenant_id, payload.target_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Category not found")))?;
            if !category.kind.matches_direction(transaction.transaction_type) {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "An {:?} category cannot annotate a {}",
                    category.kind,
                    transaction.transaction_type.as_str()
                )));
            }
            link.category_id = Some(payload.target_id);
        }
    }

    let updated = state
        .db
        .apply_match(tenant.tenant_id, transaction_id, &link)
        .await?;
    record_transaction_match("manual");

    Ok(Json(updated))
}

pub async fn accept_suggestion(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    let updated = state
        .db
        .accept_suggestion(tenant.tenant_id, transaction_id)
        .await?;
    record_transaction_match("accepted");

    Ok(Json(updated))
}

pub async fn reject_suggestion(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    let updated = state
        .db
        .reject_suggestion(tenant.tenant_id, transaction_id)
        .await?;

    Ok(Json(updated))
}

pub async fn unmatch_transaction(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    let updated = state
        .db
        .unmatch_transaction(tenant.tenant_id, transaction_id)
        .await?;

    Ok(Json(updated))
}

pub async fn exclude_transaction(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
    payload: Option<Json<ExcludeRequest>>,
) -> Result<Json<BankTransaction>, AppError> {
    let reason = payload.and_then(|Json(p)| p.reason);

    let updated = state
        .db
        .exclude_transaction(tenant.tenant_id, transaction_id, reason.as_deref())
        .await?;

    Ok(Json(updated))
}

pub async fn reconcile_transaction(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    let updated = state
        .db
        .reconcile_transaction(tenant.tenant_id, transaction_id)
        .await?;

    Ok(Json(updated))
}

pub async fn stats(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TransactionStats>, AppError> {
    if let Some(account_id) = query.bank_account_id {
        state
            .db
            .get_bank_account(tenant.tenant_id, account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bank account not found")))?;
    }

    let stats = state
        .db
        .transaction_stats(tenant.tenant_id, query.bank_account_id)
        .await?;

    Ok(Json(stats))
}
