//! Batch auto-match handler.

use axum::extract::State;
use axum::Json;

use service_core::error::AppError;

use crate::dtos::AutoMatchRequest;
use crate::matching::automatch::{self, AutoMatchSummary};
use crate::middleware::TenantContext;
use crate::services::metrics::{record_auto_match_run, record_transaction_matches};
use crate::startup::AppState;

/// Run an auto-match pass over the tenant's unmatched transactions,
/// optionally limited to one bank account. The pass is tied to the service
/// shutdown token so it stops cleanly between transactions.
pub async fn run_auto_match(
    State(state): State<AppState>,
    tenant: TenantContext,
    payload: Option<Json<AutoMatchRequest>>,
) -> Result<Json<AutoMatchSummary>, AppError> {
    let bank_account_id = payload.and_then(|Json(p)| p.bank_account_id);

    if let Some(account_id) = bank_account_id {
        state
            .db
            .get_bank_account(tenant.tenant_id, account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bank account not found")))?;
    }

    let summary = automatch::run_auto_match(
        state.db.as_ref(),
        tenant.tenant_id,
        bank_account_id,
        &state.shutdown,
    )
    .await
    .inspect_err(|_| record_auto_match_run("failed"))?;

    record_auto_match_run("completed");
    record_transaction_matches("rule", summary.matched_count as u64);

    Ok(Json(summary))
}
