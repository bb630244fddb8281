//! Matching rule CRUD handlers.
//!
//! Rules are validated here, at creation/update time, so the engine never
//! re-validates untyped data in the middle of a batch pass.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::{CreateRuleRequest, ListRulesQuery, RuleListResponse, UpdateRuleRequest};
use crate::middleware::TenantContext;
use crate::models::{MatchingRule, RuleAction, RuleActionKind, RuleConditions};
use crate::services::database::{MatchingRuleChanges, NewMatchingRule};
use crate::startup::AppState;

const DEFAULT_PRIORITY: i32 = 100;

pub async fn create_rule(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<MatchingRule>), AppError> {
    payload.validate()?;
    validate_conditions(&payload.conditions)?;
    validate_action_target(&state, tenant.tenant_id, payload.action).await?;

    let rule = state
        .db
        .create_matching_rule(
            tenant.tenant_id,
            &NewMatchingRule {
                name: payload.name,
                priority: payload.priority.unwrap_or(DEFAULT_PRIORITY),
                conditions: payload.conditions,
                action: payload.action,
            },
        )
        .await?;

    tracing::info!(rule_id = %rule.rule_id, tenant_id = %tenant.tenant_id, "Matching rule created");

    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn get_rule(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<MatchingRule>, AppError> {
    let rule = state
        .db
        .get_matching_rule(tenant.tenant_id, rule_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Matching rule not found")))?;

    Ok(Json(rule))
}

pub async fn list_rules(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListRulesQuery>,
) -> Result<Json<RuleListResponse>, AppError> {
    let rules = state
        .db
        .list_matching_rules(tenant.tenant_id, query.active_only.unwrap_or(false))
        .await?;

    Ok(Json(RuleListResponse { rules }))
}

pub async fn update_rule(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(rule_id): Path<Uuid>,
    Json(payload): Json<UpdateRuleRequest>,
) -> Result<Json<MatchingRule>, AppError> {
    payload.validate()?;
    if let Some(ref conditions) = payload.conditions {
        validate_conditions(conditions)?;
    }
    if let Some(action) = payload.action {
        validate_action_target(&state, tenant.tenant_id, action).await?;
    }

    let updated = state
        .db
        .update_matching_rule(
            tenant.tenant_id,
            rule_id,
            &MatchingRuleChanges {
                name: payload.name,
                priority: payload.priority,
                is_active: payload.is_active,
                conditions: payload.conditions,
                action: payload.action,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Matching rule not found")))?;

    Ok(Json(updated))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(rule_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .db
        .delete_matching_rule(tenant.tenant_id, rule_id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Matching rule not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_conditions(conditions: &RuleConditions) -> Result<(), AppError> {
    if let Some(ref pattern) = conditions.description_pattern {
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Invalid regex pattern: {}",
                e
            )));
        }
    }

    if conditions
        .description_contains
        .iter()
        .any(|term| term.trim().is_empty())
    {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "description_contains terms must not be empty"
        )));
    }

    for amount in [
        conditions.amount_min,
        conditions.amount_max,
        conditions.amount_exact,
    ]
    .into_iter()
    .flatten()
    {
        if amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Rule amounts must not be negative"
            )));
        }
    }

    if let (Some(min), Some(max)) = (conditions.amount_min, conditions.amount_max) {
        if min > max {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "amount_min must not exceed amount_max"
            )));
        }
    }

    Ok(())
}

/// The action target must exist and belong to the tenant.
async fn validate_action_target(
    state: &AppState,
    tenant_id: Uuid,
    action: RuleAction,
) -> Result<(), AppError> {
    let found = match action.kind {
        RuleActionKind::MatchCustomer => state.db.customer_exists(tenant_id, action.target_id).await?,
        RuleActionKind::MatchVendor => state.db.vendor_exists(tenant_id, action.target_id).await?,
        RuleActionKind::Categorize => state
            .db
            .get_category(tenant_id, action.target_id)
            .await?
            .is_some(),
    };

    if !found {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Rule action target not found"
        )));
    }

    Ok(())
}
