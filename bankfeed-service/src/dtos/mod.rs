//! Request and response shapes for the HTTP API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    BankAccount, BankTransaction, BankUpload, CategoryKind, MatchStatus, MatchSuggestion,
    MatchTargetKind, MatchingRule, RuleAction, RuleConditions, TransactionType,
};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterAccountRequest {
    #[validate(length(min = 1, max = 120))]
    pub bank_name: String,
    #[validate(length(min = 1, max = 32))]
    pub account_number_masked: String,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<BankAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}

// ============================================================================
// Imports
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    pub bank_preset: Option<String>,
    #[validate(length(min = 1, max = 10000), nested)]
    pub rows: Vec<ImportRow>,
}

/// One canonical pre-parsed statement line; parsing/column mapping happened
/// upstream.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ImportRow {
    pub transaction_date: NaiveDate,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub balance: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub upload: BankUpload,
    pub transaction_count: i32,
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ListTransactionsQuery {
    pub match_status: Option<MatchStatus>,
    pub transaction_type: Option<TransactionType>,
    pub reconciled: Option<bool>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<BankTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<MatchSuggestion>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyMatchRequest {
    pub match_type: MatchTargetKind,
    pub target_id: Uuid,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExcludeRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AutoMatchRequest {
    pub bank_account_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    pub bank_account_id: Option<Uuid>,
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 0, max = 100_000))]
    pub priority: Option<i32>,
    #[serde(default)]
    pub conditions: RuleConditions,
    pub action: RuleAction,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateRuleRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 100_000))]
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub conditions: Option<RuleConditions>,
    pub action: Option<RuleAction>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListRulesQuery {
    pub active_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RuleListResponse {
    pub rules: Vec<MatchingRule>,
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub kind: CategoryKind,
    #[validate(length(max = 16))]
    pub color: Option<String>,
}
