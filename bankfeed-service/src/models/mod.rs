//! Domain models for bankfeed-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Bank Account Models
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankAccount {
    pub bank_account_id: Uuid,
    pub tenant_id: Uuid,
    pub bank_name: String,
    pub account_number_masked: String,
    pub currency: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// One import batch of pre-parsed statement lines.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankUpload {
    pub upload_id: Uuid,
    pub tenant_id: Uuid,
    pub bank_account_id: Uuid,
    pub file_name: String,
    pub bank_preset: Option<String>,
    pub transaction_count: i32,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }

    /// Directionality: deposits link to the receivables side, withdrawals to
    /// the payables side. Categories are allowed either way; their kind is
    /// checked separately.
    pub fn allows_target(&self, kind: MatchTargetKind) -> bool {
        match (self, kind) {
            (Self::Deposit, MatchTargetKind::Customer | MatchTargetKind::Invoice) => true,
            (Self::Withdrawal, MatchTargetKind::Vendor | MatchTargetKind::Bill) => true,
            (_, MatchTargetKind::Category) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "match_status", rename_all = "snake_case")]
pub enum MatchStatus {
    Unmatched,
    Suggested,
    Matched,
    Excluded,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Suggested => "suggested",
            Self::Matched => "matched",
            Self::Excluded => "excluded",
        }
    }
}

/// What an explicit match can link a transaction to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTargetKind {
    Customer,
    Vendor,
    Invoice,
    Bill,
    Category,
}

impl MatchTargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Vendor => "vendor",
            Self::Invoice => "invoice",
            Self::Bill => "bill",
            Self::Category => "category",
        }
    }
}

/// One imported statement line. Facts are immutable once imported; match and
/// reconciliation state mutate through the guarded store operations only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub bank_account_id: Uuid,
    pub upload_id: Option<Uuid>,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub balance: Option<Decimal>,
    pub match_status: MatchStatus,
    pub matched_customer_id: Option<Uuid>,
    pub matched_vendor_id: Option<Uuid>,
    pub matched_invoice_id: Option<Uuid>,
    pub matched_bill_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
    pub notes: Option<String>,
    pub is_reconciled: bool,
    pub reconciled_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// The linkage an apply-match writes: which entity/document ids to set and
/// with what confidence. Built by the handlers and the auto-match pass,
/// persisted atomically by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchLink {
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub confidence: f64,
}

impl MatchLink {
    /// True when a transaction already carries exactly this linkage, which
    /// makes a re-apply a no-op.
    pub fn already_applied(&self, tx: &BankTransaction) -> bool {
        tx.match_status == MatchStatus::Matched
            && tx.matched_customer_id == self.customer_id
            && tx.matched_vendor_id == self.vendor_id
            && tx.matched_invoice_id == self.invoice_id
            && tx.matched_bill_id == self.bill_id
            && tx.category_id == self.category_id
            && tx.match_confidence == Some(self.confidence)
    }
}

// ============================================================================
// Matching Rule Models
// ============================================================================

/// Conjunctive rule conditions; a field left empty/None is vacuously true.
/// `description_contains` is an OR-list of terms compared against the
/// normalized description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub description_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_exact: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "rule_action_kind", rename_all = "snake_case")]
pub enum RuleActionKind {
    MatchCustomer,
    MatchVendor,
    Categorize,
}

impl RuleActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchCustomer => "match_customer",
            Self::MatchVendor => "match_vendor",
            Self::Categorize => "categorize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    pub kind: RuleActionKind,
    pub target_id: Uuid,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MatchingRule {
    pub rule_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub priority: i32,
    pub is_active: bool,
    #[sqlx(json)]
    pub conditions: RuleConditions,
    pub action_kind: RuleActionKind,
    pub action_target: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl MatchingRule {
    pub fn action(&self) -> RuleAction {
        RuleAction {
            kind: self.action_kind,
            target_id: self.action_target,
        }
    }
}

// ============================================================================
// Category Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "category_kind", rename_all = "snake_case")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    /// The statement direction a category of this kind can annotate.
    pub fn matches_direction(&self, transaction_type: TransactionType) -> bool {
        match self {
            Self::Income => transaction_type == TransactionType::Deposit,
            Self::Expense => transaction_type == TransactionType::Withdrawal,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub category_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub kind: CategoryKind,
    pub color: Option<String>,
    pub created_utc: DateTime<Utc>,
}

// ============================================================================
// Directory Summaries (read-only collaborator data)
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct CustomerSummary {
    pub customer_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct VendorSummary {
    pub vendor_id: Uuid,
    pub name: String,
}

/// An unpaid/sent invoice; total derived by summing its line items.
#[derive(Debug, Clone, FromRow)]
pub struct OpenInvoice {
    pub invoice_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: Decimal,
}

/// A pending/overdue bill.
#[derive(Debug, Clone, FromRow)]
pub struct OpenBill {
    pub bill_id: Uuid,
    pub vendor_id: Uuid,
    pub total_amount: Decimal,
}

/// Snapshot of the candidate corpus a suggestion pass scores against.
#[derive(Debug, Clone, Default)]
pub struct Directories {
    pub customers: Vec<CustomerSummary>,
    pub vendors: Vec<VendorSummary>,
    pub open_invoices: Vec<OpenInvoice>,
    pub open_bills: Vec<OpenBill>,
}

// ============================================================================
// Suggestions (ephemeral, never persisted)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Customer,
    Vendor,
    Invoice,
    Bill,
}

impl SuggestionKind {
    /// Name-based suggestions come from the entity directories; amount-based
    /// ones from open documents.
    pub fn is_name_based(&self) -> bool {
        matches!(self, Self::Customer | Self::Vendor)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSuggestion {
    pub kind: SuggestionKind,
    pub target_id: Uuid,
    pub name: String,
    pub confidence: f64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_amount: Option<Decimal>,
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TransactionStats {
    pub total: i64,
    pub unmatched: i64,
    pub suggested: i64,
    pub matched: i64,
    pub excluded: i64,
    pub reconciled: i64,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub deposit_count: i64,
    pub withdrawal_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn matched_tx(link: &MatchLink) -> BankTransaction {
        BankTransaction {
            transaction_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            bank_account_id: Uuid::new_v4(),
            upload_id: None,
            transaction_date: Utc::now().date_naive(),
            description: "X".to_string(),
            reference: None,
            amount: Decimal::ONE,
            transaction_type: TransactionType::Deposit,
            balance: None,
            match_status: MatchStatus::Matched,
            matched_customer_id: link.customer_id,
            matched_vendor_id: link.vendor_id,
            matched_invoice_id: link.invoice_id,
            matched_bill_id: link.bill_id,
            category_id: link.category_id,
            match_confidence: Some(link.confidence),
            notes: None,
            is_reconciled: false,
            reconciled_utc: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn deposits_only_link_to_the_receivables_side() {
        let deposit = TransactionType::Deposit;
        assert!(deposit.allows_target(MatchTargetKind::Customer));
        assert!(deposit.allows_target(MatchTargetKind::Invoice));
        assert!(deposit.allows_target(MatchTargetKind::Category));
        assert!(!deposit.allows_target(MatchTargetKind::Vendor));
        assert!(!deposit.allows_target(MatchTargetKind::Bill));
    }

    #[test]
    fn withdrawals_only_link_to_the_payables_side() {
        let withdrawal = TransactionType::Withdrawal;
        assert!(withdrawal.allows_target(MatchTargetKind::Vendor));
        assert!(withdrawal.allows_target(MatchTargetKind::Bill));
        assert!(withdrawal.allows_target(MatchTargetKind::Category));
        assert!(!withdrawal.allows_target(MatchTargetKind::Customer));
        assert!(!withdrawal.allows_target(MatchTargetKind::Invoice));
    }

    #[test]
    fn category_kind_follows_direction() {
        assert!(CategoryKind::Income.matches_direction(TransactionType::Deposit));
        assert!(!CategoryKind::Income.matches_direction(TransactionType::Withdrawal));
        assert!(CategoryKind::Expense.matches_direction(TransactionType::Withdrawal));
    }

    #[test]
    fn identical_link_reads_as_already_applied() {
        let link = MatchLink {
            customer_id: Some(Uuid::new_v4()),
            confidence: 1.0,
            ..Default::default()
        };
        let tx = matched_tx(&link);
        assert!(link.already_applied(&tx));
    }

    #[test]
    fn different_target_is_not_already_applied() {
        let link = MatchLink {
            customer_id: Some(Uuid::new_v4()),
            confidence: 1.0,
            ..Default::default()
        };
        let other = MatchLink {
            customer_id: Some(Uuid::new_v4()),
            confidence: 1.0,
            ..Default::default()
        };
        let tx = matched_tx(&link);
        assert!(!other.already_applied(&tx));
    }

    #[test]
    fn different_confidence_is_not_already_applied() {
        let customer_id = Some(Uuid::new_v4());
        let link = MatchLink {
            customer_id,
            confidence: 1.0,
            ..Default::default()
        };
        let other = MatchLink {
            customer_id,
            confidence: 0.8,
            ..Default::default()
        };
        let tx = matched_tx(&link);
        assert!(!other.already_applied(&tx));
    }
}
