//! Shared fixtures for engine integration tests: builders for domain
//! objects and an in-memory [`MatchStore`] double.

use std::sync::{Mutex, Once};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use bankfeed_service::matching::automatch::MatchStore;
use bankfeed_service::models::{
    BankTransaction, CustomerSummary, Directories, MatchLink, MatchStatus, MatchSuggestion,
    MatchingRule, RuleAction, RuleActionKind, RuleConditions, SuggestionKind, TransactionType,
    VendorSummary,
};
use service_core::error::AppError;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,bankfeed_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn transaction(
    tenant_id: Uuid,
    bank_account_id: Uuid,
    description: &str,
    amount: &str,
    transaction_type: TransactionType,
) -> BankTransaction {
    BankTransaction {
        transaction_id: Uuid::new_v4(),
        tenant_id,
        bank_account_id,
        upload_id: None,
        transaction_date: Utc::now().date_naive(),
        description: description.to_string(),
        reference: None,
        amount: amount.parse().unwrap(),
        transaction_type,
        balance: None,
        match_status: MatchStatus::Unmatched,
        matched_customer_id: None,
        matched_vendor_id: None,
        matched_invoice_id: None,
        matched_bill_id: None,
        category_id: None,
        match_confidence: None,
        notes: None,
        is_reconciled: false,
        reconciled_utc: None,
        created_utc: Utc::now(),
    }
}

pub fn contains_rule(
    tenant_id: Uuid,
    priority: i32,
    terms: &[&str],
    action: RuleAction,
) -> MatchingRule {
    MatchingRule {
        rule_id: Uuid::new_v4(),
        tenant_id,
        name: format!("contains {}", terms.join("/")),
        priority,
        is_active: true,
        conditions: RuleConditions {
            description_contains: terms.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        },
        action_kind: action.kind,
        action_target: action.target_id,
        created_utc: Utc::now(),
    }
}

pub fn categorize(category_id: Uuid) -> RuleAction {
    RuleAction {
        kind: RuleActionKind::Categorize,
        target_id: category_id,
    }
}

pub fn customer(name: &str) -> CustomerSummary {
    CustomerSummary {
        customer_id: Uuid::new_v4(),
        name: name.to_string(),
    }
}

pub fn vendor(name: &str) -> VendorSummary {
    VendorSummary {
        vendor_id: Uuid::new_v4(),
        name: name.to_string(),
    }
}

/// In-memory store double with the same guarded-transition semantics as the
/// Postgres implementation.
pub struct InMemoryStore {
    pub transactions: Mutex<Vec<BankTransaction>>,
    pub rules: Vec<MatchingRule>,
    pub directories: Directories,
    /// Writes against this transaction fail, simulating a persistence error.
    pub fail_transaction: Option<Uuid>,
}

impl InMemoryStore {
    pub fn new(
        transactions: Vec<BankTransaction>,
        rules: Vec<MatchingRule>,
        directories: Directories,
    ) -> Self {
        Self {
            transactions: Mutex::new(transactions),
            rules,
            directories,
            fail_transaction: None,
        }
    }

    pub fn get(&self, transaction_id: Uuid) -> BankTransaction {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.transaction_id == transaction_id)
            .cloned()
            .expect("transaction not in store")
    }

    pub fn status_of(&self, transaction_id: Uuid) -> MatchStatus {
        self.get(transaction_id).match_status
    }

    fn check_injected_failure(&self, transaction_id: Uuid) -> Result<(), AppError> {
        if self.fail_transaction == Some(transaction_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected write failure"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn unmatched_transactions(
        &self,
        tenant_id: Uuid,
        bank_account_id: Option<Uuid>,
    ) -> Result<Vec<BankTransaction>, AppError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                t.tenant_id == tenant_id
                    && t.match_status == MatchStatus::Unmatched
                    && bank_account_id.is_none_or(|a| t.bank_account_id == a)
            })
            .cloned()
            .collect())
    }

    async fn active_rules(&self, tenant_id: Uuid) -> Result<Vec<MatchingRule>, AppError> {
        let mut rules: Vec<MatchingRule> = self
            .rules
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| (a.priority, a.rule_id).cmp(&(b.priority, b.rule_id)));
        Ok(rules)
    }

    async fn directories(&self, _tenant_id: Uuid) -> Result<Directories, AppError> {
        Ok(self.directories.clone())
    }

    async fn apply_match_link(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        link: &MatchLink,
    ) -> Result<(), AppError> {
        self.check_injected_failure(transaction_id)?;

        let mut transactions = self.transactions.lock().unwrap();
        let tx = transactions
            .iter_mut()
            .find(|t| t.tenant_id == tenant_id && t.transaction_id == transaction_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

        if !matches!(tx.match_status, MatchStatus::Unmatched | MatchStatus::Suggested) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction is not in a matchable state"
            )));
        }

        tx.match_status = MatchStatus::Matched;
        tx.matched_customer_id = link.customer_id;
        tx.matched_vendor_id = link.vendor_id;
        tx.matched_invoice_id = link.invoice_id;
        tx.matched_bill_id = link.bill_id;
        tx.category_id = link.category_id;
        tx.match_confidence = Some(link.confidence);
        Ok(())
    }

    async fn mark_suggested(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        suggestion: &MatchSuggestion,
    ) -> Result<(), AppError> {
        self.check_injected_failure(transaction_id)?;

        let mut transactions = self.transactions.lock().unwrap();
        let tx = transactions
            .iter_mut()
            .find(|t| t.tenant_id == tenant_id && t.transaction_id == transaction_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

        if tx.match_status != MatchStatus::Unmatched {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction is no longer unmatched"
            )));
        }

        tx.match_status = MatchStatus::Suggested;
        match suggestion.kind {
            SuggestionKind::Customer => tx.matched_customer_id = Some(suggestion.target_id),
            SuggestionKind::Vendor => tx.matched_vendor_id = Some(suggestion.target_id),
            SuggestionKind::Invoice | SuggestionKind::Bill => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Only name-based suggestions can be stored on a transaction"
                )))
            }
        }
        tx.match_confidence = Some(suggestion.confidence);
        Ok(())
    }
}
