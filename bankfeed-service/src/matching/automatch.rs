//! Batch auto-matching: rules first, heuristic suggestion second.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use service_core::error::AppError;

use super::rules::RuleSet;
use super::suggest::name_candidates;
use crate::models::{
    BankTransaction, Directories, MatchLink, MatchSuggestion, MatchingRule, RuleAction,
    RuleActionKind, TransactionType,
};

/// Rule-driven matches are certain by definition.
pub const RULE_MATCH_CONFIDENCE: f64 = 1.0;

/// Heuristic candidates above this are auto-promoted to `suggested`.
pub const AUTO_SUGGEST_THRESHOLD: f64 = 0.6;

/// Persistence and directory capabilities the auto-match pass needs. The
/// Postgres [`Database`](crate::services::Database) implements this; tests
/// inject an in-memory double.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// All currently-unmatched transactions in scope, in a stable order.
    async fn unmatched_transactions(
        &self,
        tenant_id: Uuid,
        bank_account_id: Option<Uuid>,
    ) -> Result<Vec<BankTransaction>, AppError>;

    /// Active rules ordered ascending by (priority, rule id).
    async fn active_rules(&self, tenant_id: Uuid) -> Result<Vec<MatchingRule>, AppError>;

    /// Snapshot of the candidate directories.
    async fn directories(&self, tenant_id: Uuid) -> Result<Directories, AppError>;

    /// Transition a transaction to `matched` with the given linkage,
    /// guarded on its current status.
    async fn apply_match_link(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        link: &MatchLink,
    ) -> Result<(), AppError>;

    /// Transition a transaction to `suggested`, storing the candidate
    /// linkage and confidence, guarded on status still being `unmatched`.
    async fn mark_suggested(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        suggestion: &MatchSuggestion,
    ) -> Result<(), AppError>;
}

/// What the pass decided for one transaction. Pure function of the
/// transaction, the rule set, and the directory snapshot.
#[derive(Debug, Clone)]
pub enum Decision {
    /// A rule fired; apply its action as a certain match.
    Rule(RuleAction),
    /// No rule fired, but a name-based candidate cleared the threshold.
    /// The best-scoring candidate wins.
    Suggest(MatchSuggestion),
    /// Nothing cleared the bar; leave the transaction unmatched.
    Skip,
}

pub fn decide(tx: &BankTransaction, rules: &RuleSet, directories: &Directories) -> Decision {
    if let Some(action) = rules.evaluate(tx) {
        return Decision::Rule(action);
    }

    // Heuristic fallback considers name-based candidates only; amount-only
    // hits stay manual. Candidates arrive ranked, so the first above the
    // threshold is the best-scoring one.
    match name_candidates(tx, directories)
        .into_iter()
        .find(|s| s.confidence > AUTO_SUGGEST_THRESHOLD)
    {
        Some(suggestion) => Decision::Suggest(suggestion),
        None => Decision::Skip,
    }
}

/// Translate a rule action into the linkage to persist, enforcing
/// directionality: customers only on deposits, vendors only on withdrawals.
pub fn link_for_rule_action(
    tx: &BankTransaction,
    action: RuleAction,
) -> Result<MatchLink, AppError> {
    let mut link = MatchLink {
        confidence: RULE_MATCH_CONFIDENCE,
        ..Default::default()
    };

    match action.kind {
        RuleActionKind::MatchCustomer => {
            if tx.transaction_type != TransactionType::Deposit {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "A customer can only be linked to a deposit"
                )));
            }
            link.customer_id = Some(action.target_id);
        }
        RuleActionKind::MatchVendor => {
            if tx.transaction_type != TransactionType::Withdrawal {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "A vendor can only be linked to a withdrawal"
                )));
            }
            link.vendor_id = Some(action.target_id);
        }
        RuleActionKind::Categorize => {
            link.category_id = Some(action.target_id);
        }
    }

    Ok(link)
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoMatchFailure {
    pub transaction_id: Uuid,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct AutoMatchSummary {
    pub matched_count: i32,
    pub suggested_count: i32,
    pub total_processed: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AutoMatchFailure>,
}

/// Run one auto-match pass over every unmatched transaction in scope.
///
/// Transactions are processed sequentially so rule precedence and candidate
/// ranking stay deterministic. A per-transaction failure is recorded and the
/// pass moves on; it never aborts the batch. The pass checkpoints on
/// `cancel` between transactions, so a shutdown stops it cleanly without
/// leaving a transaction half-written.
pub async fn run_auto_match<S: MatchStore + ?Sized>(
    store: &S,
    tenant_id: Uuid,
    bank_account_id: Option<Uuid>,
    cancel: &CancellationToken,
) -> Result<AutoMatchSummary, AppError> {
    let rules = RuleSet::new(store.active_rules(tenant_id).await?);
    let directories = store.directories(tenant_id).await?;
    let transactions = store
        .unmatched_transactions(tenant_id, bank_account_id)
        .await?;

    tracing::info!(
        rule_count = rules.len(),
        candidate_transactions = transactions.len(),
        "Starting auto-match pass"
    );

    let mut summary = AutoMatchSummary::default();

    for tx in transactions {
        if cancel.is_cancelled() {
            tracing::info!(
                processed = summary.total_processed,
                "Auto-match pass cancelled"
            );
            break;
        }
        summary.total_processed += 1;

        match decide(&tx, &rules, &directories) {
            Decision::Rule(action) => {
                let applied = link_for_rule_action(&tx, action)
                    .map(|link| (tx.transaction_id, link));
                match applied {
                    Ok((id, link)) => match store.apply_match_link(tenant_id, id, &link).await {
                        Ok(()) => summary.matched_count += 1,
                        Err(e) => record_failure(&mut summary, tx.transaction_id, e),
                    },
                    Err(e) => record_failure(&mut summary, tx.transaction_id, e),
                }
            }
            Decision::Suggest(suggestion) => {
                match store
                    .mark_suggested(tenant_id, tx.transaction_id, &suggestion)
                    .await
                {
                    Ok(()) => summary.suggested_count += 1,
                    Err(e) => record_failure(&mut summary, tx.transaction_id, e),
                }
            }
            Decision::Skip => {}
        }
    }

    tracing::info!(
        matched = summary.matched_count,
        suggested = summary.suggested_count,
        processed = summary.total_processed,
        failed = summary.failures.len(),
        "Auto-match pass finished"
    );

    Ok(summary)
}

fn record_failure(summary: &mut AutoMatchSummary, transaction_id: Uuid, error: AppError) {
    tracing::warn!(
        transaction_id = %transaction_id,
        error = %error,
        "Auto-match failed for transaction"
    );
    summary.failures.push(AutoMatchFailure {
        transaction_id,
        error: error.to_string(),
    });
}
