//! Priority-ordered rule evaluation: first fully-satisfied rule wins.

use regex::Regex;
use rust_decimal::Decimal;

use super::text::normalize;
use crate::models::{BankTransaction, MatchingRule, RuleAction};

/// Internal pairing of a rule with its precompiled regex (if any).
struct CompiledRule {
    rule: MatchingRule,
    pattern: Option<Regex>,
}

/// A tenant's active rules, compiled once per pass and evaluated in strict
/// ascending priority order (ties keep the given order, which the store
/// fixes as rule id).
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<MatchingRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                // Creation-time validation already rejected bad patterns; a
                // rule whose pattern no longer compiles simply never fires.
                let pattern = rule
                    .conditions
                    .description_pattern
                    .as_deref()
                    .and_then(|p| Regex::new(p).ok());
                CompiledRule { rule, pattern }
            })
            .collect();
        compiled.sort_by(|a, b| a.rule.priority.cmp(&b.rule.priority));
        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Return the action of the first rule whose every present condition
    /// holds for `tx`, or `None`. Later rules are never consulted once one
    /// fires. Pure - no side effects, no clock.
    pub fn evaluate(&self, tx: &BankTransaction) -> Option<RuleAction> {
        self.rules
            .iter()
            .find(|cr| rule_matches(cr, tx))
            .map(|cr| cr.rule.action())
    }
}

fn rule_matches(cr: &CompiledRule, tx: &BankTransaction) -> bool {
    let conditions = &cr.rule.conditions;

    if let Some(expected) = conditions.transaction_type {
        if tx.transaction_type != expected {
            return false;
        }
    }

    if let Some(min) = conditions.amount_min {
        if tx.amount < min {
            return false;
        }
    }
    if let Some(max) = conditions.amount_max {
        if tx.amount > max {
            return false;
        }
    }
    if let Some(exact) = conditions.amount_exact {
        if (tx.amount - exact).abs() > Decimal::new(1, 2) {
            return false;
        }
    }

    if !conditions.description_contains.is_empty() {
        let desc = normalize(&tx.description);
        let any_term = conditions.description_contains.iter().any(|term| {
            let term = normalize(term);
            !term.is_empty() && desc.contains(&term)
        });
        if !any_term {
            return false;
        }
    }

    if conditions.description_pattern.is_some() {
        match &cr.pattern {
            Some(re) => {
                if !re.is_match(&tx.description) {
                    return false;
                }
            }
            None => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        MatchStatus, RuleActionKind, RuleConditions, TransactionType,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn tx(description: &str, amount: &str, transaction_type: TransactionType) -> BankTransaction {
        BankTransaction {
            transaction_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            bank_account_id: Uuid::new_v4(),
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

    fn rule(priority: i32, conditions: RuleConditions) -> MatchingRule {
        MatchingRule {
            rule_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: format!("rule-{priority}"),
            priority,
            is_active: true,
            conditions,
            action_kind: RuleActionKind::Categorize,
            action_target: Uuid::new_v4(),
            created_utc: Utc::now(),
        }
    }

    fn contains(terms: &[&str]) -> RuleConditions {
        RuleConditions {
            description_contains: terms.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn lowest_priority_satisfied_rule_wins() {
        let first = rule(1, contains(&["payment"]));
        let second = rule(2, contains(&["payment"]));
        let expected = first.action_target;

        // Insertion order scrambled on purpose
        let set = RuleSet::new(vec![second, first]);
        let action = set.evaluate(&tx("PAYMENT RECEIVED", "10", TransactionType::Deposit));
        assert_eq!(action.unwrap().target_id, expected);
    }

    #[test]
    fn rule_without_conditions_matches_everything() {
        let set = RuleSet::new(vec![rule(1, RuleConditions::default())]);
        assert!(set
            .evaluate(&tx("ANYTHING AT ALL", "0", TransactionType::Withdrawal))
            .is_some());
    }

    #[test]
    fn contains_list_is_an_or() {
        let set = RuleSet::new(vec![rule(1, contains(&["stripe", "paypal"]))]);
        assert!(set
            .evaluate(&tx("PAYPAL *SHOP", "5", TransactionType::Deposit))
            .is_some());
        assert!(set
            .evaluate(&tx("SQUARE POS", "5", TransactionType::Deposit))
            .is_none());
    }

    #[test]
    fn contains_compares_normalized_text() {
        let set = RuleSet::new(vec![rule(1, contains(&["Coffee-Shop"]))]);
        assert!(set
            .evaluate(&tx("COFFEE  SHOP #42", "4.50", TransactionType::Withdrawal))
            .is_some());
    }

    #[test]
    fn pattern_tests_raw_description() {
        let conditions = RuleConditions {
            description_pattern: Some(r"^RENT-\d+$".to_string()),
            ..Default::default()
        };
        let set = RuleSet::new(vec![rule(1, conditions)]);
        assert!(set
            .evaluate(&tx("RENT-2041", "900", TransactionType::Withdrawal))
            .is_some());
        assert!(set
            .evaluate(&tx("rent-2041", "900", TransactionType::Withdrawal))
            .is_none());
    }

    #[test]
    fn all_present_conditions_must_hold() {
        let conditions = RuleConditions {
            description_contains: vec!["gym".to_string()],
            amount_min: Some("50".parse().unwrap()),
            ..Default::default()
        };
        let set = RuleSet::new(vec![rule(1, conditions)]);
        assert!(set
            .evaluate(&tx("GYM MEMBERSHIP", "60", TransactionType::Withdrawal))
            .is_some());
        // Description matches, amount does not
        assert!(set
            .evaluate(&tx("GYM MEMBERSHIP", "20", TransactionType::Withdrawal))
            .is_none());
    }

    #[test]
    fn amount_exact_allows_a_cent_of_slack() {
        let conditions = RuleConditions {
            amount_exact: Some("100.00".parse().unwrap()),
            ..Default::default()
        };
        let set = RuleSet::new(vec![rule(1, conditions)]);
        assert!(set
            .evaluate(&tx("X", "100.01", TransactionType::Deposit))
            .is_some());
        assert!(set
            .evaluate(&tx("X", "100.02", TransactionType::Deposit))
            .is_none());
    }

    #[test]
    fn transaction_type_condition_filters() {
        let conditions = RuleConditions {
            transaction_type: Some(TransactionType::Deposit),
            ..Default::default()
        };
        let set = RuleSet::new(vec![rule(1, conditions)]);
        assert!(set.evaluate(&tx("X", "1", TransactionType::Deposit)).is_some());
        assert!(set
            .evaluate(&tx("X", "1", TransactionType::Withdrawal))
            .is_none());
    }

    #[test]
    fn later_rules_apply_when_earlier_do_not_match() {
        let miss = rule(1, contains(&["nomatch"]));
        let hit = rule(5, contains(&["uber"]));
        let expected = hit.action_target;
        let set = RuleSet::new(vec![miss, hit]);
        let action = set.evaluate(&tx("UBER TRIP", "14", TransactionType::Withdrawal));
        assert_eq!(action.unwrap().target_id, expected);
    }
}
