//! Ranked match-suggestion generation over the candidate corpus.

use std::collections::HashMap;

use uuid::Uuid;

use super::amount::amount_score;
use super::text::name_score;
use crate::models::{
    BankTransaction, Directories, MatchSuggestion, SuggestionKind, TransactionType,
};

/// Suggestion lists are capped so a noisy corpus stays reviewable.
pub const MAX_SUGGESTIONS: usize = 5;

/// Minimum name score for an entity to be offered at all.
pub const NAME_THRESHOLD: f64 = 0.3;

/// Minimum amount score for an open document to be offered.
pub const AMOUNT_THRESHOLD: f64 = 0.7;

/// Above this the amount is reported as an exact hit.
const AMOUNT_EXACT_ABOVE: f64 = 0.9;

/// Produce ranked suggestions for `tx`: at most [`MAX_SUGGESTIONS`] entries,
/// sorted by descending confidence. Deposits are scored against customers
/// and open invoices, withdrawals against vendors and open bills. Read-only;
/// persisting an accepted suggestion is the caller's business.
pub fn suggest(tx: &BankTransaction, directories: &Directories) -> Vec<MatchSuggestion> {
    let mut suggestions = name_candidates(tx, directories);
    suggestions.extend(amount_candidates(tx, directories));
    rank(&mut suggestions);
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Entity candidates scored by payee name, ranked, uncapped. The auto-match
/// pass promotes from these alone - amount-only hits are never auto-applied.
pub fn name_candidates(tx: &BankTransaction, directories: &Directories) -> Vec<MatchSuggestion> {
    let mut suggestions = Vec::new();

    match tx.transaction_type {
        TransactionType::Deposit => {
            for customer in &directories.customers {
                push_name_candidate(
                    &mut suggestions,
                    tx,
                    SuggestionKind::Customer,
                    customer.customer_id,
                    &customer.name,
                );
            }
        }
        TransactionType::Withdrawal => {
            for vendor in &directories.vendors {
                push_name_candidate(
                    &mut suggestions,
                    tx,
                    SuggestionKind::Vendor,
                    vendor.vendor_id,
                    &vendor.name,
                );
            }
        }
    }

    rank(&mut suggestions);
    suggestions
}

fn push_name_candidate(
    out: &mut Vec<MatchSuggestion>,
    tx: &BankTransaction,
    kind: SuggestionKind,
    target_id: Uuid,
    name: &str,
) {
    let score = name_score(&tx.description, name);
    if score > NAME_THRESHOLD {
        out.push(MatchSuggestion {
            kind,
            target_id,
            name: name.to_string(),
            confidence: score,
            reason: "Name appears in description".to_string(),
            matched_amount: None,
        });
    }
}

/// Open-document candidates scored by amount closeness.
fn amount_candidates(tx: &BankTransaction, directories: &Directories) -> Vec<MatchSuggestion> {
    let mut suggestions = Vec::new();

    match tx.transaction_type {
        TransactionType::Deposit => {
            let customer_names: HashMap<Uuid, &str> = directories
                .customers
                .iter()
                .map(|c| (c.customer_id, c.name.as_str()))
                .collect();
            for invoice in &directories.open_invoices {
                let score = amount_score(tx.amount, invoice.total_amount);
                if score > AMOUNT_THRESHOLD {
                    suggestions.push(MatchSuggestion {
                        kind: SuggestionKind::Invoice,
                        target_id: invoice.invoice_id,
                        name: customer_names
                            .get(&invoice.customer_id)
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| invoice.invoice_id.to_string()),
                        confidence: score,
                        reason: amount_reason(score),
                        matched_amount: Some(invoice.total_amount),
                    });
                }
            }
        }
        TransactionType::Withdrawal => {
            let vendor_names: HashMap<Uuid, &str> = directories
                .vendors
                .iter()
                .map(|v| (v.vendor_id, v.name.as_str()))
                .collect();
            for bill in &directories.open_bills {
                let score = amount_score(tx.amount, bill.total_amount);
                if score > AMOUNT_THRESHOLD {
                    suggestions.push(MatchSuggestion {
                        kind: SuggestionKind::Bill,
                        target_id: bill.bill_id,
                        name: vendor_names
                            .get(&bill.vendor_id)
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| bill.bill_id.to_string()),
                        confidence: score,
                        reason: amount_reason(score),
                        matched_amount: Some(bill.total_amount),
                    });
                }
            }
        }
    }

    suggestions
}

fn amount_reason(score: f64) -> String {
    if score > AMOUNT_EXACT_ABOVE {
        "Amount matches exactly".to_string()
    } else {
        "Amount matches closely".to_string()
    }
}

fn rank(suggestions: &mut [MatchSuggestion]) {
    // Stable sort: equal confidence keeps directory order
    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CustomerSummary, MatchStatus, OpenBill, OpenInvoice, VendorSummary,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

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

    fn customer(name: &str) -> CustomerSummary {
        CustomerSummary {
            customer_id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn vendor(name: &str) -> VendorSummary {
        VendorSummary {
            vendor_id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn invoice(customer_id: Uuid, total: &str) -> OpenInvoice {
        OpenInvoice {
            invoice_id: Uuid::new_v4(),
            customer_id,
            total_amount: total.parse().unwrap(),
        }
    }

    #[test]
    fn deposit_scores_customers_not_vendors() {
        let directories = Directories {
            customers: vec![customer("Acme Widgets")],
            vendors: vec![vendor("Acme Widgets")],
            ..Default::default()
        };
        let suggestions = suggest(
            &tx("PAYMENT ACME WIDGETS", "100", TransactionType::Deposit),
            &directories,
        );
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Customer);
        assert_eq!(suggestions[0].confidence, 0.9);
    }

    #[test]
    fn exact_invoice_amount_reads_as_exact() {
        let c = customer("Acme Widgets");
        let directories = Directories {
            open_invoices: vec![invoice(c.customer_id, "1500.00")],
            customers: vec![c],
            ..Default::default()
        };
        let suggestions = suggest(
            &tx("INCOMING WIRE", "1500.00", TransactionType::Deposit),
            &directories,
        );
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Invoice);
        assert_eq!(suggestions[0].confidence, 1.0);
        assert_eq!(suggestions[0].reason, "Amount matches exactly");
        assert_eq!(suggestions[0].matched_amount, Some(Decimal::new(150000, 2)));
    }

    #[test]
    fn near_invoice_amount_reads_as_close() {
        let c = customer("Acme Widgets");
        let directories = Directories {
            open_invoices: vec![invoice(c.customer_id, "1500.00")],
            customers: vec![c],
            ..Default::default()
        };
        let suggestions = suggest(
            &tx("INCOMING WIRE", "1490.00", TransactionType::Deposit),
            &directories,
        );
        assert_eq!(suggestions[0].reason, "Amount matches closely");
        assert_eq!(suggestions[0].confidence, 0.95);
    }

    #[test]
    fn list_is_capped_and_sorted_descending() {
        let directories = Directories {
            vendors: vec![
                vendor("Globex Supplies"),
                vendor("Globex Logistics"),
                vendor("Globex Catering"),
                vendor("Globex Cleaning"),
                vendor("Globex Security"),
                vendor("Globex Freight"),
                vendor("Globex Freight Partners"),
            ],
            ..Default::default()
        };
        let suggestions = suggest(
            &tx("GLOBEX FREIGHT INVOICE", "250", TransactionType::Withdrawal),
            &directories,
        );
        assert!(suggestions.len() <= MAX_SUGGESTIONS);
        for pair in suggestions.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        assert_eq!(suggestions[0].name, "Globex Freight");
    }

    #[test]
    fn weak_names_are_not_offered() {
        let directories = Directories {
            customers: vec![customer("Completely Different Company")],
            ..Default::default()
        };
        let suggestions = suggest(
            &tx("POS PURCHASE 0042", "12", TransactionType::Deposit),
            &directories,
        );
        assert!(suggestions.is_empty());
    }

    #[test]
    fn name_candidates_skip_documents() {
        let c = customer("Acme Widgets");
        let directories = Directories {
            open_invoices: vec![invoice(c.customer_id, "100")],
            customers: vec![c],
            ..Default::default()
        };
        let names = name_candidates(
            &tx("ACME WIDGETS TRANSFER", "100", TransactionType::Deposit),
            &directories,
        );
        assert!(names.iter().all(|s| s.kind.is_name_based()));
    }

    #[test]
    fn bill_candidates_for_withdrawals() {
        let v = vendor("Office Warehouse");
        let directories = Directories {
            open_bills: vec![OpenBill {
                bill_id: Uuid::new_v4(),
                vendor_id: v.vendor_id,
                total_amount: "320.00".parse().unwrap(),
            }],
            vendors: vec![v],
            ..Default::default()
        };
        let suggestions = suggest(
            &tx("CHECK 1024", "320.00", TransactionType::Withdrawal),
            &directories,
        );
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].kind, SuggestionKind::Bill);
        assert_eq!(suggestions[0].name, "Office Warehouse");
    }
}
