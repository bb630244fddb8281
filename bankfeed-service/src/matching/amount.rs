//! Tiered amount-closeness scoring.

use rust_decimal::Decimal;

/// Score how close a transaction amount is to a document total, on absolute
/// values rounded to cents.
///
/// Exact equality scores 1.0. Within the tolerance (5% of the larger amount)
/// scores 0.95, within five times the tolerance 0.7, anything further 0.0.
/// When both amounts are zero the tolerance degenerates to zero and only
/// exact equality qualifies.
pub fn amount_score(transaction_amount: Decimal, document_amount: Decimal) -> f64 {
    let a = transaction_amount.abs().round_dp(2);
    let b = document_amount.abs().round_dp(2);

    if a == b {
        return 1.0;
    }

    let tolerance = a.max(b) * Decimal::new(5, 2);
    let diff = (a - b).abs();

    if diff <= tolerance {
        0.95
    } else if diff <= tolerance * Decimal::from(5) {
        0.7
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn equal_amounts_score_one() {
        for s in ["0", "0.01", "1500.00", "99999.99"] {
            assert_eq!(amount_score(dec(s), dec(s)), 1.0, "amount {s}");
        }
    }

    #[test]
    fn equal_after_rounding_scores_one() {
        assert_eq!(amount_score(dec("10.004"), dec("10.00")), 1.0);
    }

    #[test]
    fn small_difference_scores_near_exact() {
        // 0.9% apart
        assert_eq!(amount_score(dec("1000"), dec("1009")), 0.95);
    }

    #[test]
    fn moderate_difference_scores_close() {
        // 20% apart - inside the wide band, outside the tight one
        assert_eq!(amount_score(dec("1000"), dec("1200")), 0.7);
    }

    #[test]
    fn large_difference_scores_zero() {
        assert_eq!(amount_score(dec("1000"), dec("2000")), 0.0);
    }

    #[test]
    fn zero_against_nonzero_scores_zero() {
        assert_eq!(amount_score(Decimal::ZERO, dec("10")), 0.0);
        assert_eq!(amount_score(dec("10"), Decimal::ZERO), 0.0);
    }

    #[test]
    fn sign_is_ignored() {
        assert_eq!(amount_score(dec("-1500"), dec("1500")), 1.0);
    }
}
