//! Description normalization and payee-name scoring.

/// Canonicalize free text for comparison: lowercase, replace everything
/// outside `[a-z0-9]` with a space, collapse whitespace, trim.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score how strongly `candidate_name` shows up inside `description`.
///
/// 0.9 when the whole normalized name appears verbatim. Otherwise the share
/// of the candidate's words (longer than 2 chars) that partially match a
/// description token, scaled to 0.7. The check is containment in either
/// direction because bank statements truncate and abbreviate payee names;
/// the scoring is deliberately asymmetric (description-contains-candidate,
/// never the reverse).
pub fn name_score(description: &str, candidate_name: &str) -> f64 {
    let desc = normalize(description);
    let name = normalize(candidate_name);

    if name.is_empty() {
        return 0.0;
    }
    if desc.contains(&name) {
        return 0.9;
    }

    let desc_tokens: Vec<&str> = desc.split(' ').filter(|t| !t.is_empty()).collect();
    let words: Vec<&str> = name.split(' ').filter(|w| w.len() > 2).collect();
    if words.is_empty() {
        return 0.0;
    }

    let matched = words
        .iter()
        .filter(|&&w| desc_tokens.iter().any(|&t| t.contains(w) || w.contains(t)))
        .count();

    matched as f64 / words.len() as f64 * 0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  PAYMENT*FROM:ACME, Ltd.  "), "payment from acme ltd");
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("a   b\t\nc"), "a b c");
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize("***"), "");
    }

    #[test]
    fn full_name_substring_scores_high() {
        // Whole payee name appears verbatim in the statement text
        let score = name_score("PAYMENT FROM JOHN DOE ENTERPRISES", "John Doe Enterprises");
        assert_eq!(score, 0.9);
    }

    #[test]
    fn partial_word_overlap_scores_proportionally() {
        // 2 of 3 qualifying words (john, doe) match truncated statement text
        let score = name_score("PYMT JOHN DOE", "John Doe Enterprises");
        assert!((score - 2.0 / 3.0 * 0.7).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn truncated_token_still_matches() {
        // Banks cut names short; containment goes both ways
        let score = name_score("ACMECORP PAYROLL", "Acmecorporation");
        assert!(score > 0.0);
    }

    #[test]
    fn short_words_do_not_qualify() {
        // Candidate made only of 1-2 char words has nothing to score on
        // once the full-name check misses
        assert_eq!(name_score("PAYMENT REF 0042", "AB CD"), 0.0);
    }

    #[test]
    fn unrelated_names_score_zero() {
        assert_eq!(name_score("STARBUCKS COFFEE 0417", "Globex Industrial"), 0.0);
    }

    #[test]
    fn empty_candidate_scores_zero() {
        assert_eq!(name_score("ANYTHING", ""), 0.0);
    }
}
