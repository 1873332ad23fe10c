use crate::util::levenshtein_distance;

/// Score awarded when one merchant token contains the other.
pub const CONTAINS_SCORE: f64 = 85.0;

/// Compares two merchant tokens and returns a similarity score in [0, 100].
///
/// Case-insensitive equality scores 100 and containment scores 85. Anything
/// else falls back to `100 * (max_len - edit_distance) / max_len`.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if a == b {
        return 100.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return CONTAINS_SCORE;
    }

    let max_len = a.chars().count().max(b.chars().count());
    let distance = levenshtein_distance(&a, &b);
    let score = 100.0 * (max_len as f64 - distance as f64) / max_len as f64;
    score.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(similarity("", "Walmart"), 0.0);
        assert_eq!(similarity("Walmart", ""), 0.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn exact_match_ignores_case() {
        assert_eq!(similarity("Walmart", "WALMART"), 100.0);
        assert_eq!(similarity("a", "a"), 100.0);
    }

    #[test]
    fn containment_scores_85() {
        assert_eq!(similarity("Starbucks", "STARBUCKS RESERVE"), 85.0);
        assert_eq!(similarity("STARBUCKS RESERVE", "Starbucks"), 85.0);
    }

    #[test]
    fn edit_distance_fallback() {
        // kitten -> sitting: distance 3 over 7 chars.
        let score = similarity("kitten", "sitting");
        assert!((score - 400.0 / 7.0).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn unrelated_merchants_score_low() {
        assert!(similarity("Amazon", "Starbucks") < 50.0);
    }

    #[test]
    fn symmetric() {
        let pairs = [("Walmart", "Walgreens"), ("Uber", "Uber Eats"), ("Shell", "Chevron")];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a} vs {b}");
        }
    }
}
