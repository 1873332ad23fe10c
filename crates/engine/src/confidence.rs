use budgetwise_core::{Money, Pattern, Transaction};
use rust_decimal::Decimal;

use crate::normalize::normalize_merchant;
use crate::similarity::similarity;

const MAX_VOLUME_POINTS: f64 = 40.0;
const POINTS_PER_MATCH: f64 = 5.0;
const SIMILARITY_WEIGHT: f64 = 30.0;
const EXACT_AMOUNT_POINTS: f64 = 20.0;
const IN_RANGE_POINTS: f64 = 15.0;
const NEAR_RANGE_POINTS: f64 = 10.0;
const RECURRING_POINTS: f64 = 10.0;
const HIGH_ACCEPTANCE_POINTS: f64 = 10.0;
const LOW_ACCEPTANCE_PENALTY: f64 = -20.0;

/// Per-factor contributions to a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidenceBreakdown {
    pub volume: f64,
    /// Raw 0–100 merchant similarity, before weighting.
    pub merchant_similarity: f64,
    pub similarity: f64,
    pub amount: f64,
    pub exact_amount: bool,
    pub recurrence: f64,
    pub feedback: f64,
}

impl ConfidenceBreakdown {
    /// Sum of all factors, clamped to [0, 100].
    pub fn total(&self) -> f64 {
        let sum = self.volume + self.similarity + self.amount + self.recurrence + self.feedback;
        if sum.is_nan() {
            0.0
        } else {
            sum.clamp(0.0, 100.0)
        }
    }
}

/// Scores a transaction against a single candidate pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceCalculator;

impl ConfidenceCalculator {
    pub fn new() -> Self {
        ConfidenceCalculator
    }

    pub fn confidence(&self, tx: &Transaction, pattern: &Pattern) -> f64 {
        self.breakdown(tx, pattern).total()
    }

    pub fn breakdown(&self, tx: &Transaction, pattern: &Pattern) -> ConfidenceBreakdown {
        let merchant = normalize_merchant(&tx.description);
        self.breakdown_for_merchant(tx, &merchant, pattern)
    }

    /// Same as [`breakdown`](Self::breakdown) with the transaction's merchant
    /// already normalized, so batch callers normalize once per transaction.
    pub fn breakdown_for_merchant(
        &self,
        tx: &Transaction,
        merchant: &str,
        pattern: &Pattern,
    ) -> ConfidenceBreakdown {
        let volume = (f64::from(pattern.match_count) * POINTS_PER_MATCH).min(MAX_VOLUME_POINTS);

        let merchant_similarity = similarity(merchant, &pattern.merchant_name);
        let weighted_similarity = merchant_similarity / 100.0 * SIMILARITY_WEIGHT;

        let (amount, exact_amount) = amount_points(tx.amount.abs(), pattern);

        let recurrence = if pattern.is_recurring() { RECURRING_POINTS } else { 0.0 };

        let feedback = match pattern.acceptance_ratio() {
            Some(ratio) if ratio >= 0.9 => HIGH_ACCEPTANCE_POINTS,
            Some(ratio) if ratio < 0.5 => LOW_ACCEPTANCE_PENALTY,
            _ => 0.0,
        };

        ConfidenceBreakdown {
            volume,
            merchant_similarity,
            similarity: weighted_similarity,
            amount,
            exact_amount,
            recurrence,
            feedback,
        }
    }
}

/// True when `amount` equals `target` to within one cent.
pub fn is_exact_amount(amount: Money, target: Money) -> bool {
    (amount - target).abs() <= Money::from_cents(1)
}

fn amount_points(amount: Money, pattern: &Pattern) -> (f64, bool) {
    let Some(range) = pattern.amount_range else {
        return (0.0, false);
    };

    if is_exact_amount(amount, range.min()) {
        return (EXACT_AMOUNT_POINTS, true);
    }
    if range.contains(amount) {
        return (IN_RANGE_POINTS, false);
    }

    let value = amount.as_decimal();
    let lower = range.min().scaled(Decimal::new(9, 1));
    let upper = range.max().scaled(Decimal::new(11, 1));
    if value >= lower && value <= upper {
        (NEAR_RANGE_POINTS, false)
    } else {
        (0.0, false)
    }
}
