use std::f64::consts::TAU;

use budgetwise_core::{RecurrencePattern, Transaction};
use chrono::Datelike;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::config::RecurrenceConfig;
use crate::normalize::normalize_merchant;
use crate::similarity::similarity;

/// Length of the day-of-month cycle. Using the longest month keeps the 30th
/// and the 1st two days apart.
const MONTH_CYCLE_DAYS: f64 = 31.0;

/// Decides whether a transaction belongs to a monthly recurring charge.
#[derive(Debug, Clone, Default)]
pub struct RecurringDetector {
    config: RecurrenceConfig,
}

impl RecurringDetector {
    pub fn new(config: RecurrenceConfig) -> Self {
        Self { config }
    }

    /// Returns `Some(Monthly)` if enough similar historical charges land on
    /// roughly the same day of the month, `None` otherwise.
    pub fn detect(&self, subject: &Transaction, history: &[Transaction]) -> Option<RecurrencePattern> {
        let candidates = self.candidates(subject, history);
        if candidates.len() < self.config.min_occurrences.max(1) {
            return None;
        }

        let days: Vec<u32> = candidates.iter().map(|t| t.date.day()).collect();
        if days_cluster(&days, self.config.day_tolerance) {
            tracing::debug!(
                merchant = %subject.description,
                occurrences = days.len(),
                "monthly recurrence detected"
            );
            Some(RecurrencePattern::Monthly)
        } else {
            None
        }
    }

    /// Historical transactions (other than the subject) with a similar
    /// amount and merchant.
    fn candidates<'a>(&self, subject: &Transaction, history: &'a [Transaction]) -> Vec<&'a Transaction> {
        let merchant = normalize_merchant(&subject.description);
        if merchant.is_empty() {
            return Vec::new();
        }

        let amount = subject.amount.abs().as_decimal();
        let tolerance = Decimal::from_f64(self.config.amount_tolerance).unwrap_or_default();
        let max_diff = amount * tolerance;

        history
            .iter()
            .filter(|t| t.id != subject.id)
            .filter(|t| (t.amount.abs().as_decimal() - amount).abs() <= max_diff)
            .filter(|t| {
                similarity(&normalize_merchant(&t.description), &merchant) > self.config.min_similarity
            })
            .collect()
    }
}

/// True when every day lies within `tolerance` days of the circular mean
/// day-of-month.
fn days_cluster(days: &[u32], tolerance: f64) -> bool {
    if days.is_empty() {
        return false;
    }

    let angle = |day: u32| TAU * f64::from(day.saturating_sub(1)) / MONTH_CYCLE_DAYS;
    let (sin_sum, cos_sum) = days
        .iter()
        .fold((0.0f64, 0.0f64), |(s, c), &d| (s + angle(d).sin(), c + angle(d).cos()));

    // Days spread evenly around the month have no meaningful mean.
    let resultant = (sin_sum * sin_sum + cos_sum * cos_sum).sqrt() / days.len() as f64;
    if resultant < 1e-9 {
        return false;
    }

    let mean = sin_sum.atan2(cos_sum);
    days.iter().all(|&d| {
        let diff = (angle(d) - mean).rem_euclid(TAU);
        let distance = diff.min(TAU - diff) * MONTH_CYCLE_DAYS / TAU;
        distance <= tolerance + 1e-9
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetwise_core::{Money, TransactionId};
    use chrono::NaiveDate;

    fn tx(id: i64, date: (i32, u32, u32), desc: &str, cents: i64) -> Transaction {
        Transaction::new(
            TransactionId(id),
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            desc,
            Money::from_cents(cents),
        )
    }

    #[test]
    fn month_boundary_cluster_is_monthly() {
        let history = vec![
            tx(1, (2024, 1, 1), "NETFLIX.COM", -1599),
            tx(2, (2024, 2, 3), "NETFLIX.COM", -1599),
            tx(3, (2024, 3, 30), "NETFLIX.COM", -1599),
        ];
        let detector = RecurringDetector::default();
        assert_eq!(detector.detect(&history[0], &history), Some(RecurrencePattern::Monthly));
    }

    #[test]
    fn single_prior_occurrence_is_not_recurring() {
        let history = vec![
            tx(1, (2024, 1, 5), "SPOTIFY USA", -1099),
            tx(2, (2024, 2, 5), "SPOTIFY USA", -1099),
        ];
        assert_eq!(RecurringDetector::default().detect(&history[1], &history), None);
    }

    #[test]
    fn scattered_days_are_not_recurring() {
        let history = vec![
            tx(1, (2024, 1, 2), "CORNER BAKERY", -1200),
            tx(2, (2024, 2, 10), "CORNER BAKERY", -1200),
            tx(3, (2024, 3, 20), "CORNER BAKERY", -1200),
        ];
        assert_eq!(RecurringDetector::default().detect(&history[0], &history), None);
    }

    #[test]
    fn amounts_outside_tolerance_are_ignored() {
        let history = vec![
            tx(1, (2024, 1, 15), "CITY GYM", -5000),
            tx(2, (2024, 2, 15), "CITY GYM", -5600),
            tx(3, (2024, 3, 15), "CITY GYM", -4400),
        ];
        assert_eq!(RecurringDetector::default().detect(&history[0], &history), None);

        let within = vec![
            tx(1, (2024, 1, 15), "CITY GYM", -5000),
            tx(2, (2024, 2, 15), "CITY GYM", -5500),
            tx(3, (2024, 3, 15), "CITY GYM", -4500),
        ];
        assert_eq!(
            RecurringDetector::default().detect(&within[0], &within),
            Some(RecurrencePattern::Monthly)
        );
    }

    #[test]
    fn different_merchants_are_ignored() {
        let history = vec![
            tx(1, (2024, 1, 15), "CITY GYM", -5000),
            tx(2, (2024, 2, 15), "RIVERSIDE DENTAL", -5000),
            tx(3, (2024, 3, 15), "HARBOR PARKING", -5000),
        ];
        assert_eq!(RecurringDetector::default().detect(&history[0], &history), None);
    }

    #[test]
    fn opposite_days_have_no_mean() {
        assert!(!days_cluster(&[1, 16], 3.0));
        assert!(days_cluster(&[14, 15, 16], 3.0));
        assert!(!days_cluster(&[], 3.0));
    }
}
