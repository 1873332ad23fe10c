use std::collections::HashMap;

use budgetwise_core::{AmountRange, CategorizationStore, CategoryId, Pattern, Transaction};
use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::normalize::normalize_merchant;
use crate::recurring::RecurringDetector;

/// Counts from one mining pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiningSummary {
    pub mined: usize,
    pub created: usize,
    pub updated: usize,
}

/// Turns categorized history into merchant → category patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternMiner {
    detector: RecurringDetector,
}

impl PatternMiner {
    pub fn new(detector: RecurringDetector) -> Self {
        Self { detector }
    }

    /// Groups confirmed transactions by (merchant, category) and builds one
    /// pattern per group, in first-seen order. Returned patterns carry no id.
    pub fn mine(&self, transactions: &[Transaction], now: DateTime<Utc>) -> Vec<Pattern> {
        let mut index: HashMap<(String, CategoryId), usize> = HashMap::new();
        let mut groups: Vec<(String, CategoryId, Vec<Transaction>)> = Vec::new();

        for tx in transactions.iter().filter(|t| t.is_confirmed()) {
            let Some(category_id) = tx.category_id else {
                continue;
            };
            let merchant = normalize_merchant(&tx.description);
            if merchant.is_empty() {
                continue;
            }

            let key = (merchant, category_id);
            match index.get(&key) {
                Some(&i) => groups[i].2.push(tx.clone()),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key.0, key.1, vec![tx.clone()]));
                }
            }
        }

        groups
            .into_iter()
            .map(|(merchant, category_id, members)| {
                let count = u32::try_from(members.len()).unwrap_or(u32::MAX);
                let mut pattern = Pattern::new(&merchant, category_id, now);
                pattern.match_count = count;
                // Mined history counts as implicitly accepted.
                pattern.accept_count = count;
                pattern.deny_count = 0;
                pattern.amount_range = AmountRange::from_amounts(members.iter().map(|t| t.amount));
                pattern.recurrence = members
                    .first()
                    .and_then(|first| self.detector.detect(first, &members));
                pattern
            })
            .collect()
    }

    /// Merges mined patterns into the store. An existing pattern with the same
    /// (merchant, category) is updated in place: the match count is replaced,
    /// the amount range widened, recurrence and `last_seen` replaced, and the
    /// feedback tallies left alone. Anything else is inserted.
    pub async fn merge_into<S>(
        &self,
        store: &S,
        existing: &[Pattern],
        mined: Vec<Pattern>,
    ) -> Result<MiningSummary, EngineError>
    where
        S: CategorizationStore + ?Sized,
    {
        let mut summary = MiningSummary {
            mined: mined.len(),
            ..MiningSummary::default()
        };

        for fresh in mined {
            match existing.iter().find(|p| p.same_key(&fresh)) {
                Some(current) => {
                    let merged = merge_pattern(current, &fresh);
                    store.update_pattern(&merged).await?;
                    summary.updated += 1;
                    tracing::debug!(
                        merchant = %merged.merchant_name,
                        category = %merged.category_id,
                        matches = merged.match_count,
                        "pattern updated"
                    );
                }
                None => {
                    let id = store.add_pattern(&fresh).await?;
                    summary.created += 1;
                    tracing::debug!(
                        merchant = %fresh.merchant_name,
                        category = %fresh.category_id,
                        pattern_id = %id,
                        "pattern created"
                    );
                }
            }
        }

        Ok(summary)
    }
}

fn merge_pattern(current: &Pattern, fresh: &Pattern) -> Pattern {
    let amount_range = match (current.amount_range, fresh.amount_range) {
        (Some(old), Some(new)) => Some(old.union(new)),
        (old, new) => old.or(new),
    };

    Pattern {
        id: current.id,
        merchant_name: current.merchant_name.clone(),
        category_id: current.category_id,
        match_count: fresh.match_count,
        accept_count: current.accept_count,
        deny_count: current.deny_count,
        last_seen: fresh.last_seen,
        amount_range,
        recurrence: fresh.recurrence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetwise_core::{
        MemoryStore, Money, PatternId, RecurrencePattern, Suggestion, TransactionId,
    };
    use chrono::NaiveDate;

    fn tx(id: i64, day: (i32, u32, u32), desc: &str, cents: i64, category: Option<i64>) -> Transaction {
        let mut t = Transaction::new(
            TransactionId(id),
            NaiveDate::from_ymd_opt(day.0, day.1, day.2).unwrap(),
            desc,
            Money::from_cents(cents),
        );
        t.category_id = category.map(CategoryId);
        t
    }

    #[test]
    fn empty_history_mines_nothing() {
        let miner = PatternMiner::default();
        assert!(miner.mine(&[], Utc::now()).is_empty());
        let uncategorized = vec![tx(1, (2024, 1, 1), "WALMART", -4000, None)];
        assert!(miner.mine(&uncategorized, Utc::now()).is_empty());
    }

    #[test]
    fn groups_by_merchant_and_category() {
        let history = vec![
            tx(1, (2024, 1, 3), "WALMART #1234", -4000, Some(1)),
            tx(2, (2024, 1, 9), "WAL-MART #0042", -6000, Some(1)),
            tx(3, (2024, 1, 12), "WALMART #1234", -2500, Some(2)),
            tx(4, (2024, 1, 15), "CORNER BAKERY", -800, Some(3)),
        ];
        let patterns = PatternMiner::default().mine(&history, Utc::now());
        assert_eq!(patterns.len(), 3);

        let groceries = &patterns[0];
        assert_eq!(groceries.merchant_name, "Walmart");
        assert_eq!(groceries.category_id, CategoryId(1));
        assert_eq!(groceries.match_count, 2);
        assert_eq!(groceries.accept_count, 2);
        assert_eq!(groceries.deny_count, 0);
        let range = groceries.amount_range.unwrap();
        assert_eq!(range.min(), Money::from_cents(4000));
        assert_eq!(range.max(), Money::from_cents(6000));

        assert_eq!(patterns[1].category_id, CategoryId(2));
        assert_eq!(patterns[2].merchant_name, "CORNER BAKERY");
    }

    #[test]
    fn skips_split_pending_and_merchantless_transactions() {
        let mut split = tx(1, (2024, 1, 3), "COSTCO", -9000, Some(1));
        split.is_split = true;
        let mut pending = tx(2, (2024, 1, 4), "TARGET", -2000, Some(1));
        pending.suggestion = Some(Suggestion {
            pattern_id: PatternId(1),
            confidence: 75.0,
            reasoning: String::new(),
        });
        let blank = tx(3, (2024, 1, 5), "#4411", -1000, Some(1));

        let patterns = PatternMiner::default().mine(&[split, pending, blank], Utc::now());
        assert!(patterns.is_empty());
    }

    #[test]
    fn detects_recurrence_per_group() {
        let history = vec![
            tx(1, (2024, 1, 1), "NETFLIX.COM", -1599, Some(4)),
            tx(2, (2024, 2, 3), "NETFLIX.COM", -1599, Some(4)),
            tx(3, (2024, 3, 30), "NETFLIX.COM", -1599, Some(4)),
        ];
        let patterns = PatternMiner::default().mine(&history, Utc::now());
        assert_eq!(patterns[0].recurrence, Some(RecurrencePattern::Monthly));
    }

    #[tokio::test]
    async fn merge_updates_in_place_and_keeps_feedback() {
        let store = MemoryStore::new();
        let miner = PatternMiner::default();
        let history = vec![
            tx(1, (2024, 1, 3), "WALMART", -4000, Some(1)),
            tx(2, (2024, 1, 9), "WALMART", -6000, Some(1)),
        ];

        let first = miner.merge_into(&store, &[], miner.mine(&history, Utc::now())).await.unwrap();
        assert_eq!(first, MiningSummary { mined: 1, created: 1, updated: 0 });

        // Feedback recorded between mining runs.
        let mut stored = store.get_patterns().await.unwrap();
        stored[0].accept_count = 7;
        stored[0].deny_count = 2;
        store.update_pattern(&stored[0]).await.unwrap();

        let narrower = vec![tx(3, (2024, 2, 3), "WALMART", -5000, Some(1))];
        let existing = store.get_patterns().await.unwrap();
        let second = miner
            .merge_into(&store, &existing, miner.mine(&narrower, Utc::now()))
            .await
            .unwrap();
        assert_eq!(second, MiningSummary { mined: 1, created: 0, updated: 1 });

        let patterns = store.get_patterns().await.unwrap();
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.match_count, 1);
        assert_eq!(p.accept_count, 7);
        assert_eq!(p.deny_count, 2);
        let range = p.amount_range.unwrap();
        assert_eq!((range.min(), range.max()), (Money::from_cents(4000), Money::from_cents(6000)));
    }

    #[tokio::test]
    async fn merge_propagates_store_failures() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let miner = PatternMiner::default();
        let history = vec![tx(1, (2024, 1, 3), "WALMART", -4000, Some(1))];
        let result = miner.merge_into(&store, &[], miner.mine(&history, Utc::now())).await;
        assert!(matches!(result, Err(EngineError::Store(_))));
    }
}
