use budgetwise_core::{CategorizationStore, Pattern, PatternId, Suggestion, Transaction};
use chrono::Utc;

use crate::confidence::{ConfidenceBreakdown, ConfidenceCalculator};
use crate::config::{clamp_threshold, EngineConfig};
use crate::error::EngineError;
use crate::miner::{MiningSummary, PatternMiner};
use crate::normalize::normalize_merchant;
use crate::recurring::RecurringDetector;

/// The highest-scoring pattern for a transaction, above the threshold.
#[derive(Debug, Clone)]
pub struct BestMatch<'a> {
    pub pattern: &'a Pattern,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoCategorizeSummary {
    pub suggested: usize,
    pub no_match: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feedback {
    Accept,
    Deny,
}

/// Proposes categories for uncategorized transactions from learned patterns
/// and folds accept/deny feedback back into those patterns.
///
/// The in-memory pattern set is only refreshed by [`reload_patterns`] (and by
/// [`learn`], which reloads after merging). Feedback updates are
/// read-modify-write without locking, so callers must not run two feedback
/// operations against the same pattern concurrently.
///
/// [`reload_patterns`]: SuggestionEngine::reload_patterns
/// [`learn`]: SuggestionEngine::learn
pub struct SuggestionEngine<S> {
    store: S,
    patterns: Vec<Pattern>,
    confidence_threshold: f64,
    calculator: ConfidenceCalculator,
    miner: PatternMiner,
}

impl<S: CategorizationStore> SuggestionEngine<S> {
    /// Creates an engine with no patterns loaded.
    pub fn new(store: S, config: EngineConfig) -> Self {
        let detector = RecurringDetector::new(config.recurrence.clone());
        Self {
            store,
            patterns: Vec::new(),
            confidence_threshold: clamp_threshold(config.confidence_threshold),
            calculator: ConfidenceCalculator::new(),
            miner: PatternMiner::new(detector),
        }
    }

    /// Creates an engine and loads the persisted patterns.
    pub async fn load(store: S, config: EngineConfig) -> Result<Self, EngineError> {
        let mut engine = Self::new(store, config);
        engine.reload_patterns().await?;
        Ok(engine)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Sets the acceptance threshold, clamped to [0, 100].
    pub fn set_confidence_threshold(&mut self, threshold: f64) {
        self.confidence_threshold = clamp_threshold(threshold);
    }

    /// Replaces the in-memory patterns with the persisted set.
    pub async fn reload_patterns(&mut self) -> Result<usize, EngineError> {
        self.patterns = self.store.get_patterns().await?;
        tracing::debug!(patterns = self.patterns.len(), "patterns reloaded");
        Ok(self.patterns.len())
    }

    /// Mines `transactions`, merges the result into the store and reloads.
    pub async fn learn(&mut self, transactions: &[Transaction]) -> Result<MiningSummary, EngineError> {
        let mined = self.miner.mine(transactions, Utc::now());
        let existing = self.store.get_patterns().await?;
        let summary = self.miner.merge_into(&self.store, &existing, mined).await?;
        self.reload_patterns().await?;

        tracing::info!(
            mined = summary.mined,
            created = summary.created,
            updated = summary.updated,
            "pattern mining complete"
        );
        Ok(summary)
    }

    /// Scores `tx` against every loaded pattern and returns the best one if it
    /// reaches the threshold. Ties keep the first pattern encountered.
    pub fn find_best_match(&self, tx: &Transaction) -> Option<BestMatch<'_>> {
        let merchant = normalize_merchant(&tx.description);
        if merchant.is_empty() {
            return None;
        }

        let mut best: Option<(&Pattern, ConfidenceBreakdown, f64)> = None;
        for pattern in &self.patterns {
            let breakdown = self.calculator.breakdown_for_merchant(tx, &merchant, pattern);
            let score = breakdown.total();
            if best.as_ref().map_or(true, |(_, _, top)| score > *top) {
                best = Some((pattern, breakdown, score));
            }
        }

        let (pattern, breakdown, confidence) = best?;
        if confidence < self.confidence_threshold {
            tracing::debug!(
                transaction = %tx.id,
                merchant = %merchant,
                confidence,
                threshold = self.confidence_threshold,
                "best match below threshold"
            );
            return None;
        }

        Some(BestMatch {
            pattern,
            confidence,
            reasoning: build_reasoning(pattern, &breakdown),
        })
    }

    /// Attaches a suggestion to every uncategorized, unsplit transaction that
    /// has a match, persisting each one before moving on.
    pub async fn auto_categorize(
        &self,
        transactions: &mut [Transaction],
    ) -> Result<AutoCategorizeSummary, EngineError> {
        let mut summary = AutoCategorizeSummary::default();

        for tx in transactions.iter_mut().filter(|t| t.is_categorizable()) {
            let proposal = self.find_best_match(tx).and_then(|m| {
                m.pattern.id.map(|pattern_id| {
                    (
                        m.pattern.category_id,
                        Suggestion {
                            pattern_id,
                            confidence: m.confidence,
                            reasoning: m.reasoning,
                        },
                    )
                })
            });

            match proposal {
                Some((category_id, suggestion)) => {
                    tracing::debug!(
                        transaction = %tx.id,
                        category = %category_id,
                        confidence = suggestion.confidence,
                        "category suggested"
                    );
                    tx.apply_suggestion(category_id, suggestion);
                    self.store.update_transaction(tx).await?;
                    summary.suggested += 1;
                }
                None => summary.no_match += 1,
            }
        }

        tracing::info!(
            suggested = summary.suggested,
            no_match = summary.no_match,
            "auto-categorization complete"
        );
        Ok(summary)
    }

    /// Confirms a pending suggestion: the category stays, the pattern's accept
    /// count goes up. No-op without a pending suggestion.
    pub async fn accept_suggestion(&mut self, tx: &mut Transaction) -> Result<(), EngineError> {
        self.review(tx, Feedback::Accept).await
    }

    /// Rejects a pending suggestion: the category is removed and the pattern's
    /// deny count goes up. No-op without a pending suggestion.
    pub async fn deny_suggestion(&mut self, tx: &mut Transaction) -> Result<(), EngineError> {
        self.review(tx, Feedback::Deny).await
    }

    /// Accepts every pending suggestion in iteration order.
    pub async fn accept_all_pending(&mut self, transactions: &mut [Transaction]) -> Result<usize, EngineError> {
        let mut processed = 0;
        for tx in transactions.iter_mut().filter(|t| t.is_pending_review()) {
            self.accept_suggestion(tx).await?;
            processed += 1;
        }
        tracing::info!(accepted = processed, "accepted all pending suggestions");
        Ok(processed)
    }

    /// Persists the pattern feedback and the reviewed transaction. `tx` and the
    /// loaded patterns only change once both writes succeed; if the
    /// transaction write fails, the stored pattern is put back.
    async fn review(&mut self, tx: &mut Transaction, feedback: Feedback) -> Result<(), EngineError> {
        let Some(pattern_id) = tx.suggestion.as_ref().map(|s| s.pattern_id) else {
            return Ok(());
        };

        let mut reviewed = tx.clone();
        reviewed.clear_suggestion();
        if feedback == Feedback::Deny {
            reviewed.category_id = None;
        }

        let update = self.pattern_with_feedback(pattern_id, feedback);
        if let Some((_, updated)) = &update {
            self.store.update_pattern(updated).await?;
        }

        if let Err(err) = self.store.update_transaction(&reviewed).await {
            if let Some((index, _)) = &update {
                if let Err(restore) = self.store.update_pattern(&self.patterns[*index]).await {
                    tracing::error!(
                        pattern_id = %pattern_id,
                        error = %restore,
                        "failed to restore pattern after transaction write error"
                    );
                }
            }
            return Err(err.into());
        }

        if let Some((index, updated)) = update {
            tracing::debug!(
                pattern_id = %pattern_id,
                accepts = updated.accept_count,
                denies = updated.deny_count,
                "feedback recorded"
            );
            self.patterns[index] = updated;
        }
        *tx = reviewed;
        Ok(())
    }

    /// The loaded pattern with `feedback` applied, alongside its index.
    /// `None` when the pattern is not loaded.
    fn pattern_with_feedback(&self, pattern_id: PatternId, feedback: Feedback) -> Option<(usize, Pattern)> {
        let Some(index) = self.patterns.iter().position(|p| p.id == Some(pattern_id)) else {
            tracing::warn!(pattern_id = %pattern_id, ?feedback, "feedback for unknown pattern skipped");
            return None;
        };

        let mut updated = self.patterns[index].clone();
        match feedback {
            Feedback::Accept => {
                updated.accept_count = updated.accept_count.saturating_add(1);
                updated.last_seen = Utc::now();
            }
            Feedback::Deny => updated.deny_count = updated.deny_count.saturating_add(1),
        }
        Some((index, updated))
    }
}

fn build_reasoning(pattern: &Pattern, breakdown: &ConfidenceBreakdown) -> String {
    let mut parts: Vec<String> = Vec::new();

    if breakdown.merchant_similarity > 95.0 {
        parts.push("Exact match".to_string());
    } else if breakdown.merchant_similarity > 70.0 {
        parts.push(format!("Similar to {}", pattern.merchant_name));
    }

    match pattern.match_count {
        0 => {}
        1 => parts.push("seen 1 time before".to_string()),
        n => parts.push(format!("seen {n} times before")),
    }

    if pattern.is_recurring() {
        parts.push("recurring transaction".to_string());
    }
    if breakdown.exact_amount {
        parts.push("exact amount match".to_string());
    }

    parts.join(", ")
}
