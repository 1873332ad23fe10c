use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::pattern::PatternId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a category owned by the surrounding budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A category proposed by the engine and awaiting user review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub pattern_id: PatternId,
    /// Score in [0, 100].
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub category_id: Option<CategoryId>,
    pub is_split: bool,
    /// Present only while the transaction is pending review.
    pub suggestion: Option<Suggestion>,
}

impl Transaction {
    pub fn new(id: TransactionId, date: NaiveDate, description: &str, amount: Money) -> Self {
        Transaction {
            id,
            date,
            description: description.to_string(),
            amount,
            category_id: None,
            is_split: false,
            suggestion: None,
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn is_pending_review(&self) -> bool {
        self.suggestion.is_some()
    }

    /// Uncategorized and not split: the only state that may receive a suggestion.
    pub fn is_categorizable(&self) -> bool {
        self.category_id.is_none() && !self.is_split
    }

    /// Categorized by the user (or accepted), i.e. usable as history.
    pub fn is_confirmed(&self) -> bool {
        self.category_id.is_some() && !self.is_split && self.suggestion.is_none()
    }

    pub fn apply_suggestion(&mut self, category_id: CategoryId, suggestion: Suggestion) {
        self.category_id = Some(category_id);
        self.suggestion = Some(suggestion);
    }

    pub fn clear_suggestion(&mut self) -> Option<Suggestion> {
        self.suggestion.take()
    }
}
