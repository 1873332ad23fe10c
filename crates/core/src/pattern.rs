use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::transaction::CategoryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub i64);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Monthly,
}

impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrencePattern::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for RecurrencePattern {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(RecurrencePattern::Monthly),
            other => Err(format!("Unknown recurrence pattern: '{other}'")),
        }
    }
}

/// Observed absolute-amount range. `min <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    min: Money,
    max: Money,
}

impl AmountRange {
    pub fn new(a: Money, b: Money) -> Self {
        if a <= b {
            AmountRange { min: a, max: b }
        } else {
            AmountRange { min: b, max: a }
        }
    }

    /// Range over the absolute values of `amounts`; `None` when empty.
    pub fn from_amounts<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts.into_iter().map(Money::abs).fold(None, |acc, m| match acc {
            None => Some(AmountRange { min: m, max: m }),
            Some(r) => Some(AmountRange {
                min: r.min.min(m),
                max: r.max.max(m),
            }),
        })
    }

    pub fn min(&self) -> Money {
        self.min
    }

    pub fn max(&self) -> Money {
        self.max
    }

    pub fn contains(&self, amount: Money) -> bool {
        amount >= self.min && amount <= self.max
    }

    pub fn union(self, other: AmountRange) -> Self {
        AmountRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// A learned merchant → category association with usage and feedback tallies.
/// Unique per (`merchant_name`, `category_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Option<PatternId>,
    pub merchant_name: String,
    pub category_id: CategoryId,
    pub match_count: u32,
    pub accept_count: u32,
    pub deny_count: u32,
    pub last_seen: DateTime<Utc>,
    pub amount_range: Option<AmountRange>,
    pub recurrence: Option<RecurrencePattern>,
}

impl Pattern {
    pub fn new(merchant_name: &str, category_id: CategoryId, last_seen: DateTime<Utc>) -> Self {
        Pattern {
            id: None,
            merchant_name: merchant_name.to_string(),
            category_id,
            match_count: 0,
            accept_count: 0,
            deny_count: 0,
            last_seen,
            amount_range: None,
            recurrence: None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn same_key(&self, other: &Pattern) -> bool {
        self.merchant_name == other.merchant_name && self.category_id == other.category_id
    }

    pub fn feedback_total(&self) -> u32 {
        self.accept_count.saturating_add(self.deny_count)
    }

    /// Share of feedback that was an accept; `None` without any feedback.
    pub fn acceptance_ratio(&self) -> Option<f64> {
        let total = self.feedback_total();
        if total == 0 {
            None
        } else {
            Some(f64::from(self.accept_count) / f64::from(total))
        }
    }
}
