use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 70.0;

/// Clamps a threshold into [0, 100]; NaN falls back to the default.
pub fn clamp_threshold(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_CONFIDENCE_THRESHOLD
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Tuning for recurring-charge detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrenceConfig {
    /// Allowed deviation from the subject's absolute amount, as a fraction.
    pub amount_tolerance: f64,
    /// Merchant similarity a candidate must exceed.
    pub min_similarity: f64,
    /// Max distance (days) of each candidate from the mean day-of-month.
    pub day_tolerance: f64,
    pub min_occurrences: usize,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: 0.10,
            min_similarity: 70.0,
            day_tolerance: 3.0,
            min_occurrences: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub confidence_threshold: f64,
    pub recurrence: RecurrenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            recurrence: RecurrenceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, EngineError> {
        let mut config: EngineConfig = toml::from_str(toml_content)
            .map_err(|e| EngineError::Config(format!("Failed to parse TOML: {e}")))?;
        config.confidence_threshold = clamp_threshold(config.confidence_threshold);
        if config.recurrence.amount_tolerance < 0.0 || config.recurrence.day_tolerance < 0.0 {
            return Err(EngineError::Config(
                "recurrence tolerances must not be negative".to_string(),
            ));
        }
        Ok(config)
    }
}
