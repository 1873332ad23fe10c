use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::pattern::{Pattern, PatternId};
use crate::transaction::{CategoryId, Transaction, TransactionId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Pattern not found: {0}")]
    PatternNotFound(PatternId),
    #[error("Pattern for '{0}' has not been saved yet")]
    UnsavedPattern(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("Pattern already exists for '{merchant_name}' in category {category_id}")]
    DuplicatePattern {
        merchant_name: String,
        category_id: CategoryId,
    },
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Persistence operations the categorization engine depends on.
/// The engine never deletes patterns or transactions.
#[async_trait]
pub trait CategorizationStore: Send + Sync {
    async fn get_patterns(&self) -> Result<Vec<Pattern>, StoreError>;

    /// Inserts a new pattern and returns its assigned id. Fails with
    /// `DuplicatePattern` if the (merchant, category) pair already exists.
    async fn add_pattern(&self, pattern: &Pattern) -> Result<PatternId, StoreError>;

    async fn update_pattern(&self, pattern: &Pattern) -> Result<(), StoreError>;

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;
}

// ── In-memory store (always available, used for tests) ──────────────────────

#[derive(Debug, Error)]
#[error("simulated write failure")]
struct SimulatedFailure;

/// Keeps everything in process memory. Transactions are upserted on update,
/// since the engine only ever writes back records it was handed.
#[derive(Default)]
pub struct MemoryStore {
    patterns: Mutex<Vec<Pattern>>,
    transactions: Mutex<HashMap<TransactionId, Transaction>>,
    next_id: Mutex<i64>,
    fail_writes: AtomicBool,
    fail_transaction_writes: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes only transaction writes fail; pattern writes still succeed.
    pub fn set_fail_transaction_writes(&self, fail: bool) {
        self.fail_transaction_writes.store(fail, Ordering::SeqCst);
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        lock(&self.patterns).clone()
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        lock(&self.transactions).get(&id).cloned()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::backend(SimulatedFailure))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CategorizationStore for MemoryStore {
    async fn get_patterns(&self) -> Result<Vec<Pattern>, StoreError> {
        Ok(self.patterns())
    }

    async fn add_pattern(&self, pattern: &Pattern) -> Result<PatternId, StoreError> {
        self.check_writable()?;
        let mut patterns = lock(&self.patterns);
        if patterns.iter().any(|p| p.same_key(pattern)) {
            return Err(StoreError::DuplicatePattern {
                merchant_name: pattern.merchant_name.clone(),
                category_id: pattern.category_id,
            });
        }

        let mut next_id = lock(&self.next_id);
        *next_id += 1;
        let id = PatternId(*next_id);

        let mut stored = pattern.clone();
        stored.id = Some(id);
        patterns.push(stored);
        Ok(id)
    }

    async fn update_pattern(&self, pattern: &Pattern) -> Result<(), StoreError> {
        self.check_writable()?;
        let id = pattern
            .id
            .ok_or_else(|| StoreError::UnsavedPattern(pattern.merchant_name.clone()))?;
        let mut patterns = lock(&self.patterns);
        let slot = patterns
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or(StoreError::PatternNotFound(id))?;
        *slot = pattern.clone();
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.fail_transaction_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend(SimulatedFailure));
        }
        lock(&self.transactions).insert(transaction.id, transaction.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use chrono::{NaiveDate, Utc};

    fn pattern(merchant: &str, category: i64) -> Pattern {
        Pattern::new(merchant, CategoryId(category), Utc::now())
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids() {
        let store = MemoryStore::new();
        let a = store.add_pattern(&pattern("Walmart", 1)).await.unwrap();
        let b = store.add_pattern(&pattern("Walmart", 2)).await.unwrap();
        assert_eq!(a, PatternId(1));
        assert_eq!(b, PatternId(2));
        assert_eq!(store.get_patterns().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_rejects_duplicate_key() {
        let store = MemoryStore::new();
        store.add_pattern(&pattern("Walmart", 1)).await.unwrap();
        let err = store.add_pattern(&pattern("Walmart", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePattern { .. }));
    }

    #[tokio::test]
    async fn update_unknown_pattern_fails() {
        let store = MemoryStore::new();
        let mut p = pattern("Target", 1);
        p.id = Some(PatternId(42));
        let err = store.update_pattern(&p).await.unwrap_err();
        assert!(matches!(err, StoreError::PatternNotFound(PatternId(42))));
    }

    #[tokio::test]
    async fn failing_writes_surface_backend_errors() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let tx = Transaction::new(
            TransactionId(1),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "TARGET",
            Money::from_cents(-100),
        );
        assert!(matches!(
            store.update_transaction(&tx).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.transaction(TransactionId(1)).is_none());
    }
}
