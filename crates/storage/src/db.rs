use async_trait::async_trait;
use budgetwise_core::{
    AmountRange, CategorizationStore, CategoryId, Money, Pattern, PatternId, RecurrencePattern,
    StoreError, Suggestion, Transaction, TransactionId,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            merchant_name TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            match_count INTEGER NOT NULL DEFAULT 0,
            accept_count INTEGER NOT NULL DEFAULT 0,
            deny_count INTEGER NOT NULL DEFAULT 0,
            last_seen TEXT NOT NULL,
            amount_min_cents INTEGER,
            amount_max_cents INTEGER,
            is_recurring INTEGER NOT NULL DEFAULT 0,
            recurrence_pattern TEXT,
            UNIQUE (merchant_name, category_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            category_id INTEGER,
            is_split INTEGER NOT NULL DEFAULT 0,
            pending_review INTEGER NOT NULL DEFAULT 0,
            suggestion_confidence REAL,
            suggestion_reasoning TEXT,
            suggestion_pattern_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (suggestion_pattern_id) REFERENCES patterns(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_pending ON transactions(pending_review)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Transactions ──────────────────────────────────────────────────────────────

/// A transaction as handed over by an importer, before it has an id.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub category_id: Option<CategoryId>,
    pub is_split: bool,
}

type TransactionRow = (
    i64,
    String,
    String,
    i64,
    Option<i64>,
    i64,
    i64,
    Option<f64>,
    Option<String>,
    Option<i64>,
);

const TRANSACTION_COLUMNS: &str = "id, date, description, amount_cents, category_id, is_split, \
     pending_review, suggestion_confidence, suggestion_reasoning, suggestion_pattern_id";

fn transaction_from_row(r: TransactionRow) -> Result<Transaction, sqlx::Error> {
    let date = NaiveDate::parse_from_str(&r.1, "%Y-%m-%d")
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    // The four suggestion columns are only meaningful together.
    let suggestion = match (r.6 != 0, r.7, r.8, r.9) {
        (true, Some(confidence), Some(reasoning), Some(pattern_id)) => Some(Suggestion {
            pattern_id: PatternId(pattern_id),
            confidence,
            reasoning,
        }),
        _ => None,
    };

    Ok(Transaction {
        id: TransactionId(r.0),
        date,
        description: r.2,
        amount: Money::from_cents(r.3),
        category_id: r.4.map(CategoryId),
        is_split: r.5 != 0,
        suggestion,
    })
}

async fn query_transactions(pool: &DbPool, filter: &str) -> Result<Vec<Transaction>, sqlx::Error> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions {filter} ORDER BY date, id");
    let rows = sqlx::query_as::<_, TransactionRow>(&sql)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(transaction_from_row).collect()
}

pub async fn insert_transaction(pool: &DbPool, tx: &NewTransaction) -> Result<TransactionId, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO transactions (date, description, amount_cents, category_id, is_split) VALUES (?, ?, ?, ?, ?) RETURNING id"
    )
    .bind(tx.date.to_string())
    .bind(&tx.description)
    .bind(tx.amount.to_cents())
    .bind(tx.category_id.map(|c| c.0))
    .bind(i64::from(tx.is_split))
    .fetch_one(pool)
    .await?;

    Ok(TransactionId(id))
}

pub async fn get_transaction(pool: &DbPool, id: TransactionId) -> Result<Option<Transaction>, sqlx::Error> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?");
    let row = sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.map(transaction_from_row).transpose()
}

pub async fn get_all_transactions(pool: &DbPool) -> Result<Vec<Transaction>, sqlx::Error> {
    query_transactions(pool, "").await
}

pub async fn get_pending_transactions(pool: &DbPool) -> Result<Vec<Transaction>, sqlx::Error> {
    query_transactions(pool, "WHERE pending_review = 1").await
}

pub async fn get_uncategorized_transactions(pool: &DbPool) -> Result<Vec<Transaction>, sqlx::Error> {
    query_transactions(pool, "WHERE category_id IS NULL AND is_split = 0").await
}

// ── Patterns ──────────────────────────────────────────────────────────────────

type PatternRow = (
    i64,
    String,
    i64,
    i64,
    i64,
    i64,
    String,
    Option<i64>,
    Option<i64>,
    i64,
    Option<String>,
);

fn count_from_db(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn pattern_from_row(r: PatternRow) -> Result<Pattern, sqlx::Error> {
    let last_seen = DateTime::parse_from_rfc3339(&r.6)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);

    let amount_range = match (r.7, r.8) {
        (Some(min), Some(max)) => Some(AmountRange::new(Money::from_cents(min), Money::from_cents(max))),
        _ => None,
    };

    let recurrence = if r.9 != 0 {
        r.10.as_deref()
            .map(str::parse::<RecurrencePattern>)
            .transpose()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?
    } else {
        None
    };

    Ok(Pattern {
        id: Some(PatternId(r.0)),
        merchant_name: r.1,
        category_id: CategoryId(r.2),
        match_count: count_from_db(r.3),
        accept_count: count_from_db(r.4),
        deny_count: count_from_db(r.5),
        last_seen,
        amount_range,
        recurrence,
    })
}

fn map_pattern_write_error(err: sqlx::Error, pattern: &Pattern) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicatePattern {
            merchant_name: pattern.merchant_name.clone(),
            category_id: pattern.category_id,
        },
        _ => StoreError::backend(err),
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// SQLite-backed [`CategorizationStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        Ok(Self::new(create_db(path).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl CategorizationStore for SqliteStore {
    async fn get_patterns(&self) -> Result<Vec<Pattern>, StoreError> {
        let rows = sqlx::query_as::<_, PatternRow>(
            "SELECT id, merchant_name, category_id, match_count, accept_count, deny_count, last_seen, amount_min_cents, amount_max_cents, is_recurring, recurrence_pattern FROM patterns ORDER BY id"
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(pattern_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::backend)
    }

    async fn add_pattern(&self, pattern: &Pattern) -> Result<PatternId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO patterns (merchant_name, category_id, match_count, accept_count, deny_count, last_seen, amount_min_cents, amount_max_cents, is_recurring, recurrence_pattern) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id"
        )
        .bind(&pattern.merchant_name)
        .bind(pattern.category_id.0)
        .bind(i64::from(pattern.match_count))
        .bind(i64::from(pattern.accept_count))
        .bind(i64::from(pattern.deny_count))
        .bind(pattern.last_seen.to_rfc3339())
        .bind(pattern.amount_range.map(|r| r.min().to_cents()))
        .bind(pattern.amount_range.map(|r| r.max().to_cents()))
        .bind(i64::from(pattern.is_recurring()))
        .bind(pattern.recurrence.map(|r| r.to_string()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_pattern_write_error(e, pattern))?;

        tracing::debug!(pattern_id = id, merchant = %pattern.merchant_name, "pattern inserted");
        Ok(PatternId(id))
    }

    async fn update_pattern(&self, pattern: &Pattern) -> Result<(), StoreError> {
        let id = pattern
            .id
            .ok_or_else(|| StoreError::UnsavedPattern(pattern.merchant_name.clone()))?;

        let result = sqlx::query(
            "UPDATE patterns SET merchant_name = ?, category_id = ?, match_count = ?, accept_count = ?, deny_count = ?, last_seen = ?, amount_min_cents = ?, amount_max_cents = ?, is_recurring = ?, recurrence_pattern = ? WHERE id = ?"
        )
        .bind(&pattern.merchant_name)
        .bind(pattern.category_id.0)
        .bind(i64::from(pattern.match_count))
        .bind(i64::from(pattern.accept_count))
        .bind(i64::from(pattern.deny_count))
        .bind(pattern.last_seen.to_rfc3339())
        .bind(pattern.amount_range.map(|r| r.min().to_cents()))
        .bind(pattern.amount_range.map(|r| r.max().to_cents()))
        .bind(i64::from(pattern.is_recurring()))
        .bind(pattern.recurrence.map(|r| r.to_string()))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_pattern_write_error(e, pattern))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PatternNotFound(id));
        }
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let suggestion = transaction.suggestion.as_ref();
        let result = sqlx::query(
            "UPDATE transactions SET category_id = ?, pending_review = ?, suggestion_confidence = ?, suggestion_reasoning = ?, suggestion_pattern_id = ? WHERE id = ?"
        )
        .bind(transaction.category_id.map(|c| c.0))
        .bind(i64::from(suggestion.is_some()))
        .bind(suggestion.map(|s| s.confidence))
        .bind(suggestion.map(|s| s.reasoning.as_str()))
        .bind(suggestion.map(|s| s.pattern_id.0))
        .bind(transaction.id.0)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TransactionNotFound(transaction.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("budget.db")).await.unwrap();
        (dir, store)
    }

    fn new_tx(desc: &str, cents: i64, category: Option<i64>) -> NewTransaction {
        NewTransaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            description: desc.to_string(),
            amount: Money::from_cents(cents),
            category_id: category.map(CategoryId),
            is_split: false,
        }
    }

    fn walmart_pattern() -> Pattern {
        let mut p = Pattern::new("Walmart", CategoryId(1), Utc::now());
        p.match_count = 5;
        p.accept_count = 5;
        p.amount_range = Some(AmountRange::new(Money::from_cents(4000), Money::from_cents(6000)));
        p.recurrence = Some(RecurrencePattern::Monthly);
        p
    }

    #[tokio::test]
    async fn create_db_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.db");
        create_db(&path).await.unwrap();
        create_db(&path).await.unwrap();
    }

    #[tokio::test]
    async fn insert_and_fetch_transaction() {
        let (_dir, store) = test_store().await;
        let id = insert_transaction(store.pool(), &new_tx("WALMART #1234", -4599, Some(1)))
            .await
            .unwrap();

        let tx = get_transaction(store.pool(), id).await.unwrap().unwrap();
        assert_eq!(tx.description, "WALMART #1234");
        assert_eq!(tx.amount.to_cents(), -4599);
        assert_eq!(tx.category_id, Some(CategoryId(1)));
        assert!(tx.suggestion.is_none());
        assert!(get_transaction(store.pool(), TransactionId(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pattern_round_trip() {
        let (_dir, store) = test_store().await;
        let original = walmart_pattern();
        let id = store.add_pattern(&original).await.unwrap();

        let patterns = store.get_patterns().await.unwrap();
        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.id, Some(id));
        assert_eq!(p.merchant_name, "Walmart");
        assert_eq!(p.match_count, 5);
        assert_eq!(p.amount_range, original.amount_range);
        assert_eq!(p.recurrence, Some(RecurrencePattern::Monthly));
        assert_eq!(p.last_seen.timestamp(), original.last_seen.timestamp());
    }

    #[tokio::test]
    async fn duplicate_pattern_key_is_rejected() {
        let (_dir, store) = test_store().await;
        store.add_pattern(&walmart_pattern()).await.unwrap();
        let err = store.add_pattern(&walmart_pattern()).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePattern { .. }));
    }

    #[tokio::test]
    async fn update_pattern_requires_existing_row() {
        let (_dir, store) = test_store().await;
        let mut p = walmart_pattern();
        assert!(matches!(store.update_pattern(&p).await, Err(StoreError::UnsavedPattern(_))));

        p.id = Some(PatternId(77));
        assert!(matches!(
            store.update_pattern(&p).await,
            Err(StoreError::PatternNotFound(PatternId(77)))
        ));

        p.id = Some(store.add_pattern(&walmart_pattern()).await.unwrap());
        p.deny_count = 3;
        p.amount_range = None;
        p.recurrence = None;
        store.update_pattern(&p).await.unwrap();
        let stored = &store.get_patterns().await.unwrap()[0];
        assert_eq!(stored.deny_count, 3);
        assert_eq!(stored.amount_range, None);
        assert!(!stored.is_recurring());
    }

    #[tokio::test]
    async fn suggestion_columns_move_together() {
        let (_dir, store) = test_store().await;
        let pattern_id = store.add_pattern(&walmart_pattern()).await.unwrap();
        let id = insert_transaction(store.pool(), &new_tx("WALMART #9981", -4500, None))
            .await
            .unwrap();

        let mut tx = get_transaction(store.pool(), id).await.unwrap().unwrap();
        tx.apply_suggestion(
            CategoryId(1),
            Suggestion {
                pattern_id,
                confidence: 80.0,
                reasoning: "Exact match, seen 5 times before".to_string(),
            },
        );
        store.update_transaction(&tx).await.unwrap();

        let pending = get_pending_transactions(store.pool()).await.unwrap();
        assert_eq!(pending.len(), 1);
        let s = pending[0].suggestion.as_ref().unwrap();
        assert_eq!(s.pattern_id, pattern_id);
        assert_eq!(s.confidence, 80.0);
        assert!(get_uncategorized_transactions(store.pool()).await.unwrap().is_empty());

        tx.clear_suggestion();
        tx.category_id = None;
        store.update_transaction(&tx).await.unwrap();
        assert!(get_pending_transactions(store.pool()).await.unwrap().is_empty());
        let reloaded = get_transaction(store.pool(), id).await.unwrap().unwrap();
        assert!(reloaded.suggestion.is_none());
        assert_eq!(reloaded.category_id, None);
    }

    #[tokio::test]
    async fn update_missing_transaction_fails() {
        let (_dir, store) = test_store().await;
        let tx = Transaction::new(
            TransactionId(5),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "NOWHERE",
            Money::from_cents(-100),
        );
        assert!(matches!(
            store.update_transaction(&tx).await,
            Err(StoreError::TransactionNotFound(TransactionId(5)))
        ));
    }

    #[tokio::test]
    async fn uncategorized_excludes_split_transactions() {
        let (_dir, store) = test_store().await;
        let mut split = new_tx("COSTCO", -9000, None);
        split.is_split = true;
        insert_transaction(store.pool(), &split).await.unwrap();
        insert_transaction(store.pool(), &new_tx("TARGET", -2000, None)).await.unwrap();
        insert_transaction(store.pool(), &new_tx("KROGER", -3000, Some(1))).await.unwrap();

        let uncategorized = get_uncategorized_transactions(store.pool()).await.unwrap();
        assert_eq!(uncategorized.len(), 1);
        assert_eq!(uncategorized[0].description, "TARGET");
        assert_eq!(get_all_transactions(store.pool()).await.unwrap().len(), 3);
    }
}
