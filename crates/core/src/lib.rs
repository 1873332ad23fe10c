pub mod money;
pub mod pattern;
pub mod store;
pub mod transaction;

pub use money::Money;
pub use pattern::{AmountRange, Pattern, PatternId, RecurrencePattern};
pub use store::{CategorizationStore, MemoryStore, StoreError};
pub use transaction::{CategoryId, Suggestion, Transaction, TransactionId};
