pub mod db;

pub use db::{
    create_db, get_all_transactions, get_pending_transactions, get_transaction,
    get_uncategorized_transactions, insert_transaction, DbPool, NewTransaction, SqliteStore,
};
