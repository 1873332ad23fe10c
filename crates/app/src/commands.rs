use anyhow::{bail, Context};
use budgetwise_core::{CategoryId, Money, Transaction, TransactionId};
use budgetwise_engine::SuggestionEngine;
use budgetwise_storage::{
    get_all_transactions, get_pending_transactions, get_transaction,
    get_uncategorized_transactions, insert_transaction, NewTransaction, SqliteStore,
};
use chrono::NaiveDate;
use clap::Subcommand;

type Engine = SuggestionEngine<SqliteStore>;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record a transaction
    Add {
        /// Posting date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        #[arg(long)]
        description: String,
        /// Signed amount; negative for expenses
        #[arg(long, allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        split: bool,
    },
    /// Mine categorized history into merchant patterns
    Learn,
    /// Suggest categories for uncategorized transactions
    Suggest,
    /// List transactions awaiting review
    Review {
        #[arg(long)]
        json: bool,
    },
    /// Accept a pending suggestion
    Accept {
        #[arg(required_unless_present = "all")]
        id: Option<i64>,
        /// Accept every pending suggestion
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Reject a pending suggestion and uncategorize the transaction
    Deny { id: i64 },
    /// List learned patterns
    Patterns {
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

pub async fn run(command: Command, engine: &mut Engine) -> anyhow::Result<()> {
    match command {
        Command::Add { date, description, amount, category, split } => {
            add_transaction(engine, &date, &description, &amount, category, split).await
        }
        Command::Learn => learn(engine).await,
        Command::Suggest => suggest(engine).await,
        Command::Review { json } => review(engine, json).await,
        Command::Accept { all: true, .. } => accept_all(engine).await,
        Command::Accept { id: Some(id), .. } => accept(engine, TransactionId(id)).await,
        Command::Accept { id: None, all: false } => bail!("Pass a transaction id or --all"),
        Command::Deny { id } => deny(engine, TransactionId(id)).await,
        Command::Patterns { json } => list_patterns(engine, json),
        Command::Config => {
            println!("confidence_threshold = {}", engine.confidence_threshold());
            println!("patterns_loaded = {}", engine.patterns().len());
            Ok(())
        }
    }
}

async fn add_transaction(
    engine: &Engine,
    date: &str,
    description: &str,
    amount: &str,
    category: Option<i64>,
    split: bool,
) -> anyhow::Result<()> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;
    let amount: Money = amount
        .parse()
        .with_context(|| format!("Invalid amount '{amount}'"))?;

    let new_tx = NewTransaction {
        date,
        description: description.to_string(),
        amount,
        category_id: category.map(CategoryId),
        is_split: split,
    };
    let id = insert_transaction(engine.store().pool(), &new_tx).await?;
    println!("Added transaction {id}");
    Ok(())
}

async fn learn(engine: &mut Engine) -> anyhow::Result<()> {
    let history = get_all_transactions(engine.store().pool()).await?;
    let summary = engine.learn(&history).await?;
    println!(
        "Mined {} patterns ({} new, {} updated)",
        summary.mined, summary.created, summary.updated
    );
    Ok(())
}

async fn suggest(engine: &Engine) -> anyhow::Result<()> {
    let mut transactions = get_uncategorized_transactions(engine.store().pool()).await?;
    let summary = engine.auto_categorize(&mut transactions).await?;
    println!(
        "{} suggested, {} without a confident match",
        summary.suggested, summary.no_match
    );
    Ok(())
}

async fn review(engine: &Engine, json: bool) -> anyhow::Result<()> {
    let pending = get_pending_transactions(engine.store().pool()).await?;
    if pending.is_empty() && !json {
        println!("Nothing to review.");
        return Ok(());
    }

    for tx in &pending {
        if json {
            println!("{}", serde_json::to_string(tx)?);
        } else {
            print_pending(tx);
        }
    }
    Ok(())
}

fn print_pending(tx: &Transaction) {
    let Some(s) = &tx.suggestion else {
        return;
    };
    let category = tx.category_id.map(|c| c.to_string()).unwrap_or_default();
    println!(
        "{:>6}  {}  {:<32}  {:>10}  -> category {:<4} {:>5.1}%  {}",
        tx.id, tx.date, tx.description, tx.amount.to_string(), category, s.confidence, s.reasoning
    );
}

async fn fetch(engine: &Engine, id: TransactionId) -> anyhow::Result<Transaction> {
    match get_transaction(engine.store().pool(), id).await? {
        Some(tx) => Ok(tx),
        None => bail!("Transaction {id} not found"),
    }
}

async fn accept(engine: &mut Engine, id: TransactionId) -> anyhow::Result<()> {
    let mut tx = fetch(engine, id).await?;
    if !tx.is_pending_review() {
        println!("Transaction {id} has no pending suggestion");
        return Ok(());
    }
    engine.accept_suggestion(&mut tx).await?;
    println!("Accepted suggestion for transaction {id}");
    Ok(())
}

async fn accept_all(engine: &mut Engine) -> anyhow::Result<()> {
    let mut pending = get_pending_transactions(engine.store().pool()).await?;
    let count = engine.accept_all_pending(&mut pending).await?;
    println!("Accepted {count} suggestions");
    Ok(())
}

async fn deny(engine: &mut Engine, id: TransactionId) -> anyhow::Result<()> {
    let mut tx = fetch(engine, id).await?;
    if !tx.is_pending_review() {
        println!("Transaction {id} has no pending suggestion");
        return Ok(());
    }
    engine.deny_suggestion(&mut tx).await?;
    println!("Rejected suggestion for transaction {id}");
    Ok(())
}

fn list_patterns(engine: &Engine, json: bool) -> anyhow::Result<()> {
    for p in engine.patterns() {
        if json {
            println!("{}", serde_json::to_string(p)?);
            continue;
        }
        let range = p
            .amount_range
            .map(|r| format!("{}..{}", r.min(), r.max()))
            .unwrap_or_else(|| "-".to_string());
        let recurrence = p.recurrence.map(|r| r.to_string()).unwrap_or_default();
        println!(
            "{:>4}  {:<32}  category {:<4}  seen {:>3}  +{}/-{}  {:<16}  {}",
            p.id.map(|id| id.to_string()).unwrap_or_default(),
            p.merchant_name,
            p.category_id,
            p.match_count,
            p.accept_count,
            p.deny_count,
            range,
            recurrence
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    #[test]
    fn parses_negative_amounts() {
        let cli = TestCli::try_parse_from([
            "budgetwise", "add", "--date", "2024-01-15", "--description", "WALMART #1234",
            "--amount", "-45.00", "--category", "1",
        ])
        .unwrap();
        match cli.command {
            Command::Add { amount, category, split, .. } => {
                assert_eq!(amount, "-45.00");
                assert_eq!(category, Some(1));
                assert!(!split);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn accept_requires_id_or_all() {
        assert!(TestCli::try_parse_from(["budgetwise", "accept"]).is_err());
        assert!(TestCli::try_parse_from(["budgetwise", "accept", "3", "--all"]).is_err());
        assert!(TestCli::try_parse_from(["budgetwise", "accept", "--all"]).is_ok());
        assert!(TestCli::try_parse_from(["budgetwise", "accept", "3"]).is_ok());
    }
}
