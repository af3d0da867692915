use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    db::{insert_transaction, query_totals_by_kind, query_transactions},
    domain::{NewTransaction, Summary, Transaction, TransactionKind},
    error::AppError,
};

/// Transaction fields as a client sends them. Everything is optional so a
/// missing field surfaces as a validation error rather than a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionInput {
    pub description: Option<String>,
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub date: Option<String>,
}

/// Largest accepted amount. Totals stay finite well past any realistic row count.
pub const MAX_AMOUNT: f64 = 1e15;

fn required(field: Option<String>) -> Result<String, AppError> {
    field
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::validation("All fields are required"))
}

impl TryFrom<TransactionInput> for NewTransaction {
    type Error = AppError;

    fn try_from(input: TransactionInput) -> Result<Self, Self::Error> {
        let description = required(input.description)?;
        let category = required(input.category)?;
        let date = required(input.date)?;
        let kind = required(input.kind)?;
        let amount = input
            .amount
            .ok_or_else(|| AppError::validation("All fields are required"))?;

        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::validation("Amount must be greater than 0"));
        }
        if amount > MAX_AMOUNT {
            return Err(AppError::validation("Amount is too large"));
        }

        let kind = kind
            .parse::<TransactionKind>()
            .map_err(|_| AppError::validation("Type must be income or expense"))?;

        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::validation("Date must be formatted as YYYY-MM-DD"))?;

        Ok(NewTransaction {
            description,
            amount,
            kind,
            category,
            date,
        })
    }
}

/// Per-user transaction storage and the aggregates derived from it.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        user_id: i64,
        input: TransactionInput,
    ) -> Result<Transaction, AppError> {
        let transaction = NewTransaction::try_from(input)?;

        tracing::info!(
            "Adding transaction for user_id={} amount={} type={} category={}",
            user_id,
            transaction.amount,
            transaction.kind,
            &transaction.category
        );

        let stored = insert_transaction(&self.pool, user_id, &transaction, Utc::now()).await?;

        tracing::info!("Transaction added successfully, id={}", stored.id);
        Ok(stored)
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Transaction>, AppError> {
        let transactions = query_transactions(&self.pool, user_id, None)
            .await
            .inspect_err(|err| {
                tracing::error!("Error querying transactions in list_by_user: {:#?}", err)
            })?;

        tracing::info!(
            "Retrieved {} transactions for user_id={}",
            transactions.len(),
            user_id
        );
        Ok(transactions)
    }

    pub async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<Transaction>, AppError> {
        Ok(query_transactions(&self.pool, user_id, Some(limit)).await?)
    }

    pub async fn summarize(&self, user_id: i64) -> Result<Summary, AppError> {
        let groups = query_totals_by_kind(&self.pool, user_id)
            .await
            .inspect_err(|err| {
                tracing::error!("Error querying totals in summarize: {:#?}", err)
            })?;

        let summary = Summary::from_groups(groups);
        if !(summary.total_income.is_finite()
            && summary.total_expenses.is_finite()
            && summary.balance.is_finite())
        {
            return Err(AppError::Internal(format!(
                "summary totals overflowed for user_id={}",
                user_id
            )));
        }

        tracing::info!("Summary for user_id={}: {:?}", user_id, &summary);
        Ok(summary)
    }
}
