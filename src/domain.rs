use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[sqlx(rename = "password")]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The part of a [`User`] that is safe to hand back to clients.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            other => Err(format!("unknown transaction type '{}'", other)),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A transaction that has passed validation but has not been stored yet.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub description: String,
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub date: NaiveDate,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transaction_count: i64,
}

impl Summary {
    /// Folds per-kind `(kind, total, count)` groups into a summary. Kinds with
    /// no group keep a total of zero.
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (TransactionKind, f64, i64)>,
    {
        let mut summary = Summary::default();
        for (kind, total, count) in groups {
            match kind {
                TransactionKind::Income => summary.total_income += total,
                TransactionKind::Expense => summary.total_expenses += total,
            }
            summary.transaction_count += count;
        }
        summary.balance = summary.total_income - summary.total_expenses;
        summary
    }
}
