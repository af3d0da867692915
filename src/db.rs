use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::domain::{NewTransaction, Transaction, TransactionKind, User};

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new().connect_with(options).await
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL CHECK (amount > 0),
                type TEXT NOT NULL CHECK (type IN ('income', 'expense')),
                category TEXT NOT NULL,
                date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id)
            )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "
            CREATE INDEX IF NOT EXISTS idx_transactions_user_created
            ON transactions (user_id, created_at)
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_user(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password_hash: &str,
    created_at: DateTime<Utc>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "
            INSERT INTO users (
                username,
                email,
                password,
                created_at
            ) VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, password, created_at
        ",
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(created_at)
    .fetch_one(pool)
    .await
}

pub async fn query_user_by_email(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "
            SELECT id, username, email, password, created_at FROM users
            WHERE email = $1
        ",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn insert_transaction(
    pool: &SqlitePool,
    user_id: i64,
    transaction: &NewTransaction,
    created_at: DateTime<Utc>,
) -> Result<Transaction, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "
            INSERT INTO transactions (
                user_id,
                description,
                amount,
                type,
                category,
                date,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, description, amount, type, category, date, created_at
        ",
    )
    .bind(user_id)
    .bind(&transaction.description)
    .bind(transaction.amount)
    .bind(transaction.kind)
    .bind(&transaction.category)
    .bind(transaction.date)
    .bind(created_at)
    .fetch_one(pool)
    .await
    .inspect_err(|err| {
        tracing::error!(
            "Failed to insert transaction for user_id={}: {}",
            user_id,
            err
        );
    })
}

/// Most recently created first. `limit` of `None` returns every row.
pub async fn query_transactions(
    pool: &SqlitePool,
    user_id: i64,
    limit: Option<i64>,
) -> Result<Vec<Transaction>, sqlx::Error> {
    sqlx::query_as::<_, Transaction>(
        "
            SELECT id, user_id, description, amount, type, category, date, created_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
        ",
    )
    .bind(user_id)
    .bind(limit.unwrap_or(-1))
    .fetch_all(pool)
    .await
}

pub async fn query_totals_by_kind(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<(TransactionKind, f64, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (TransactionKind, f64, i64)>(
        "
            SELECT type, COALESCE(SUM(amount), 0.0) AS total, COUNT(*) AS count
            FROM transactions
            WHERE user_id = $1
            GROUP BY type
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    // Every connection to `:memory:` opens a fresh database, so keep exactly one.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
