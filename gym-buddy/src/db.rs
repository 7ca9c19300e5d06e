//! SQLite pool setup shared by the session store and the workflow runner.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::store::StateStore;
use crate::workflow::store::WorkflowStore;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    if is_in_memory(database_url) {
        return Ok(connect_in_memory().await?);
    }

    // Handles both "sqlite:./foo.db" and "sqlite://foo.db" forms.
    let file_path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    let abs_path = std::env::current_dir()?.join(file_path);
    if let Some(parent) = abs_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&abs_path)
                .create_if_missing(true),
        )
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every connection to `:memory:` is its
/// own database, so the pool must never open a second one.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

/// Create every table the server needs if it does not exist yet.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    StateStore::migrate(pool).await?;
    WorkflowStore::migrate(pool).await?;
    Ok(())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:")
}
