//! Durable per-session key-value storage.
//!
//! Every session actor owns a [`SessionStorage`] handle scoped to its session
//! id. Values are stored as JSON text in the `session_state` table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS session_state (
//!     session_id  TEXT NOT NULL,
//!     key         TEXT NOT NULL,
//!     value       TEXT NOT NULL,   -- JSON
//!     updated_at  TEXT NOT NULL,
//!     PRIMARY KEY (session_id, key)
//! );
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pool-wide handle to the session key-value table.
#[derive(Debug, Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session_state (
                session_id  TEXT NOT NULL,
                key         TEXT NOT NULL,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (session_id, key)
            )",
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Storage handle that only sees keys of `session_id`.
    pub fn scoped(&self, session_id: impl Into<String>) -> SessionStorage {
        SessionStorage {
            store: self.clone(),
            session_id: session_id.into(),
        }
    }

    async fn get_raw(&self, session_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM session_state WHERE session_id = ? AND key = ?")
                .bind(session_id)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put_raw(&self, session_id: &str, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO session_state (session_id, key, value, updated_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(session_id)
            .bind(*key)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Key-value storage scoped to one session.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    store: StateStore,
    session_id: String,
}

impl SessionStorage {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.get_raw(&self.session_id, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.store.put_raw(&self.session_id, &[(key, raw)]).await
    }

    /// Write several keys in one transaction.
    pub async fn put_all(&self, entries: &[(&str, serde_json::Value)]) -> Result<(), StoreError> {
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((*key, serde_json::to_string(value)?)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        self.store.put_raw(&self.session_id, &encoded).await
    }
}
