use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::repository::{LocalStore, StorageError};

use super::SqliteRepository;

#[async_trait]
impl LocalStore for SqliteRepository {
    async fn get(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM local_entries WHERE namespace = ?1")
            .bind(namespace)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        row.map(|row| {
            row.try_get::<String, _>("value")
                .map_err(|err| StorageError::Serialization(err.to_string()))
        })
        .transpose()
    }

    async fn set(&self, namespace: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO local_entries (namespace, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(namespace) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(namespace)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM local_entries WHERE namespace = ?1")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(())
    }
}
