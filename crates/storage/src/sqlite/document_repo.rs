use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::repository::{DocumentStore, LibraryDocument, StorageError};
use study_core::model::{Library, UserId};

use super::SqliteRepository;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait]
impl DocumentStore for SqliteRepository {
    async fn load_document(&self, user: &UserId) -> Result<Option<LibraryDocument>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT library, last_updated, email
            FROM user_documents
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.try_get("library").map_err(ser)?;
        let last_updated: DateTime<Utc> = row.try_get("last_updated").map_err(ser)?;
        let email: Option<String> = row.try_get("email").map_err(ser)?;
        let library = Library::from_json(&raw).map_err(ser)?;

        Ok(Some(LibraryDocument {
            library,
            last_updated,
            email,
        }))
    }

    async fn save_document(
        &self,
        user: &UserId,
        library: &Library,
        email: Option<&str>,
    ) -> Result<(), StorageError> {
        let blob = library.to_json().map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO user_documents (user_id, library, last_updated, email)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                library = excluded.library,
                last_updated = excluded.last_updated,
                email = excluded.email
            ",
        )
        .bind(user.as_str())
        .bind(blob)
        .bind(Utc::now())
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
