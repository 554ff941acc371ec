use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use study_core::model::{Library, UserId};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Local key-value namespaces.
pub mod namespaces {
    pub const LIBRARY: &str = "portal_library";
    pub const TODOS: &str = "portal_todos";
    pub const QUICK_LINKS: &str = "portal_quickLinks";
    pub const THEME: &str = "portal_theme";
}

/// The per-user remote document.
///
/// `last_updated` is assigned by the store on every write; callers never set it.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryDocument {
    pub library: Library,
    pub last_updated: DateTime<Utc>,
    pub email: Option<String>,
}

/// Remote document store: one library document per user.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the user's document, if one was ever written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read or the stored
    /// library does not parse.
    async fn load_document(&self, user: &UserId) -> Result<Option<LibraryDocument>, StorageError>;

    /// Replace the user's document with `library`, stamping it with the
    /// store's own clock.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn save_document(
        &self,
        user: &UserId,
        library: &Library,
        email: Option<&str>,
    ) -> Result<(), StorageError>;
}

/// Namespaced local key-value storage holding raw strings.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be read.
    async fn get(&self, namespace: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite an entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn set(&self, namespace: &str, value: &str) -> Result<(), StorageError>;

    /// Remove an entry; removing a missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn remove(&self, namespace: &str) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    documents: Arc<Mutex<HashMap<UserId, LibraryDocument>>>,
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryRepository {
    async fn load_document(&self, user: &UserId) -> Result<Option<LibraryDocument>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user).cloned())
    }

    async fn save_document(
        &self,
        user: &UserId,
        library: &Library,
        email: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            user.clone(),
            LibraryDocument {
                library: library.clone(),
                last_updated: Utc::now(),
                email: email.map(str::to_owned),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl LocalStore for InMemoryRepository {
    async fn get(&self, namespace: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(namespace).cloned())
    }

    async fn set(&self, namespace: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(namespace.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(namespace);
        Ok(())
    }
}

/// Aggregates the document and local stores behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub documents: Arc<dyn DocumentStore>,
    pub local: Arc<dyn LocalStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let documents: Arc<dyn DocumentStore> = Arc::new(repo.clone());
        let local: Arc<dyn LocalStore> = Arc::new(repo);
        Self { documents, local }
    }
}
