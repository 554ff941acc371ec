#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    DocumentStore, InMemoryRepository, LibraryDocument, LocalStore, Storage, StorageError,
    namespaces,
};
