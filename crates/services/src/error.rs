//! Shared error types for the services crate.

use std::path::PathBuf;

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::grading::GradingError;
use study_core::model::{KeyImportError, LibraryImportError, WorkspaceError};
use study_core::timer::TimerError;

/// Errors emitted by `StudyController`.
///
/// Only validation failures surface here; sync failures are published as
/// `SyncEvent`s and missing tests or questions are no-ops.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StudyError {
    #[error(transparent)]
    KeyImport(#[from] KeyImportError),
    #[error(transparent)]
    LibraryImport(#[from] LibraryImportError),
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Errors emitted by `WorkspaceService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkspaceServiceError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Errors emitted while loading `StudyConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: `{value}`")]
    InvalidEnv { var: &'static str, value: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
