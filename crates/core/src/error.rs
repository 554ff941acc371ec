use thiserror::Error;

use crate::grading::GradingError;
use crate::model::{KeyImportError, LibraryImportError, WorkspaceError};
use crate::timer::TimerError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    KeyImport(#[from] KeyImportError),
    #[error(transparent)]
    LibraryImport(#[from] LibraryImportError),
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}
