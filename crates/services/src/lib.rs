#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod controller;
pub mod error;
pub mod persistence;
pub mod workspace_service;

pub use study_core::Clock;

pub use app_services::AppServices;
pub use config::StudyConfig;
pub use controller::{ActiveTest, BulkSubmit, StudyController};
pub use error::{AppServicesError, ConfigError, StudyError, WorkspaceServiceError};
pub use persistence::{PersistenceGateway, SyncEvent, SyncTarget};
pub use workspace_service::WorkspaceService;
