use storage::repository::Storage;

use crate::Clock;
use crate::config::StudyConfig;
use crate::controller::StudyController;
use crate::error::AppServicesError;
use crate::persistence::PersistenceGateway;
use crate::workspace_service::WorkspaceService;

/// Assembles the controller's gateway and the workspace service over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    gateway: PersistenceGateway,
    workspace: WorkspaceService,
}

impl AppServices {
    /// Build services backed by `SQLite` storage at `config.db_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(config: &StudyConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        Ok(Self::from_storage(&storage, config, clock))
    }

    /// Build services over in-memory storage.
    #[must_use]
    pub fn in_memory(config: &StudyConfig, clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), config, clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, config: &StudyConfig, clock: Clock) -> Self {
        Self {
            clock,
            gateway: PersistenceGateway::new(storage, config.debounce()),
            workspace: WorkspaceService::new(storage.local.clone()),
        }
    }

    /// A controller holding the library stored on the current backend.
    pub async fn controller(&self) -> StudyController {
        let mut controller = StudyController::new(self.clock, self.gateway.clone());
        controller.load().await;
        controller
    }

    #[must_use]
    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    #[must_use]
    pub fn workspace(&self) -> &WorkspaceService {
        &self.workspace
    }
}
