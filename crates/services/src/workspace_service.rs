use std::sync::Arc;

use chrono::NaiveDate;
use storage::repository::{LocalStore, namespaces};
use study_core::model::{QuickLink, QuickLinks, Theme, TodoItem, TodoList};

use crate::error::WorkspaceServiceError;

/// Todos, quick links and theme. These live only in local storage and are
/// written through on every change.
#[derive(Clone)]
pub struct WorkspaceService {
    local: Arc<dyn LocalStore>,
}

impl WorkspaceService {
    #[must_use]
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self { local }
    }

    /// Stored todos; unreadable data loads as an empty list.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Storage` if the store cannot be read.
    pub async fn todos(&self) -> Result<TodoList, WorkspaceServiceError> {
        let raw = self.local.get(namespaces::TODOS).await?;
        Ok(TodoList::from_stored(raw.as_deref()))
    }

    async fn save_todos(&self, todos: &TodoList) -> Result<(), WorkspaceServiceError> {
        let blob = serde_json::to_string(todos)?;
        self.local.set(namespaces::TODOS, &blob).await?;
        Ok(())
    }

    async fn update_todos<T>(
        &self,
        apply: impl FnOnce(&mut TodoList) -> Result<T, study_core::model::WorkspaceError>,
    ) -> Result<T, WorkspaceServiceError> {
        let mut todos = self.todos().await?;
        let out = apply(&mut todos)?;
        self.save_todos(&todos).await?;
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Workspace` for blank text, or a storage error.
    pub async fn add_todo(
        &self,
        text: &str,
        due: Option<NaiveDate>,
    ) -> Result<TodoItem, WorkspaceServiceError> {
        self.update_todos(|todos| todos.add(text, due).cloned()).await
    }

    /// Flips a task's completion and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Workspace` for an unknown position, or a storage error.
    pub async fn toggle_todo(&self, index: usize) -> Result<bool, WorkspaceServiceError> {
        self.update_todos(|todos| todos.toggle(index)).await
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Workspace` for blank text or an unknown
    /// position, or a storage error.
    pub async fn edit_todo(
        &self,
        index: usize,
        text: &str,
        due: Option<NaiveDate>,
    ) -> Result<(), WorkspaceServiceError> {
        self.update_todos(|todos| todos.edit(index, text, due)).await
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Workspace` for an unknown position, or a storage error.
    pub async fn remove_todo(&self, index: usize) -> Result<TodoItem, WorkspaceServiceError> {
        self.update_todos(|todos| todos.remove(index)).await
    }

    /// Drops completed tasks and returns how many went.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn clear_completed(&self) -> Result<usize, WorkspaceServiceError> {
        self.update_todos(|todos| Ok(todos.clear_completed())).await
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Storage` if the store cannot be read.
    pub async fn links(&self) -> Result<QuickLinks, WorkspaceServiceError> {
        let raw = self.local.get(namespaces::QUICK_LINKS).await?;
        Ok(QuickLinks::from_stored(raw.as_deref()))
    }

    async fn save_links(&self, links: &QuickLinks) -> Result<(), WorkspaceServiceError> {
        let blob = serde_json::to_string(links)?;
        self.local.set(namespaces::QUICK_LINKS, &blob).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Workspace` when name or URL is blank,
    /// or a storage error.
    pub async fn add_link(&self, name: &str, url: &str) -> Result<QuickLink, WorkspaceServiceError> {
        let link = QuickLink::new(name, url)?;
        let mut links = self.links().await?;
        links.push(link.clone());
        self.save_links(&links).await?;
        Ok(link)
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Workspace` for an unknown position, or a storage error.
    pub async fn remove_link(&self, index: usize) -> Result<QuickLink, WorkspaceServiceError> {
        let mut links = self.links().await?;
        let removed = links.remove(index)?;
        self.save_links(&links).await?;
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns `WorkspaceServiceError::Storage` if the store cannot be read.
    pub async fn theme(&self) -> Result<Theme, WorkspaceServiceError> {
        let raw = self.local.get(namespaces::THEME).await?;
        Ok(Theme::from_stored(raw.as_deref()))
    }

    /// Flips light/dark and returns the new theme.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn toggle_theme(&self) -> Result<Theme, WorkspaceServiceError> {
        let theme = self.theme().await?.toggled();
        self.local.set(namespaces::THEME, theme.as_str()).await?;
        Ok(theme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use study_core::model::WorkspaceError;

    fn service() -> (WorkspaceService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        (WorkspaceService::new(Arc::new(repo.clone())), repo)
    }

    #[tokio::test]
    async fn todos_persist_under_their_namespace() {
        let (svc, repo) = service();
        svc.add_todo("revise optics", None).await.unwrap();
        svc.add_todo("mock test", None).await.unwrap();
        assert!(svc.toggle_todo(1).await.unwrap());

        let raw = repo.get(namespaces::TODOS).await.unwrap().unwrap();
        assert!(raw.contains("googleTaskId"));

        assert_eq!(svc.clear_completed().await.unwrap(), 1);
        let todos = svc.todos().await.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos.items()[0].text, "mock test");
    }

    #[tokio::test]
    async fn invalid_todo_leaves_storage_untouched() {
        let (svc, repo) = service();
        let err = svc.add_todo("  ", None).await.unwrap_err();
        assert!(matches!(err, WorkspaceServiceError::Workspace(WorkspaceError::EmptyTask)));
        assert!(repo.get(namespaces::TODOS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_todos_read_as_empty() {
        let (svc, repo) = service();
        repo.set(namespaces::TODOS, "not json").await.unwrap();
        assert!(svc.todos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn links_and_theme() {
        let (svc, _repo) = service();
        let link = svc.add_link("Notes", "notes.example.com").await.unwrap();
        assert_eq!(link.url, "https://notes.example.com");
        assert_eq!(svc.links().await.unwrap().items().len(), 1);
        svc.remove_link(0).await.unwrap();
        assert!(svc.links().await.unwrap().items().is_empty());

        assert_eq!(svc.theme().await.unwrap(), Theme::Light);
        assert_eq!(svc.toggle_theme().await.unwrap(), Theme::Dark);
        assert_eq!(svc.theme().await.unwrap(), Theme::Dark);
    }
}
