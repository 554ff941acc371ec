use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WorkspaceError {
    #[error("task cannot be empty")]
    EmptyTask,

    #[error("a link needs both a name and a URL")]
    IncompleteLink,

    #[error("no item at position {0}")]
    OutOfRange(usize),
}

//
// ─── TODOS ─────────────────────────────────────────────────────────────────────
//

/// A study task. `google_task_id` links it to the external task mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub google_task_id: Option<String>,
    #[serde(default)]
    pub due: Option<NaiveDate>,
}

/// Flat task list, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoList(Vec<TodoItem>);

impl TodoList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a stored list; anything unreadable yields an empty list.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a task at the top of the list.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError::EmptyTask` for blank text.
    pub fn add(&mut self, text: &str, due: Option<NaiveDate>) -> Result<&TodoItem, WorkspaceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkspaceError::EmptyTask);
        }
        self.0.insert(
            0,
            TodoItem {
                text: text.to_owned(),
                completed: false,
                google_task_id: None,
                due,
            },
        );
        Ok(&self.0[0])
    }

    /// Flips completion and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError::OutOfRange` for an unknown position.
    pub fn toggle(&mut self, index: usize) -> Result<bool, WorkspaceError> {
        let item = self.0.get_mut(index).ok_or(WorkspaceError::OutOfRange(index))?;
        item.completed = !item.completed;
        Ok(item.completed)
    }

    /// Replaces text and due date of an existing task.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError::EmptyTask` for blank text and
    /// `WorkspaceError::OutOfRange` for an unknown position.
    pub fn edit(
        &mut self,
        index: usize,
        text: &str,
        due: Option<NaiveDate>,
    ) -> Result<(), WorkspaceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(WorkspaceError::EmptyTask);
        }
        let item = self.0.get_mut(index).ok_or(WorkspaceError::OutOfRange(index))?;
        text.clone_into(&mut item.text);
        item.due = due;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `WorkspaceError::OutOfRange` for an unknown position.
    pub fn remove(&mut self, index: usize) -> Result<TodoItem, WorkspaceError> {
        if index >= self.0.len() {
            return Err(WorkspaceError::OutOfRange(index));
        }
        Ok(self.0.remove(index))
    }

    /// Drops completed tasks; returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.0.len();
        self.0.retain(|item| !item.completed);
        before - self.0.len()
    }
}

//
// ─── QUICK LINKS ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickLink {
    pub name: String,
    pub url: String,
}

impl QuickLink {
    /// Builds a link, defaulting the scheme to `https://`.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError::IncompleteLink` if either part is blank.
    pub fn new(name: &str, url: &str) -> Result<Self, WorkspaceError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(WorkspaceError::IncompleteLink);
        }
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_owned()
        } else {
            format!("https://{url}")
        };
        Ok(Self {
            name: name.to_owned(),
            url,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuickLinks(Vec<QuickLink>);

impl QuickLinks {
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        raw.and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn items(&self) -> &[QuickLink] {
        &self.0
    }

    pub fn push(&mut self, link: QuickLink) {
        self.0.push(link);
    }

    /// # Errors
    ///
    /// Returns `WorkspaceError::OutOfRange` for an unknown position.
    pub fn remove(&mut self, index: usize) -> Result<QuickLink, WorkspaceError> {
        if index >= self.0.len() {
            return Err(WorkspaceError::OutOfRange(index));
        }
        Ok(self.0.remove(index))
    }
}

//
// ─── THEME ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Stored value is the bare word; unknown values fall back to light.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("dark") => Self::Dark,
            _ => Self::Light,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todos_are_added_newest_first_and_trimmed() {
        let mut todos = TodoList::new();
        todos.add("first", None).unwrap();
        todos.add("  second  ", NaiveDate::from_ymd_opt(2026, 1, 5)).unwrap();

        assert_eq!(todos.items()[0].text, "second");
        assert_eq!(todos.items()[0].due, NaiveDate::from_ymd_opt(2026, 1, 5));
        assert_eq!(todos.items()[1].text, "first");
        assert_eq!(todos.add("   ", None), Err(WorkspaceError::EmptyTask));
    }

    #[test]
    fn toggle_edit_and_clear_completed() {
        let mut todos = TodoList::new();
        todos.add("a", None).unwrap();
        todos.add("b", None).unwrap();

        assert!(todos.toggle(1).unwrap());
        assert_eq!(todos.toggle(9), Err(WorkspaceError::OutOfRange(9)));
        assert_eq!(todos.edit(0, " ", None), Err(WorkspaceError::EmptyTask));
        todos.edit(0, "b2", None).unwrap();

        assert_eq!(todos.clear_completed(), 1);
        assert_eq!(todos.len(), 1);
        assert_eq!(todos.items()[0].text, "b2");
    }

    #[test]
    fn stored_todos_tolerate_garbage() {
        assert!(TodoList::from_stored(Some("{oops")).is_empty());
        assert!(TodoList::from_stored(Some(r#"{"text": "not a list"}"#)).is_empty());
        assert!(TodoList::from_stored(None).is_empty());

        let stored = r#"[{"text": "read ch. 4", "completed": true, "googleTaskId": null, "due": "2026-03-01"}]"#;
        let todos = TodoList::from_stored(Some(stored));
        assert!(todos.items()[0].completed);
    }

    #[test]
    fn links_get_https_by_default() {
        let link = QuickLink::new("Docs", "example.com/notes").unwrap();
        assert_eq!(link.url, "https://example.com/notes");
        let link = QuickLink::new("Local", "http://localhost:8000").unwrap();
        assert_eq!(link.url, "http://localhost:8000");
        assert_eq!(QuickLink::new("", "x"), Err(WorkspaceError::IncompleteLink));
    }

    #[test]
    fn theme_round_trips_through_storage_words() {
        assert_eq!(Theme::from_stored(None), Theme::Light);
        assert_eq!(Theme::from_stored(Some("dark")), Theme::Dark);
        assert_eq!(Theme::Dark.toggled().as_str(), "light");
    }
}
