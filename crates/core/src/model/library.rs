use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ids::TestId;
use crate::model::practice_test::Test;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LibraryImportError {
    #[error("backup is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("backup must be a JSON object of tests")]
    NotAnObject,

    #[error("test `{id}` in backup is malformed: {reason}")]
    MalformedTest { id: String, reason: String },
}

/// Every test the learner owns, keyed by id, in creation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Library(IndexMap<TestId, Test>);

impl Library {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &TestId) -> bool {
        self.0.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &TestId) -> Option<&Test> {
        self.0.get(id)
    }

    pub fn get_mut(&mut self, id: &TestId) -> Option<&mut Test> {
        self.0.get_mut(id)
    }

    /// Inserts or replaces a test under its own id.
    pub fn insert(&mut self, test: Test) -> Option<Test> {
        self.0.insert(test.id().clone(), test)
    }

    /// Removes a test together with all of its progress.
    pub fn remove(&mut self, id: &TestId) -> Option<Test> {
        self.0.shift_remove(id)
    }

    pub fn tests(&self) -> impl Iterator<Item = &Test> {
        self.0.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TestId> {
        self.0.keys()
    }

    /// Tests whose title or subject contains `term`, ignoring case.
    ///
    /// A blank term matches everything.
    pub fn search<'a>(&'a self, term: &str) -> impl Iterator<Item = &'a Test> + 'a {
        let needle = term.trim().to_lowercase();
        self.0.values().filter(move |test| {
            needle.is_empty()
                || test.title.to_lowercase().contains(&needle)
                || test.subject.to_lowercase().contains(&needle)
        })
    }

    /// Shallow merge: imported ids overwrite, the rest are added.
    ///
    /// Returns the number of tests taken from `other`.
    pub fn merge(&mut self, other: Library) -> usize {
        let count = other.len();
        for (id, test) in other.0 {
            self.0.insert(id, test);
        }
        count
    }

    /// Serializes the whole library as a backup blob.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for in-memory data.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes one test as a single-entry backup, `{ id: test }`.
    ///
    /// Returns `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for in-memory data.
    pub fn export_test(&self, id: &TestId) -> Result<Option<String>, serde_json::Error> {
        let Some(test) = self.0.get(id) else {
            return Ok(None);
        };
        let mut single = IndexMap::with_capacity(1);
        single.insert(id, test);
        serde_json::to_string(&single).map(Some)
    }

    /// Parses a backup produced by [`Library::to_json`] or [`Library::export_test`].
    ///
    /// # Errors
    ///
    /// Returns `LibraryImportError` for non-JSON, non-object or malformed tests.
    pub fn from_json(json: &str) -> Result<Self, LibraryImportError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| LibraryImportError::InvalidJson(err.to_string()))?;
        let Value::Object(entries) = value else {
            return Err(LibraryImportError::NotAnObject);
        };

        let mut tests = IndexMap::with_capacity(entries.len());
        for (id, raw) in entries {
            let test: Test =
                serde_json::from_value(raw).map_err(|err| LibraryImportError::MalformedTest {
                    id: id.clone(),
                    reason: err.to_string(),
                })?;
            // the map key is authoritative
            let test = test.with_id(TestId::new(id));
            tests.insert(test.id().clone(), test);
        }
        Ok(Self(tests))
    }
}

impl FromIterator<Test> for Library {
    fn from_iter<I: IntoIterator<Item = Test>>(iter: I) -> Self {
        Self(iter.into_iter().map(|test| (test.id().clone(), test)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::answer_key::AnswerKey;

    fn test_named(id: &str, title: &str, subject: &str) -> Test {
        let key = AnswerKey::parse(r#"{"A": {"type": "single", "answers": ["B"]}}"#).unwrap();
        Test::new(TestId::new(id), title, subject, key, 0)
    }

    #[test]
    fn merge_overwrites_same_ids_and_adds_others() {
        let mut library: Library =
            [test_named("t1", "Old", ""), test_named("t2", "Keep", "")].into_iter().collect();
        let imported: Library =
            [test_named("t1", "New", ""), test_named("t3", "Added", "")].into_iter().collect();

        let merged = library.merge(imported);

        assert_eq!(merged, 2);
        assert_eq!(library.len(), 3);
        assert_eq!(library.get(&TestId::new("t1")).unwrap().title, "New");
        assert_eq!(library.get(&TestId::new("t2")).unwrap().title, "Keep");
    }

    #[test]
    fn search_matches_title_or_subject_case_insensitively() {
        let library: Library = [
            test_named("t1", "JEE Mock", "Physics"),
            test_named("t2", "Weekly", "organic CHEMISTRY"),
        ]
        .into_iter()
        .collect();

        let hits: Vec<_> = library.search("chem").map(|t| t.id().as_str()).collect();
        assert_eq!(hits, vec!["t2"]);
        assert_eq!(library.search("  ").count(), 2);
        assert_eq!(library.search("mock").count(), 1);
    }

    #[test]
    fn export_then_import_reproduces_library() {
        let mut library: Library = [test_named("t1", "A", "x"), test_named("t2", "B", "y")]
            .into_iter()
            .collect();
        library
            .get_mut(&TestId::new("t1"))
            .unwrap()
            .question_mut("A", 0)
            .unwrap()
            .starred = true;

        let mut restored = Library::new();
        restored.merge(Library::from_json(&library.to_json().unwrap()).unwrap());

        assert_eq!(restored, library);
    }

    #[test]
    fn single_test_export_is_importable() {
        let library: Library = [test_named("t1", "A", ""), test_named("t2", "B", "")]
            .into_iter()
            .collect();
        let json = library.export_test(&TestId::new("t2")).unwrap().unwrap();
        let imported = Library::from_json(&json).unwrap();
        assert_eq!(imported.len(), 1);
        assert!(imported.contains(&TestId::new("t2")));
        assert!(library.export_test(&TestId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn import_rejects_bad_input_without_partial_result() {
        assert!(matches!(
            Library::from_json("42"),
            Err(LibraryImportError::NotAnObject)
        ));
        assert!(matches!(
            Library::from_json(r#"{"t1": {"title": "no key"}}"#),
            Err(LibraryImportError::MalformedTest { .. })
        ));
    }

    #[test]
    fn every_test_stays_keyed_by_its_own_id() {
        let json = serde_json::to_string(&serde_json::json!({
            "t9": test_named("stale", "Renamed", ""),
        }))
        .unwrap();
        let imported = Library::from_json(&json).unwrap();
        let test = imported.get(&TestId::new("t9")).unwrap();
        assert_eq!(test.id(), &TestId::new("t9"));

        let mut library: Library = [test_named("t1", "A", "")].into_iter().collect();
        library.get_mut(&TestId::new("t1")).unwrap().title = "Edited".into();
        assert!(library.ids().zip(library.tests()).all(|(key, test)| key == test.id()));
    }
}
