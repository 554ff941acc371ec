use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Schema errors raised while importing an answer key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyImportError {
    #[error("answer key is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("answer key must be a JSON object of sections")]
    NotAnObject,

    #[error("answer key has no sections")]
    NoSections,

    #[error("section `{section}` has no `answers` array")]
    MissingAnswers { section: String },

    #[error("section `{section}` has no `type`")]
    MissingType { section: String },

    #[error("section `{section}` has unknown type `{value}`")]
    UnknownType { section: String, value: String },

    #[error("section `{section}` answer #{index} must be a string or a number")]
    UnsupportedAnswer { section: String, index: usize },
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

/// Answer type shared by every question in a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    /// One option letter.
    Single,
    /// Any subset of option letters.
    Multi,
    /// Free-form numeric entry.
    Numerical,
}

impl SectionType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "multi" => Some(Self::Multi),
            "numerical" => Some(Self::Numerical),
            _ => None,
        }
    }
}

/// A single expected answer exactly as it appeared in the uploaded key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedAnswer {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for ExpectedAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedAnswer::Text(text) => f.write_str(text),
            ExpectedAnswer::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for ExpectedAnswer {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// A named group of questions sharing one answer type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: SectionType,
    pub answers: Vec<ExpectedAnswer>,
}

impl Section {
    #[must_use]
    pub fn new(kind: SectionType, answers: Vec<ExpectedAnswer>) -> Self {
        Self { kind, answers }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Expected answer for a question index, if it is in range.
    #[must_use]
    pub fn answer(&self, index: usize) -> Option<&ExpectedAnswer> {
        self.answers.get(index)
    }
}

//
// ─── ANSWER KEY ────────────────────────────────────────────────────────────────
//

/// Uploaded answer key: section name to section, in upload order.
///
/// Immutable once created; answer order is the question identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey(IndexMap<String, Section>);

impl AnswerKey {
    /// Parses and validates an uploaded key.
    ///
    /// # Errors
    ///
    /// Returns `KeyImportError` if the text is not JSON or does not follow the
    /// `{ "<section>": { "type": ..., "answers": [...] } }` layout.
    pub fn parse(json: &str) -> Result<Self, KeyImportError> {
        let value: Value =
            serde_json::from_str(json).map_err(|err| KeyImportError::InvalidJson(err.to_string()))?;
        Self::from_value(&value)
    }

    /// Validates an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns `KeyImportError` describing the first schema violation.
    pub fn from_value(value: &Value) -> Result<Self, KeyImportError> {
        let Some(object) = value.as_object() else {
            return Err(KeyImportError::NotAnObject);
        };
        if object.is_empty() {
            return Err(KeyImportError::NoSections);
        }

        let mut sections = IndexMap::with_capacity(object.len());
        for (name, raw) in object {
            let Some(raw_answers) = raw.get("answers").and_then(Value::as_array) else {
                return Err(KeyImportError::MissingAnswers {
                    section: name.clone(),
                });
            };
            let kind = parse_section_type(name, raw.get("type"))?;

            let mut answers = Vec::with_capacity(raw_answers.len());
            for (index, answer) in raw_answers.iter().enumerate() {
                let expected = match answer {
                    Value::String(text) => ExpectedAnswer::Text(text.clone()),
                    Value::Number(number) => ExpectedAnswer::Number(number.clone()),
                    _ => {
                        return Err(KeyImportError::UnsupportedAnswer {
                            section: name.clone(),
                            index,
                        });
                    }
                };
                answers.push(expected);
            }
            sections.insert(name.clone(), Section::new(kind, answers));
        }

        Ok(Self(sections))
    }

    #[must_use]
    pub fn from_sections(sections: impl IntoIterator<Item = (String, Section)>) -> Self {
        Self(sections.into_iter().collect())
    }

    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.0.get(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.0.iter().map(|(name, section)| (name.as_str(), section))
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn first_section(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    /// Number of questions across every section.
    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.0.values().map(Section::len).sum()
    }

    /// Pretty JSON in the upload layout, for downloading the original key.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; not expected for a validated key.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn parse_section_type(section: &str, raw: Option<&Value>) -> Result<SectionType, KeyImportError> {
    let missing = || KeyImportError::MissingType {
        section: section.to_owned(),
    };
    match raw {
        None | Some(Value::Null | Value::Bool(false)) => Err(missing()),
        Some(Value::String(text)) if text.is_empty() => Err(missing()),
        Some(Value::String(text)) => {
            SectionType::parse(text).ok_or_else(|| KeyImportError::UnknownType {
                section: section.to_owned(),
                value: text.clone(),
            })
        }
        Some(other) => Err(KeyImportError::UnknownType {
            section: section.to_owned(),
            value: other.to_string(),
        }),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_in_upload_order() {
        let key = AnswerKey::parse(
            r#"{
                "Physics": {"type": "single", "answers": ["B", "C"]},
                "Chemistry": {"type": "multi", "answers": ["ABD"]},
                "Maths": {"type": "numerical", "answers": [4, "2.5"]}
            }"#,
        )
        .unwrap();

        let names: Vec<_> = key.section_names().collect();
        assert_eq!(names, vec!["Physics", "Chemistry", "Maths"]);
        assert_eq!(key.first_section(), Some("Physics"));
        assert_eq!(key.total_questions(), 5);

        let maths = key.section("Maths").unwrap();
        assert_eq!(maths.kind, SectionType::Numerical);
        assert_eq!(maths.answer(0).unwrap().to_string(), "4");
        assert_eq!(maths.answer(1).unwrap().to_string(), "2.5");
        assert!(maths.answer(2).is_none());
    }

    #[test]
    fn rejects_non_objects() {
        assert_eq!(AnswerKey::parse("null"), Err(KeyImportError::NotAnObject));
        assert_eq!(AnswerKey::parse("[1, 2]"), Err(KeyImportError::NotAnObject));
        assert!(matches!(
            AnswerKey::parse("{not json"),
            Err(KeyImportError::InvalidJson(_))
        ));
    }

    #[test]
    fn rejects_empty_key() {
        assert_eq!(AnswerKey::parse("{}"), Err(KeyImportError::NoSections));
    }

    #[test]
    fn rejects_section_without_answers_array() {
        let err = AnswerKey::parse(r#"{"A": {"type": "single", "answers": "B"}}"#).unwrap_err();
        assert_eq!(
            err,
            KeyImportError::MissingAnswers {
                section: "A".into()
            }
        );
    }

    #[test]
    fn rejects_falsy_or_unknown_type() {
        let err = AnswerKey::parse(r#"{"A": {"type": "", "answers": []}}"#).unwrap_err();
        assert!(matches!(err, KeyImportError::MissingType { .. }));

        let err = AnswerKey::parse(r#"{"A": {"answers": []}}"#).unwrap_err();
        assert!(matches!(err, KeyImportError::MissingType { .. }));

        let err = AnswerKey::parse(r#"{"A": {"type": "matrix", "answers": []}}"#).unwrap_err();
        assert!(matches!(err, KeyImportError::UnknownType { .. }));
    }

    #[test]
    fn rejects_non_scalar_answers() {
        let err =
            AnswerKey::parse(r#"{"A": {"type": "single", "answers": ["B", null]}}"#).unwrap_err();
        assert_eq!(
            err,
            KeyImportError::UnsupportedAnswer {
                section: "A".into(),
                index: 1
            }
        );
    }

    #[test]
    fn pretty_json_reparses_to_same_key() {
        let key = AnswerKey::parse(r#"{"S": {"type": "numerical", "answers": [1.5, "x"]}}"#)
            .unwrap();
        let again = AnswerKey::parse(&key.to_pretty_json().unwrap()).unwrap();
        assert_eq!(key, again);
    }
}
