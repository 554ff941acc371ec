use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::answer_key::{Section, SectionType};

//
// ─── USER ANSWER ───────────────────────────────────────────────────────────────
//

/// The learner's current answer for one question, draft or submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserAnswer {
    /// Typed text or a single selected option.
    Text(String),
    /// Selected options of a multi-select question, in click order.
    Selection(Vec<String>),
}

impl Default for UserAnswer {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl UserAnswer {
    /// Empty answer matching the section's input style.
    #[must_use]
    pub fn empty_for(kind: SectionType) -> Self {
        match kind {
            SectionType::Multi => Self::Selection(Vec::new()),
            SectionType::Single | SectionType::Numerical => Self::Text(String::new()),
        }
    }

    /// True for blank text or an empty selection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            UserAnswer::Text(text) => text.trim().is_empty(),
            UserAnswer::Selection(choices) => choices.is_empty(),
        }
    }

    #[must_use]
    pub fn selection(choices: &[&str]) -> Self {
        Self::Selection(choices.iter().map(|c| (*c).to_owned()).collect())
    }
}

impl From<&str> for UserAnswer {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

//
// ─── QUESTION PROGRESS ─────────────────────────────────────────────────────────
//

/// Attempt state of one question.
///
/// `partial` is only meaningful when `correct` is false. `attempts` counts
/// submissions, never draft edits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct QuestionProgress {
    pub user_ans: UserAnswer,
    pub submitted: bool,
    pub correct: bool,
    pub partial: bool,
    pub marked: bool,
    pub starred: bool,
    pub note: String,
    pub attempts: u32,
    pub just_attempted_wrong: bool,
    pub partial_try_again: bool,
}

impl QuestionProgress {
    /// Fresh record for a question of the given section type.
    #[must_use]
    pub fn new(kind: SectionType) -> Self {
        Self {
            user_ans: UserAnswer::empty_for(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_answer(&self) -> bool {
        !self.user_ans.is_empty()
    }
}

/// Question index to progress record for one section.
pub type SectionProgress = BTreeMap<usize, QuestionProgress>;

/// Section name to section progress for one test.
pub type Progress = BTreeMap<String, SectionProgress>;

//
// ─── LAZY INITIALIZATION ───────────────────────────────────────────────────────
//

/// Returns `progress` with a record for every question of `section`.
///
/// Borrows the input unchanged when nothing is missing, so repeated calls
/// are observably idempotent. Existing records are never overwritten.
#[must_use]
pub fn ensure_initialized<'a>(
    progress: &'a Progress,
    section_name: &str,
    section: &Section,
) -> Cow<'a, Progress> {
    if progress.contains_key(section_name)
        && missing_indices(progress.get(section_name), section).next().is_none()
    {
        return Cow::Borrowed(progress);
    }

    let mut owned = progress.clone();
    init_section_progress(&mut owned, section_name, section);
    Cow::Owned(owned)
}

/// In-place form of [`ensure_initialized`]; returns how many records were added.
pub fn init_section_progress(progress: &mut Progress, section_name: &str, section: &Section) -> usize {
    let entries = progress.entry(section_name.to_owned()).or_default();
    let mut added = 0;
    for index in 0..section.len() {
        entries.entry(index).or_insert_with(|| {
            added += 1;
            QuestionProgress::new(section.kind)
        });
    }
    added
}

fn missing_indices<'a>(
    existing: Option<&'a SectionProgress>,
    section: &Section,
) -> impl Iterator<Item = usize> + 'a {
    (0..section.len()).filter(move |index| existing.is_none_or(|entries| !entries.contains_key(index)))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
