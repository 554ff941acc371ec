//! Completion metrics, score reports and question filters.
//!
//! Everything here reads progress without initializing it: a question with
//! no record counts as unanswered and unsubmitted.

use crate::model::{QuestionProgress, Section, SectionProgress, Test};

/// `round(count / total * 100)`, or 0 for an empty denominator.
#[must_use]
pub fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = ((count as f64 / total as f64) * 100.0).round() as u32;
    pct
}

//
// ─── COUNTS ────────────────────────────────────────────────────────────────────
//

fn records<'a>(
    section: &Section,
    progress: Option<&'a SectionProgress>,
) -> impl Iterator<Item = Option<&'a QuestionProgress>> {
    (0..section.len()).map(move |index| progress.and_then(|entries| entries.get(&index)))
}

/// Questions with a non-empty answer, drafted or submitted.
#[must_use]
pub fn attempted_count(section: &Section, progress: Option<&SectionProgress>) -> usize {
    records(section, progress)
        .filter(|q| q.is_some_and(QuestionProgress::has_answer))
        .count()
}

/// Questions with a final submission.
#[must_use]
pub fn completed_count(section: &Section, progress: Option<&SectionProgress>) -> usize {
    records(section, progress)
        .filter(|q| q.is_some_and(|q| q.submitted))
        .count()
}

/// Attempted and completed totals summed over a test's sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completion {
    pub total: usize,
    pub attempted: usize,
    pub completed: usize,
}

impl Completion {
    #[must_use]
    pub fn of_section(section: &Section, progress: Option<&SectionProgress>) -> Self {
        Self {
            total: section.len(),
            attempted: attempted_count(section, progress),
            completed: completed_count(section, progress),
        }
    }

    #[must_use]
    pub fn of_test(test: &Test) -> Self {
        test.key
            .sections()
            .map(|(name, section)| Self::of_section(section, test.progress.get(name)))
            .fold(Self::default(), |acc, s| Self {
                total: acc.total + s.total,
                attempted: acc.attempted + s.attempted,
                completed: acc.completed + s.completed,
            })
    }

    #[must_use]
    pub fn attempted_pct(&self) -> u32 {
        percent(self.attempted, self.total)
    }

    #[must_use]
    pub fn completed_pct(&self) -> u32 {
        percent(self.completed, self.total)
    }
}

//
// ─── REPORT ────────────────────────────────────────────────────────────────────
//

/// Tally of submitted questions for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReport {
    pub name: String,
    pub total: usize,
    /// Submitted questions; equals `correct + partial + incorrect`.
    pub attempted: usize,
    pub correct: usize,
    pub partial: usize,
    pub incorrect: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub sections: Vec<SectionReport>,
    pub total: usize,
    pub attempted: usize,
    pub correct: usize,
    pub partial: usize,
    pub incorrect: usize,
    /// `round(correct / total * 100)`.
    pub score_pct: u32,
    /// Questions the learner aimed to attempt this session; 0 means unset.
    pub session_goal: u32,
}

impl TestReport {
    #[must_use]
    pub fn build(test: &Test) -> Self {
        let sections: Vec<SectionReport> = test
            .key
            .sections()
            .map(|(name, section)| section_report(name, section, test.progress.get(name)))
            .collect();

        let total = sections.iter().map(|s| s.total).sum();
        let attempted = sections.iter().map(|s| s.attempted).sum();
        let correct = sections.iter().map(|s| s.correct).sum();
        let partial = sections.iter().map(|s| s.partial).sum();
        let incorrect = sections.iter().map(|s| s.incorrect).sum();

        Self {
            sections,
            total,
            attempted,
            correct,
            partial,
            incorrect,
            score_pct: percent(correct, total),
            session_goal: test.session_goal,
        }
    }

    /// Whether the session goal is set and met by submitted questions.
    #[must_use]
    pub fn goal_reached(&self) -> bool {
        self.session_goal > 0 && self.attempted >= self.session_goal as usize
    }
}

fn section_report(name: &str, section: &Section, progress: Option<&SectionProgress>) -> SectionReport {
    let mut report = SectionReport {
        name: name.to_owned(),
        total: section.len(),
        attempted: 0,
        correct: 0,
        partial: 0,
        incorrect: 0,
    };
    for q in records(section, progress).flatten().filter(|q| q.submitted) {
        report.attempted += 1;
        if q.correct {
            report.correct += 1;
        } else if q.partial {
            report.partial += 1;
        } else {
            report.incorrect += 1;
        }
    }
    report
}

//
// ─── FILTERS ───────────────────────────────────────────────────────────────────
//

/// Workspace question filters. Enabled filters are OR-combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct QuestionFilter {
    pub wrong: bool,
    pub unattempted: bool,
    pub marked: bool,
    pub starred: bool,
}

/// One toggleable filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Wrong,
    Unattempted,
    Marked,
    Starred,
}

impl QuestionFilter {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.wrong || self.unattempted || self.marked || self.starred
    }

    pub fn toggle(&mut self, kind: FilterKind) {
        let flag = match kind {
            FilterKind::Wrong => &mut self.wrong,
            FilterKind::Unattempted => &mut self.unattempted,
            FilterKind::Marked => &mut self.marked,
            FilterKind::Starred => &mut self.starred,
        };
        *flag = !*flag;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether a question with this record is shown. `None` is a question
    /// never touched, which only the `unattempted` filter selects.
    #[must_use]
    pub fn matches(&self, progress: Option<&QuestionProgress>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(q) = progress else {
            return self.unattempted;
        };
        (self.wrong && q.submitted && !q.correct)
            || (self.unattempted && !q.submitted)
            || (self.marked && q.marked)
            || (self.starred && q.starred)
    }

    /// Indices of the section's questions that pass the filter, in order.
    #[must_use]
    pub fn visible(&self, section: &Section, progress: Option<&SectionProgress>) -> Vec<usize> {
        records(section, progress)
            .enumerate()
            .filter(|(_, q)| self.matches(*q))
            .map(|(index, _)| index)
            .collect()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
