use thiserror::Error;

use crate::model::{ExpectedAnswer, QuestionProgress, UserAnswer};

/// Two numeric answers closer than this are the same answer.
pub const NUMERIC_TOLERANCE: f64 = 1e-4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GradingError {
    #[error("select or enter an answer first")]
    EmptyAnswer,

    #[error("question is already submitted")]
    AlreadySubmitted,
}

//
// ─── COMPARATOR ────────────────────────────────────────────────────────────────
//

/// Result of comparing a submission to its key.
///
/// `partial` is only ever set when `correct` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Verdict {
    pub correct: bool,
    pub partial: bool,
}

impl Verdict {
    pub const CORRECT: Self = Self {
        correct: true,
        partial: false,
    };
    pub const PARTIAL: Self = Self {
        correct: false,
        partial: true,
    };
    pub const INCORRECT: Self = Self {
        correct: false,
        partial: false,
    };
}

/// Canonical form of a learner answer.
///
/// Selections are sorted and concatenated; everything is trimmed and
/// uppercased.
#[must_use]
pub fn normalize_answer(answer: &UserAnswer) -> String {
    match answer {
        UserAnswer::Text(text) => text.trim().to_uppercase(),
        UserAnswer::Selection(choices) => {
            let mut sorted: Vec<&str> = choices.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            sorted.concat().to_uppercase()
        }
    }
}

#[must_use]
pub fn normalize_key(key: &ExpectedAnswer) -> String {
    key.to_string().trim().to_uppercase()
}

/// Grades `answer` against `key`.
///
/// Exact match after normalization is correct; two numbers within
/// [`NUMERIC_TOLERANCE`] are correct; two letter sets sharing at least one
/// letter are partial. Numerical answers never earn partial credit.
///
/// # Examples
///
/// ```
/// # use study_core::grading::{compare, Verdict};
/// # use study_core::model::{ExpectedAnswer, UserAnswer};
/// let key = ExpectedAnswer::from("ABD");
/// assert_eq!(compare(&UserAnswer::selection(&["D", "A", "B"]), &key), Verdict::CORRECT);
/// assert_eq!(compare(&UserAnswer::selection(&["A", "C"]), &key), Verdict::PARTIAL);
/// assert_eq!(compare(&UserAnswer::from("4.0"), &ExpectedAnswer::from("4")), Verdict::CORRECT);
/// ```
#[must_use]
pub fn compare(answer: &UserAnswer, key: &ExpectedAnswer) -> Verdict {
    let user = normalize_answer(answer);
    let key = normalize_key(key);

    if user == key {
        return Verdict::CORRECT;
    }

    if let (Some(a), Some(b)) = (parse_number(&user), parse_number(&key)) {
        if (a - b).abs() < NUMERIC_TOLERANCE {
            return Verdict::CORRECT;
        }
    }

    if is_letter_set(&user) && is_letter_set(&key) && user.chars().any(|c| key.contains(c)) {
        return Verdict::PARTIAL;
    }

    Verdict::INCORRECT
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn is_letter_set(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_uppercase())
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

/// Where a question sits in the two-attempt submission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionState {
    Unattempted,
    /// One wrong try used; the next submission is final.
    FirstWrongAttempt,
    Submitted,
}

impl QuestionState {
    #[must_use]
    pub fn of(progress: &QuestionProgress) -> Self {
        if progress.submitted {
            Self::Submitted
        } else if progress.attempts > 0 {
            Self::FirstWrongAttempt
        } else {
            Self::Unattempted
        }
    }
}

/// What a submission did to the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First attempt was wrong; the learner gets one retry.
    TryAgain { partial: bool },
    /// The question is now final.
    Graded(Verdict),
}

/// Submits the current draft of `progress` against `key`.
///
/// A wrong first attempt only arms the retry; a correct answer or any retry
/// finalizes the question.
///
/// # Errors
///
/// Returns `GradingError::EmptyAnswer` for a blank draft and
/// `GradingError::AlreadySubmitted` for a final question. Neither touches
/// `progress`.
pub fn submit(
    progress: &mut QuestionProgress,
    key: &ExpectedAnswer,
) -> Result<SubmitOutcome, GradingError> {
    if progress.submitted {
        return Err(GradingError::AlreadySubmitted);
    }
    if !progress.has_answer() {
        return Err(GradingError::EmptyAnswer);
    }

    let verdict = compare(&progress.user_ans, key);

    if !verdict.correct && progress.attempts == 0 {
        progress.attempts = 1;
        progress.just_attempted_wrong = true;
        progress.partial_try_again = verdict.partial;
        return Ok(SubmitOutcome::TryAgain {
            partial: verdict.partial,
        });
    }

    progress.submitted = true;
    progress.correct = verdict.correct;
    progress.partial = verdict.partial;
    progress.just_attempted_wrong = false;
    progress.partial_try_again = false;
    progress.attempts += 1;
    Ok(SubmitOutcome::Graded(verdict))
}

//
// ─── DRAFT EDITS ───────────────────────────────────────────────────────────────
//
// Each edit is a no-op on a submitted question and returns whether anything
// changed. Edits clear the retry banner but keep `attempts`.

/// Selects `option`, or clears it when it is already selected.
pub fn select_single(progress: &mut QuestionProgress, option: &str) -> bool {
    if progress.submitted {
        return false;
    }
    let already = matches!(&progress.user_ans, UserAnswer::Text(current) if current == option);
    progress.user_ans = if already {
        UserAnswer::Text(String::new())
    } else {
        UserAnswer::Text(option.to_owned())
    };
    progress.just_attempted_wrong = false;
    true
}

/// Adds or removes `option` from a multi-select answer.
pub fn toggle_choice(progress: &mut QuestionProgress, option: &str) -> bool {
    if progress.submitted {
        return false;
    }
    let mut choices = match std::mem::take(&mut progress.user_ans) {
        UserAnswer::Selection(choices) => choices,
        UserAnswer::Text(_) => Vec::new(),
    };
    if let Some(pos) = choices.iter().position(|c| c == option) {
        choices.remove(pos);
    } else {
        choices.push(option.to_owned());
    }
    progress.user_ans = UserAnswer::Selection(choices);
    progress.just_attempted_wrong = false;
    true
}

/// Replaces a multi-select answer with `choices`, dropping repeats.
pub fn set_selection(progress: &mut QuestionProgress, choices: impl IntoIterator<Item = String>) -> bool {
    if progress.submitted {
        return false;
    }
    let mut selected: Vec<String> = Vec::new();
    for choice in choices {
        if !selected.contains(&choice) {
            selected.push(choice);
        }
    }
    progress.user_ans = UserAnswer::Selection(selected);
    progress.just_attempted_wrong = false;
    true
}

/// Replaces a typed answer.
pub fn set_text(progress: &mut QuestionProgress, text: &str) -> bool {
    if progress.submitted {
        return false;
    }
    progress.user_ans = UserAnswer::Text(text.to_owned());
    progress.just_attempted_wrong = false;
    true
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SectionType;
    use proptest::prelude::*;

    fn key(raw: &str) -> ExpectedAnswer {
        ExpectedAnswer::from(raw)
    }

    fn number_key(raw: &str) -> ExpectedAnswer {
        ExpectedAnswer::Number(raw.parse().unwrap())
    }

    #[test]
    fn exact_match_ignores_case_and_whitespace() {
        assert_eq!(compare(&UserAnswer::from(" b "), &key("B")), Verdict::CORRECT);
        assert_eq!(compare(&UserAnswer::from("C"), &key(" b")), Verdict::INCORRECT);
    }

    #[test]
    fn numbers_match_within_tolerance() {
        assert_eq!(compare(&UserAnswer::from("4.0"), &key("4")), Verdict::CORRECT);
        assert_eq!(compare(&UserAnswer::from("4"), &number_key("4")), Verdict::CORRECT);
        assert_eq!(compare(&UserAnswer::from("2.50004"), &number_key("2.5")), Verdict::CORRECT);
        assert_eq!(compare(&UserAnswer::from("2.51"), &number_key("2.5")), Verdict::INCORRECT);
        assert_eq!(compare(&UserAnswer::from("1e3"), &number_key("1000")), Verdict::CORRECT);
    }

    #[test]
    fn numbers_never_get_partial_credit() {
        assert_eq!(compare(&UserAnswer::from("12"), &key("123")), Verdict::INCORRECT);
        assert_eq!(compare(&UserAnswer::from("-2"), &key("2")), Verdict::INCORRECT);
    }

    #[test]
    fn overlapping_letter_sets_are_partial() {
        let answer = UserAnswer::selection(&["A", "C"]);
        assert_eq!(compare(&answer, &key("ABD")), Verdict::PARTIAL);
        let disjoint = UserAnswer::selection(&["C"]);
        assert_eq!(compare(&disjoint, &key("ABD")), Verdict::INCORRECT);
        let mixed = UserAnswer::from("A1");
        assert_eq!(compare(&mixed, &key("AB")), Verdict::INCORRECT);
    }

    #[test]
    fn selection_order_does_not_matter() {
        let answer = UserAnswer::selection(&["d", "b", "a"]);
        assert_eq!(normalize_answer(&answer), "ABD");
        assert_eq!(compare(&answer, &key("ABD")), Verdict::CORRECT);
    }

    #[test]
    fn correct_first_try_goes_straight_to_submitted() {
        let mut q = QuestionProgress::new(SectionType::Single);
        select_single(&mut q, "B");

        let outcome = submit(&mut q, &key("B")).unwrap();

        assert_eq!(outcome, SubmitOutcome::Graded(Verdict::CORRECT));
        assert!(q.submitted && q.correct && !q.partial);
        assert_eq!(q.attempts, 1);
        assert_eq!(QuestionState::of(&q), QuestionState::Submitted);
    }

    #[test]
    fn wrong_first_try_arms_retry_then_finalizes() {
        let mut q = QuestionProgress::new(SectionType::Multi);
        toggle_choice(&mut q, "A");
        toggle_choice(&mut q, "C");

        let first = submit(&mut q, &key("ABD")).unwrap();
        assert_eq!(first, SubmitOutcome::TryAgain { partial: true });
        assert!(q.just_attempted_wrong && q.partial_try_again);
        assert!(!q.submitted);
        assert_eq!(QuestionState::of(&q), QuestionState::FirstWrongAttempt);

        let second = submit(&mut q, &key("ABD")).unwrap();
        assert_eq!(second, SubmitOutcome::Graded(Verdict::PARTIAL));
        assert!(q.submitted && !q.correct && q.partial);
        assert!(!q.just_attempted_wrong && !q.partial_try_again);
        assert_eq!(q.attempts, 2);
    }

    #[test]
    fn retry_can_be_correct() {
        let mut q = QuestionProgress::new(SectionType::Numerical);
        set_text(&mut q, "3");
        submit(&mut q, &number_key("4")).unwrap();
        set_text(&mut q, "4.00");
        let outcome = submit(&mut q, &number_key("4")).unwrap();
        assert_eq!(outcome, SubmitOutcome::Graded(Verdict::CORRECT));
        assert_eq!(q.attempts, 2);
    }

    #[test]
    fn empty_answer_is_rejected_without_changes() {
        let mut q = QuestionProgress::new(SectionType::Numerical);
        set_text(&mut q, "   ");
        let before = q.clone();
        assert_eq!(submit(&mut q, &key("1")), Err(GradingError::EmptyAnswer));
        assert_eq!(q, before);

        let mut multi = QuestionProgress::new(SectionType::Multi);
        assert_eq!(submit(&mut multi, &key("A")), Err(GradingError::EmptyAnswer));
    }

    #[test]
    fn submitted_questions_ignore_edits_and_resubmits() {
        let mut q = QuestionProgress::new(SectionType::Single);
        select_single(&mut q, "B");
        submit(&mut q, &key("B")).unwrap();
        let frozen = q.clone();

        assert!(!select_single(&mut q, "C"));
        assert!(!toggle_choice(&mut q, "C"));
        assert!(!set_text(&mut q, "C"));
        assert_eq!(submit(&mut q, &key("B")), Err(GradingError::AlreadySubmitted));
        assert_eq!(q, frozen);
    }

    #[test]
    fn edits_clear_banner_but_keep_attempts() {
        let mut q = QuestionProgress::new(SectionType::Single);
        select_single(&mut q, "A");
        submit(&mut q, &key("B")).unwrap();
        assert!(q.just_attempted_wrong);

        select_single(&mut q, "C");
        assert!(!q.just_attempted_wrong);
        assert_eq!(q.attempts, 1);

        // clicking the selected option again clears it
        select_single(&mut q, "C");
        assert!(!q.has_answer());
    }

    #[test]
    fn set_selection_replaces_the_draft_until_submitted() {
        let mut q = QuestionProgress::new(SectionType::Multi);
        toggle_choice(&mut q, "A");
        submit(&mut q, &key("BD")).unwrap();
        assert!(q.just_attempted_wrong);

        assert!(set_selection(&mut q, ["B", "D", "B"].map(String::from)));
        assert_eq!(q.user_ans, UserAnswer::selection(&["B", "D"]));
        assert!(!q.just_attempted_wrong);
        assert_eq!(q.attempts, 1);

        submit(&mut q, &key("BD")).unwrap();
        assert!(!set_selection(&mut q, ["A".to_owned()]));
        assert_eq!(q.user_ans, UserAnswer::selection(&["B", "D"]));
    }

    proptest! {
        #[test]
        fn overlapping_unequal_letter_sets_are_always_partial(
            user in "[A-F]{1,6}",
            key_letters in "[A-F]{1,6}",
        ) {
            let user_set: std::collections::BTreeSet<char> = user.chars().collect();
            let key_set: std::collections::BTreeSet<char> = key_letters.chars().collect();
            prop_assume!(user_set != key_set);
            prop_assume!(!user_set.is_disjoint(&key_set));

            let answer = UserAnswer::Selection(user_set.iter().map(char::to_string).collect());
            let key_text: String = key_set.iter().collect();
            prop_assert_eq!(compare(&answer, &ExpectedAnswer::Text(key_text)), Verdict::PARTIAL);
        }

        #[test]
        fn close_numbers_are_correct_regardless_of_format(
            base in -10_000i32..10_000,
            frac in 0u32..1000,
        ) {
            let value = f64::from(base) + f64::from(frac) / 1000.0;
            let plain = format!("{value}");
            let padded = format!("{value:.4}");
            prop_assert_eq!(
                compare(&UserAnswer::Text(padded), &ExpectedAnswer::Text(plain)),
                Verdict::CORRECT
            );
        }

        #[test]
        fn compare_is_deterministic(user in "[A-Z0-9.]{0,5}", key_text in "[A-Z0-9.]{0,5}") {
            let answer = UserAnswer::Text(user);
            let key = ExpectedAnswer::Text(key_text);
            prop_assert_eq!(compare(&answer, &key), compare(&answer, &key));
        }
    }
}
