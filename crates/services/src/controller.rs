//! The single owner of the study library.
//!
//! Every mutation of persisted fields ends in `PersistenceGateway::schedule`.
//! Operations on a test, section or question that does not exist are no-ops
//! reported through the return value, never errors.

use std::future::Future;
use std::time::Duration;

use study_core::aggregate::{Completion, FilterKind, QuestionFilter, TestReport};
use study_core::grading::{self, SubmitOutcome};
use study_core::model::{
    AnswerKey, Library, QuestionProgress, SectionType, Test, TestEdits, TestId, UserId,
};
use study_core::timer::{self, TickOutcome};

use crate::Clock;
use crate::error::StudyError;
use crate::persistence::{PersistenceGateway, SyncEvent, SyncTarget};

/// Result of grading every drafted question of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkSubmit {
    /// Questions that became final.
    pub graded: usize,
    /// Questions whose first attempt was wrong and now await a retry.
    pub try_again: usize,
}

impl BulkSubmit {
    #[must_use]
    pub fn total(&self) -> usize {
        self.graded + self.try_again
    }

    /// True when no unsubmitted question had a draft.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// The test and section currently open in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTest {
    pub id: TestId,
    pub section: String,
}

pub struct StudyController {
    clock: Clock,
    gateway: PersistenceGateway,
    library: Library,
    active: Option<ActiveTest>,
    filter: QuestionFilter,
    search: String,
}

impl StudyController {
    #[must_use]
    pub fn new(clock: Clock, gateway: PersistenceGateway) -> Self {
        Self {
            clock,
            gateway,
            library: Library::new(),
            active: None,
            filter: QuestionFilter::default(),
            search: String::new(),
        }
    }

    #[must_use]
    pub fn library(&self) -> &Library {
        &self.library
    }

    /// The clock used for new test ids and timer ticks.
    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    #[must_use]
    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveTest> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_test(&self) -> Option<&Test> {
        self.active.as_ref().and_then(|a| self.library.get(&a.id))
    }

    #[must_use]
    pub fn filter(&self) -> QuestionFilter {
        self.filter
    }

    /// Replaces the library with what the current backend holds.
    ///
    /// Returns false and keeps the current library when the read fails.
    pub async fn load(&mut self) -> bool {
        match self.gateway.load().await {
            Some(library) => {
                self.library = library;
                self.active = None;
                true
            }
            None => false,
        }
    }

    fn persist(&self) {
        self.gateway.schedule(&self.library);
    }

    //
    // ─── LIBRARY ───────────────────────────────────────────────────────────────
    //

    /// Validates `key_json` and adds a new test built from it.
    ///
    /// A blank title falls back to the file name without its `.json` suffix.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::KeyImport` for a malformed key; the library is
    /// left untouched.
    pub fn create_test_from_key(
        &mut self,
        file_name: &str,
        key_json: &str,
        title: &str,
        subject: &str,
    ) -> Result<TestId, StudyError> {
        let key = AnswerKey::parse(key_json)?;

        let title = match title.trim() {
            "" => file_name.trim().trim_end_matches(".json").to_owned(),
            title => title.to_owned(),
        };
        let now = self.clock.now_millis();
        let id = self.unused_id(now);
        let test = Test::new(id.clone(), title, subject.trim(), key, now);

        tracing::info!(test = %id, questions = test.total_questions(), "test created");
        self.library.insert(test);
        self.persist();
        Ok(id)
    }

    fn unused_id(&self, now_millis: i64) -> TestId {
        let base = TestId::from_millis(now_millis);
        if !self.library.contains(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = TestId::new(format!("{}_{n}", base.as_str()));
            if !self.library.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn edit_test(&mut self, id: &TestId, edits: &TestEdits) -> bool {
        let Some(test) = self.library.get_mut(id) else {
            tracing::debug!(test = %id, "edit ignored, no such test");
            return false;
        };
        test.apply_edits(edits);
        self.persist();
        true
    }

    /// Removes a test and all of its progress. Closes it if it was open.
    pub fn delete_test(&mut self, id: &TestId) -> bool {
        if self.library.remove(id).is_none() {
            return false;
        }
        if self.active.as_ref().is_some_and(|a| &a.id == id) {
            self.active = None;
            self.filter.clear();
        }
        self.persist();
        true
    }

    pub fn set_search(&mut self, term: &str) {
        term.trim().clone_into(&mut self.search);
    }

    /// Library tests matching the current search term.
    pub fn search_results(&self) -> impl Iterator<Item = &Test> {
        self.library.search(&self.search)
    }

    #[must_use]
    pub fn completion(&self, id: &TestId) -> Option<Completion> {
        self.library.get(id).map(Completion::of_test)
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Opens a test on its first section with filters cleared.
    pub fn open_test(&mut self, id: &TestId) -> bool {
        let Some(test) = self.library.get_mut(id) else {
            tracing::debug!(test = %id, "open ignored, no such test");
            return false;
        };
        let section = test.key.first_section().unwrap_or_default().to_owned();
        if let Some(key_section) = test.key.section(&section).cloned() {
            study_core::model::init_section_progress(&mut test.progress, &section, &key_section);
        }
        self.active = Some(ActiveTest {
            id: id.clone(),
            section,
        });
        self.filter.clear();
        true
    }

    pub fn select_section(&mut self, name: &str) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let Some(test) = self.library.get_mut(&active.id) else {
            return false;
        };
        let Some(key_section) = test.key.section(name).cloned() else {
            return false;
        };
        study_core::model::init_section_progress(&mut test.progress, name, &key_section);
        name.clone_into(&mut active.section);
        true
    }

    /// Stops the timer, writes the library immediately and closes the test.
    pub async fn go_home(&mut self) -> SyncEvent {
        if let Some(test) = self.active_test_mut() {
            timer::stop(test);
        }
        self.active = None;
        self.filter.clear();
        self.gateway.flush(&self.library).await
    }

    fn active_test_mut(&mut self) -> Option<&mut Test> {
        let id = self.active.as_ref()?.id.clone();
        self.library.get_mut(&id)
    }

    fn active_question(&mut self, section: &str, index: usize) -> Option<&mut QuestionProgress> {
        self.active_test_mut()?.question_mut(section, index)
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    fn edit_question(
        &mut self,
        section: &str,
        index: usize,
        edit: impl FnOnce(&mut QuestionProgress) -> bool,
    ) -> bool {
        let changed = self.active_question(section, index).is_some_and(edit);
        if changed {
            self.persist();
        }
        changed
    }

    pub fn select_single(&mut self, section: &str, index: usize, option: &str) -> bool {
        self.edit_question(section, index, |q| grading::select_single(q, option))
    }

    pub fn toggle_choice(&mut self, section: &str, index: usize, option: &str) -> bool {
        self.edit_question(section, index, |q| grading::toggle_choice(q, option))
    }

    pub fn set_text(&mut self, section: &str, index: usize, text: &str) -> bool {
        self.edit_question(section, index, |q| grading::set_text(q, text))
    }

    /// Replaces the draft from one line of input, shaped by the section type.
    ///
    /// Multi-select input is read as a run of option letters (`"A C"`, `"ac"`).
    pub fn set_draft(&mut self, section: &str, index: usize, raw: &str) -> bool {
        let Some(kind) = self.active_test().and_then(|t| t.section(section)).map(|s| s.kind) else {
            return false;
        };
        match kind {
            SectionType::Multi => {
                let letters: Vec<String> = raw
                    .chars()
                    .filter(char::is_ascii_alphabetic)
                    .map(|c| c.to_ascii_uppercase().to_string())
                    .collect();
                self.edit_question(section, index, |q| grading::set_selection(q, letters))
            }
            SectionType::Single | SectionType::Numerical => self.set_text(section, index, raw.trim()),
        }
    }

    pub fn toggle_mark(&mut self, section: &str, index: usize) -> bool {
        self.edit_question(section, index, |q| {
            q.marked = !q.marked;
            true
        })
    }

    pub fn toggle_star(&mut self, section: &str, index: usize) -> bool {
        self.edit_question(section, index, |q| {
            q.starred = !q.starred;
            true
        })
    }

    pub fn save_note(&mut self, section: &str, index: usize, note: &str) -> bool {
        self.edit_question(section, index, |q| {
            note.trim().clone_into(&mut q.note);
            true
        })
    }

    pub fn delete_note(&mut self, section: &str, index: usize) -> bool {
        self.edit_question(section, index, |q| {
            q.note.clear();
            true
        })
    }

    /// Grades one question of the open test.
    ///
    /// Returns `Ok(None)` when the test, section or question does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Grading` for a blank draft or a final question;
    /// nothing is changed or saved.
    pub fn submit_question(
        &mut self,
        section: &str,
        index: usize,
    ) -> Result<Option<SubmitOutcome>, StudyError> {
        let Some(test) = self.active_test_mut() else {
            return Ok(None);
        };
        let Some(expected) = test.section(section).and_then(|s| s.answer(index)).cloned() else {
            return Ok(None);
        };
        let Some(q) = test.question_mut(section, index) else {
            return Ok(None);
        };
        let outcome = grading::submit(q, &expected)?;
        tracing::debug!(section, index, ?outcome, "question submitted");
        self.persist();
        Ok(Some(outcome))
    }

    /// Grades every unsubmitted question of `section` that has a draft.
    ///
    /// Returns `None` when no test is open or the section does not exist.
    pub fn submit_all_attempted(&mut self, section: &str) -> Option<BulkSubmit> {
        let test = self.active_test_mut()?;
        let key_section = test.section(section)?.clone();
        study_core::model::init_section_progress(&mut test.progress, section, &key_section);
        let entries = test.progress.get_mut(section)?;

        let mut bulk = BulkSubmit::default();
        for (index, expected) in key_section.answers.iter().enumerate() {
            let Some(q) = entries.get_mut(&index) else {
                continue;
            };
            if q.submitted || !q.has_answer() {
                continue;
            }
            match grading::submit(q, expected) {
                Ok(SubmitOutcome::Graded(_)) => bulk.graded += 1,
                Ok(SubmitOutcome::TryAgain { .. }) => bulk.try_again += 1,
                Err(_) => {}
            }
        }

        if bulk.is_empty() {
            tracing::info!(section, "no new answers to submit");
        } else {
            self.persist();
        }
        Some(bulk)
    }

    //
    // ─── FILTERS & REPORTS ─────────────────────────────────────────────────────
    //

    pub fn toggle_filter(&mut self, kind: FilterKind) {
        self.filter.toggle(kind);
    }

    pub fn clear_filters(&mut self) {
        self.filter.clear();
    }

    /// Indices of the open section's questions that pass the filters.
    #[must_use]
    pub fn visible_questions(&self) -> Vec<usize> {
        let Some(active) = self.active.as_ref() else {
            return Vec::new();
        };
        let Some(test) = self.library.get(&active.id) else {
            return Vec::new();
        };
        test.section(&active.section)
            .map(|section| {
                self.filter
                    .visible(section, test.progress.get(&active.section))
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn report(&self, id: &TestId) -> Option<TestReport> {
        self.library.get(id).map(TestReport::build)
    }

    //
    // ─── IMPORT / EXPORT ───────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `StudyError::Serialization`; not expected for in-memory data.
    pub fn export_library(&self) -> Result<String, StudyError> {
        Ok(self.library.to_json()?)
    }

    /// # Errors
    ///
    /// Returns `StudyError::Serialization`; not expected for in-memory data.
    pub fn export_test(&self, id: &TestId) -> Result<Option<String>, StudyError> {
        Ok(self.library.export_test(id)?)
    }

    /// The test's answer key in its upload layout.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Serialization`; not expected for a validated key.
    pub fn export_key(&self, id: &TestId) -> Result<Option<String>, StudyError> {
        self.library
            .get(id)
            .map(|test| test.key.to_pretty_json())
            .transpose()
            .map_err(StudyError::from)
    }

    /// Merges a backup into the library; same ids are overwritten.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::LibraryImport` for a malformed backup; the
    /// library is left untouched.
    pub fn import_library(&mut self, json: &str) -> Result<usize, StudyError> {
        let imported = Library::from_json(json)?;
        let count = self.library.merge(imported);
        tracing::info!(count, "library imported");
        self.persist();
        Ok(count)
    }

    //
    // ─── TIMER ─────────────────────────────────────────────────────────────────
    //

    /// Sets countdown minutes (0 for count-up) and session goal on the open test.
    ///
    /// # Errors
    ///
    /// Returns `StudyError::Timer` for negative minutes.
    pub fn configure_timer(&mut self, minutes: i64, session_goal: u32) -> Result<bool, StudyError> {
        let Some(test) = self.active_test_mut() else {
            return Ok(false);
        };
        timer::configure(test, minutes, session_goal)?;
        self.persist();
        Ok(true)
    }

    pub fn start_timer(&mut self) -> bool {
        let now = self.clock.now_millis();
        let started = self.active_test_mut().is_some_and(|test| timer::start(test, now));
        if started {
            self.persist();
        }
        started
    }

    pub fn stop_timer(&mut self) -> bool {
        let stopped = self.active_test_mut().is_some_and(timer::stop);
        if stopped {
            self.persist();
        }
        stopped
    }

    /// Folds elapsed wall-clock time into the open test.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now_millis();
        let Some(test) = self.active_test_mut() else {
            return TickOutcome::Idle;
        };
        let outcome = timer::tick(test, now);
        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Expired { .. } => {
                tracing::info!("countdown finished");
                self.persist();
            }
            TickOutcome::Advanced { .. } => self.persist(),
        }
        outcome
    }

    /// Ticks every `interval` until `stop` resolves or a countdown expires.
    pub async fn run_timer_until<F: Future<Output = ()>>(
        &mut self,
        interval: Duration,
        stop: F,
    ) -> TickOutcome {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        tokio::pin!(stop);

        let mut last = TickOutcome::Idle;
        loop {
            tokio::select! {
                () = &mut stop => return last,
                _ = ticker.tick() => {
                    last = self.tick();
                    if matches!(last, TickOutcome::Expired { .. } | TickOutcome::Idle) {
                        return last;
                    }
                }
            }
        }
    }

    //
    // ─── ACCOUNT ───────────────────────────────────────────────────────────────
    //

    /// Switches saves to the user's remote document and loads it.
    ///
    /// Returns false when the remote read failed; the library is then kept.
    pub async fn sign_in(&mut self, user: UserId, email: Option<String>) -> bool {
        if self.gateway.has_pending() {
            self.gateway.flush(&self.library).await;
        }
        tracing::info!(user = %user, "signed in");
        self.gateway.set_target(SyncTarget::Remote { user, email });
        self.load().await
    }

    /// Writes pending changes, then clears the library and returns to the
    /// local backend.
    pub async fn sign_out(&mut self) {
        if self.gateway.has_pending() {
            self.gateway.flush(&self.library).await;
        }
        self.gateway.set_target(SyncTarget::Local);
        self.library = Library::new();
        self.active = None;
        self.filter.clear();
        self.search.clear();
    }

    /// Writes the library now, cancelling any armed save.
    pub async fn flush(&self) -> SyncEvent {
        self.gateway.flush(&self.library).await
    }
}
