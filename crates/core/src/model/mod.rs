pub mod answer_key;
mod ids;
pub mod library;
pub mod progress;
mod workspace;

pub use answer_key::{AnswerKey, ExpectedAnswer, KeyImportError, Section, SectionType};
pub use ids::{ParseIdError, TestId, UserId};
pub use library::{Library, LibraryImportError};
pub use progress::{
    ensure_initialized, init_section_progress, Progress, QuestionProgress, SectionProgress,
    UserAnswer,
};
pub use practice_test::{embed_link, Test, TestEdits, TimerMode};
pub use workspace::{QuickLink, QuickLinks, Theme, TodoItem, TodoList, WorkspaceError};
