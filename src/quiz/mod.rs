mod attempts;
mod session;
mod timer;

use thiserror::Error;

use crate::models::OptionLetter;

pub use attempts::{LiveAttempt, QuizAttempts};
pub use session::{
    Advance, Grade, QuestionView, QuizOutcome, QuizSession, QuizStart, QuizView, Submission, Tick,
    format_time,
};
pub use timer::QuizTimer;

/// Countdown budget of a quiz attempt when nothing else is configured.
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 300;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuizError {
    #[error("Quiz has already been submitted")]
    AlreadyCompleted,

    #[error("Quiz has not been submitted yet")]
    NotCompleted,

    #[error("Select an answer before moving on")]
    NoAnswerSelected,

    #[error("Answer {0} is not one of the options")]
    InvalidAnswer(OptionLetter),
}
