use std::collections::HashMap;

use serde::Serialize;

use crate::models::{OptionLetter, QuizQuestion};

use super::QuizError;

/// Result of opening a lesson's quiz.
#[derive(Debug)]
pub enum QuizStart {
    NoQuizAvailable,
    Ready(QuizSession),
}

/// What a "next" request did.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Moved(usize),
    Submitted(QuizOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Submitted(QuizOutcome),
    AlreadySubmitted(QuizOutcome),
}

impl Submission {
    pub fn outcome(&self) -> &QuizOutcome {
        match self {
            Submission::Submitted(outcome) | Submission::AlreadySubmitted(outcome) => outcome,
        }
    }
}

/// Effect of one timer period on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Tick {
    /// Nothing to count down: the quiz is already submitted.
    Idle,
    Ticked(u32),
    Expired(QuizOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Passing,
    NeedsWork,
}

impl Grade {
    pub fn from_percentage(percentage: u32) -> Self {
        match percentage {
            80.. => Grade::Excellent,
            60.. => Grade::Passing,
            _ => Grade::NeedsWork,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOutcome {
    pub score: u32,
    pub max_score: u32,
    pub percentage: u32,
    pub correct_count: usize,
    pub total_questions: usize,
    pub time_taken: u32,
    pub grade: Grade,
}

/// Question as shown to the learner. The correct answer and explanation
/// only appear once the attempt is submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: i64,
    pub question: String,
    pub options: Vec<String>,
    pub points: u32,
    pub position: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<OptionLetter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub questions: Vec<QuestionView>,
    pub current_index: usize,
    pub total_questions: usize,
    pub progress_percentage: u32,
    pub answers: HashMap<i64, OptionLetter>,
    pub remaining_secs: u32,
    pub remaining_display: String,
    pub completed: bool,
    pub show_explanation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<QuizOutcome>,
}

/// One learner's pass through a lesson quiz.
///
/// The session is either in progress (index moving over the questions,
/// answers accumulating, clock running) or completed (score fixed). Every
/// mutation while completed is rejected except `retake`, which resets the
/// same instance back to the start.
#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    current_index: usize,
    answers: HashMap<i64, OptionLetter>,
    time_limit: u32,
    remaining: u32,
    completed: bool,
    score: u32,
    show_explanation: bool,
}

impl QuizSession {
    /// Opens a quiz over `questions`, already ordered by position. An empty
    /// question list never builds a session.
    pub fn start(questions: Vec<QuizQuestion>, time_limit_secs: u32) -> QuizStart {
        if questions.is_empty() {
            return QuizStart::NoQuizAvailable;
        }

        QuizStart::Ready(Self {
            questions,
            current_index: 0,
            answers: HashMap::new(),
            time_limit: time_limit_secs,
            remaining: time_limit_secs,
            completed: false,
            score: 0,
            show_explanation: false,
        })
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> &QuizQuestion {
        &self.questions[self.current_index]
    }

    pub fn answers(&self) -> &HashMap<i64, OptionLetter> {
        &self.answers
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn is_explanation_shown(&self) -> bool {
        self.show_explanation
    }

    fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.questions.len()
    }

    /// Position through the quiz as a whole percentage, counting the
    /// question on screen.
    pub fn progress_percentage(&self) -> u32 {
        let total = self.questions.len() as f64;
        ((self.current_index + 1) as f64 / total * 100.0).round() as u32
    }

    fn ensure_in_progress(&self) -> Result<(), QuizError> {
        if self.completed {
            Err(QuizError::AlreadyCompleted)
        } else {
            Ok(())
        }
    }

    /// Records (or overwrites) the answer for the current question.
    pub fn select_answer(&mut self, answer: OptionLetter) -> Result<(), QuizError> {
        self.ensure_in_progress()?;

        let question = self.current_question();
        if !answer.is_within(question.options.len()) {
            return Err(QuizError::InvalidAnswer(answer));
        }

        let question_id = question.id;
        self.answers.insert(question_id, answer);
        self.show_explanation = false;
        Ok(())
    }

    /// Moves to the next question, or submits when already on the last one.
    pub fn next(&mut self) -> Result<Advance, QuizError> {
        self.ensure_in_progress()?;

        if !self.answers.contains_key(&self.current_question().id) {
            return Err(QuizError::NoAnswerSelected);
        }

        if self.is_last_question() {
            return Ok(Advance::Submitted(self.complete()));
        }

        self.current_index += 1;
        self.show_explanation = false;
        Ok(Advance::Moved(self.current_index))
    }

    pub fn previous(&mut self) -> Result<usize, QuizError> {
        self.ensure_in_progress()?;

        self.current_index = self.current_index.saturating_sub(1);
        self.show_explanation = false;
        Ok(self.current_index)
    }

    /// Scores the attempt. A second call reports the first outcome unchanged.
    pub fn submit(&mut self) -> Submission {
        if self.completed {
            Submission::AlreadySubmitted(self.build_outcome())
        } else {
            Submission::Submitted(self.complete())
        }
    }

    fn complete(&mut self) -> QuizOutcome {
        self.score = self
            .questions
            .iter()
            .filter(|q| self.answers.get(&q.id) == Some(&q.correct_answer))
            .map(|q| q.points)
            .sum();
        self.completed = true;
        self.build_outcome()
    }

    /// Advances the countdown by one second. Reaching zero submits.
    pub fn tick(&mut self) -> Tick {
        if self.completed {
            return Tick::Idle;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            Tick::Expired(self.complete())
        } else {
            Tick::Ticked(self.remaining)
        }
    }

    pub fn retake(&mut self) -> Result<(), QuizError> {
        if !self.completed {
            return Err(QuizError::NotCompleted);
        }

        self.current_index = 0;
        self.answers.clear();
        self.remaining = self.time_limit;
        self.completed = false;
        self.score = 0;
        self.show_explanation = false;
        Ok(())
    }

    /// Reveals the current question's explanation, if it has one.
    pub fn show_explanation(&mut self) -> Option<&str> {
        self.show_explanation = true;
        self.current_question().explanation.as_deref()
    }

    pub fn outcome(&self) -> Option<QuizOutcome> {
        self.completed.then(|| self.build_outcome())
    }

    fn build_outcome(&self) -> QuizOutcome {
        let max_score: u32 = self.questions.iter().map(|q| q.points).sum();
        let percentage = if max_score == 0 {
            0
        } else {
            (self.score as f64 / max_score as f64 * 100.0).round() as u32
        };

        QuizOutcome {
            score: self.score,
            max_score,
            percentage,
            correct_count: self
                .questions
                .iter()
                .filter(|q| self.answers.get(&q.id) == Some(&q.correct_answer))
                .count(),
            total_questions: self.questions.len(),
            time_taken: self.time_limit - self.remaining,
            grade: Grade::from_percentage(percentage),
        }
    }

    pub fn view(&self) -> QuizView {
        let questions = self
            .questions
            .iter()
            .map(|q| QuestionView {
                id: q.id,
                question: q.question.clone(),
                options: q.options.clone(),
                points: q.points,
                position: q.position,
                correct_answer: self.completed.then_some(q.correct_answer),
                explanation: if self.completed { q.explanation.clone() } else { None },
            })
            .collect();

        QuizView {
            questions,
            current_index: self.current_index,
            total_questions: self.questions.len(),
            progress_percentage: self.progress_percentage(),
            answers: self.answers.clone(),
            remaining_secs: self.remaining,
            remaining_display: format_time(self.remaining),
            completed: self.completed,
            show_explanation: self.show_explanation,
            explanation: if self.show_explanation {
                self.current_question().explanation.clone()
            } else {
                None
            },
            outcome: self.outcome(),
        }
    }
}

/// Formats seconds as `MM:SS`.
pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
