use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ExamId, QuestionId};

/// Maximum number of choices a single question may carry.
pub const MAX_CHOICES: usize = 4;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has empty text")]
    EmptyText(QuestionId),

    #[error("question {0} has no choices")]
    NoChoices(QuestionId),

    #[error("question {id} has {len} choices (max 4)")]
    TooManyChoices { id: QuestionId, len: usize },

    #[error("question {id} repeats choice label {label}")]
    DuplicateLabel { id: QuestionId, label: ChoiceLabel },

    #[error("invalid choice label: {0:?}")]
    InvalidLabel(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionSetError {
    #[error("exam {0} has no questions")]
    Empty(ExamId),

    #[error("declared question count ({declared}) does not match loaded questions ({actual})")]
    CountMismatch { declared: usize, actual: usize },

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("exam duration must be positive")]
    InvalidDuration,

    #[error(transparent)]
    Question(#[from] QuestionError),
}

//
// ─── CHOICES ──────────────────────────────────────────────────────────────────
//

/// Position label of a choice, rendered as `A`..`D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChoiceLabel {
    A,
    B,
    C,
    D,
}

impl ChoiceLabel {
    pub const ALL: [ChoiceLabel; MAX_CHOICES] =
        [ChoiceLabel::A, ChoiceLabel::B, ChoiceLabel::C, ChoiceLabel::D];

    /// Parses a single-letter label, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidLabel` for anything other than `a`..`d`.
    pub fn parse(raw: &str) -> Result<Self, QuestionError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            _ => Err(QuestionError::InvalidLabel(raw.to_string())),
        }
    }
}

impl fmt::Display for ChoiceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            ChoiceLabel::A => "A",
            ChoiceLabel::B => "B",
            ChoiceLabel::C => "C",
            ChoiceLabel::D => "D",
        };
        f.write_str(letter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: ChoiceLabel,
    pub text: String,
}

impl Choice {
    #[must_use]
    pub fn new(label: ChoiceLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
        }
    }
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    choices: Vec<Choice>,
}

impl Question {
    /// Build a question, ordering its choices by label.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the text is blank, there are no choices,
    /// more than four choices, or a label is repeated.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        mut choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText(id));
        }
        if choices.is_empty() {
            return Err(QuestionError::NoChoices(id));
        }
        if choices.len() > MAX_CHOICES {
            return Err(QuestionError::TooManyChoices {
                id,
                len: choices.len(),
            });
        }

        choices.sort_by_key(|choice| choice.label);
        if let Some(pair) = choices.windows(2).find(|pair| pair[0].label == pair[1].label) {
            return Err(QuestionError::DuplicateLabel {
                id,
                label: pair[0].label,
            });
        }

        Ok(Self { id, text, choices })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn choice(&self, label: ChoiceLabel) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.label == label)
    }
}

//
// ─── QUESTION SET ─────────────────────────────────────────────────────────────
//

/// Immutable snapshot of an exam, loaded once when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet {
    exam_id: ExamId,
    exam_name: String,
    questions: Vec<Question>,
    duration: Duration,
}

impl QuestionSet {
    /// Build a question set. `total_questions` always equals `questions.len()`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSetError` if the set is empty, a question id repeats,
    /// or the duration is zero.
    pub fn new(
        exam_id: ExamId,
        exam_name: impl Into<String>,
        questions: Vec<Question>,
        duration: Duration,
    ) -> Result<Self, QuestionSetError> {
        if questions.is_empty() {
            return Err(QuestionSetError::Empty(exam_id));
        }
        if duration.is_zero() {
            return Err(QuestionSetError::InvalidDuration);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(QuestionSetError::DuplicateQuestion(question.id()));
            }
        }

        Ok(Self {
            exam_id,
            exam_name: exam_name.into(),
            questions,
            duration,
        })
    }

    /// Build a question set from a payload that declares its own count.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSetError::CountMismatch` if `declared_total` differs from
    /// the number of questions, plus everything `new` can return.
    pub fn with_declared_total(
        exam_id: ExamId,
        exam_name: impl Into<String>,
        questions: Vec<Question>,
        duration: Duration,
        declared_total: usize,
    ) -> Result<Self, QuestionSetError> {
        if declared_total != questions.len() {
            return Err(QuestionSetError::CountMismatch {
                declared: declared_total,
                actual: questions.len(),
            });
        }
        Self::new(exam_id, exam_name, questions, duration)
    }

    #[must_use]
    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    #[must_use]
    pub fn exam_name(&self) -> &str {
        &self.exam_name
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|question| question.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: QuestionId) -> bool {
        self.question(id).is_some()
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u64 {
        self.duration.as_secs()
    }
}
