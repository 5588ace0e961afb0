use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::QuestionSet;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
}

/// A selected value for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub chosen_value: String,
}

impl Answer {
    #[must_use]
    pub fn new(question_id: QuestionId, chosen_value: impl Into<String>) -> Self {
        Self {
            question_id,
            chosen_value: chosen_value.into(),
        }
    }
}

/// Last-write-wins record of the answers selected during a session.
///
/// Only ids belonging to the question set the ledger was created for are
/// accepted.
#[derive(Debug, Clone, Default)]
pub struct AnswerLedger {
    known: HashSet<QuestionId>,
    entries: HashMap<QuestionId, Answer>,
}

impl AnswerLedger {
    #[must_use]
    pub fn for_question_set(set: &QuestionSet) -> Self {
        Self {
            known: set.questions().iter().map(|q| q.id()).collect(),
            entries: HashMap::with_capacity(set.total_questions()),
        }
    }

    /// Record `value` for `question_id`, replacing any earlier entry.
    ///
    /// Returns the replaced answer, if any.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownQuestion` if the id is outside the set; the
    /// ledger is left unchanged.
    pub fn set(
        &mut self,
        question_id: QuestionId,
        value: impl Into<String>,
    ) -> Result<Option<Answer>, LedgerError> {
        if !self.known.contains(&question_id) {
            return Err(LedgerError::UnknownQuestion(question_id));
        }
        Ok(self
            .entries
            .insert(question_id, Answer::new(question_id, value)))
    }

    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&Answer> {
        self.entries.get(&question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current answers ordered by question id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Answer> {
        let mut answers: Vec<Answer> = self.entries.values().cloned().collect();
        answers.sort_by_key(|answer| answer.question_id);
        answers
    }
}
