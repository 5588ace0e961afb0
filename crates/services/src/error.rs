//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::CountdownError;
use exam_core::model::{ChoiceLabel, LedgerError, QuestionId, SessionState};

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid base url {raw:?}: {source}")]
    InvalidBaseUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{key} must be a positive integer, got {raw:?}")]
    InvalidNumber { key: &'static str, raw: String },
}

/// Errors emitted by the exam backend collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamApiError {
    #[error("no access token configured")]
    MissingCredential,
    #[error("exam api request failed with status {status}")]
    HttpStatus {
        status: reqwest::StatusCode,
        message: Option<String>,
    },
    #[error("exam api rejected the request: {0}")]
    Rejected(String),
    #[error("exam api response is missing `{0}`")]
    MissingField(&'static str),
    #[error(transparent)]
    InvalidPayload(#[from] exam_core::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("submission task ended before the backend answered: {0}")]
    Interrupted(String),
}

/// Errors emitted by `ExamSession`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamSessionError {
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("exam time is over")]
    Expired,
    #[error(transparent)]
    UnknownQuestion(#[from] LedgerError),
    #[error("question {question_id} has no choice {label}")]
    UnknownChoice {
        question_id: QuestionId,
        label: ChoiceLabel,
    },
    #[error(transparent)]
    Countdown(#[from] CountdownError),
    #[error("exam session requires a running tokio runtime")]
    NoRuntime,
    #[error("failed to load exam: {0}")]
    Load(#[source] ExamApiError),
    #[error("failed to submit exam: {0}")]
    Submission(#[source] ExamApiError),
}

impl ExamSessionError {
    /// The operation was rejected because the session is not accepting it,
    /// either from its lifecycle state or because the deadline has passed.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            ExamSessionError::InvalidState { .. } | ExamSessionError::Expired
        )
    }
}
