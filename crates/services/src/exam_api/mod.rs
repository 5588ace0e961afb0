//! Contracts for the two backend collaborators the exam engine talks to.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use exam_core::model::{Answer, ExamId, QuestionSet, SubmissionResult};

use crate::error::ExamApiError;

pub use http::{ExamApiConfig, HttpExamApi};

/// Everything sent to the backend when an exam is handed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub exam_id: ExamId,
    pub answers: Vec<Answer>,
    pub started_at: DateTime<Utc>,
}

/// Source of exam content.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Fetch the full question set for an exam.
    ///
    /// # Errors
    ///
    /// Returns `ExamApiError` if the backend is unreachable or the payload is invalid.
    async fn load_exam(&self, exam_id: ExamId) -> Result<QuestionSet, ExamApiError>;
}

/// Grades a finished set of answers.
#[async_trait]
pub trait SubmissionService: Send + Sync {
    /// Hand in the answers and return the graded result.
    ///
    /// # Errors
    ///
    /// Returns `ExamApiError` on transport failures or a non-success response.
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResult, ExamApiError>;
}
