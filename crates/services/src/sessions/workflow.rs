use std::sync::Arc;

use exam_core::model::ExamId;

use super::config::SessionConfig;
use super::controller::ExamSession;
use super::coordinator::SubmissionCoordinator;
use crate::Clock;
use crate::error::ExamSessionError;
use crate::exam_api::{QuestionProvider, SubmissionService};

/// Creates exam sessions wired to the backend collaborators.
#[derive(Clone)]
pub struct ExamLoopService {
    clock: Clock,
    config: SessionConfig,
    questions: Arc<dyn QuestionProvider>,
    submissions: Arc<dyn SubmissionService>,
}

impl ExamLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionProvider>,
        submissions: Arc<dyn SubmissionService>,
    ) -> Self {
        Self {
            clock,
            config: SessionConfig::default(),
            questions,
            submissions,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// A fresh session in `Created`, not yet loaded.
    #[must_use]
    pub fn new_session(&self) -> ExamSession {
        ExamSession::new(
            SubmissionCoordinator::new(Arc::clone(&self.submissions)),
            self.clock.clone(),
            self.config,
        )
    }

    /// Load `exam_id` into `session` and start it.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::Load` if the exam cannot be fetched; the
    /// session stays in `Created` and may be retried.
    pub async fn start(&self, session: &ExamSession, exam_id: ExamId) -> Result<(), ExamSessionError> {
        session.load_and_start(self.questions.as_ref(), exam_id).await
    }

    /// Create, load and start a session in one step.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError` if loading or starting fails.
    pub async fn start_exam(&self, exam_id: ExamId) -> Result<ExamSession, ExamSessionError> {
        let session = self.new_session();
        self.start(&session, exam_id).await?;
        Ok(session)
    }
}
