#![forbid(unsafe_code)]

pub mod error;
pub mod exam_api;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use error::{ConfigError, ExamApiError, ExamSessionError};
pub use exam_api::{
    ExamApiConfig, HttpExamApi, QuestionProvider, SubmissionPayload, SubmissionService,
};

pub use sessions::{
    ExamLoopService, ExamSession, SessionConfig, SubmissionCoordinator, SubmitOutcome,
};
