mod answer;
mod ids;
mod question;
mod result;
mod session;

pub use ids::{ExamId, ParseIdError, QuestionId, SessionId};

pub use answer::{Answer, AnswerLedger, LedgerError};
pub use question::{
    Choice, ChoiceLabel, MAX_CHOICES, Question, QuestionError, QuestionSet, QuestionSetError,
};
pub use result::{EXCELLENT_SCORE, PASSING_SCORE, ScoreBand, SubmissionResult};
pub use session::{SessionProgress, SessionState, SubmitReason};
