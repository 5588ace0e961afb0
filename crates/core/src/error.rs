use thiserror::Error;

use crate::countdown::CountdownError;
use crate::model::{LedgerError, QuestionError, QuestionSetError};

/// Any validation failure raised by the domain layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    QuestionSet(#[from] QuestionSetError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Countdown(#[from] CountdownError),
}
