mod config;
mod controller;
mod coordinator;
mod countdown;
mod workflow;

// Public API of the exam session subsystem.
pub use crate::error::ExamSessionError;
pub use config::{DEFAULT_TICK_INTERVAL, MIN_TICK_INTERVAL, SessionConfig};
pub use controller::{ExamSession, SubmitOutcome};
pub use coordinator::SubmissionCoordinator;
pub use workflow::ExamLoopService;
