use std::fmt;

use serde::{Deserialize, Serialize};

/// What triggered a submission attempt. Recorded for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    /// The user asked to submit.
    Manual,
    /// The countdown reached the deadline.
    Timeout,
}

impl fmt::Display for SubmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitReason::Manual => f.write_str("manual"),
            SubmitReason::Timeout => f.write_str("timeout"),
        }
    }
}

/// Lifecycle of a single exam session.
///
/// ```text
/// Created ──start──▶ Active ──claim──▶ Submitting ──ok──▶ Completed
///                      ▲                   │
///                      └──resume── Failed ◀┘ err
/// ```
///
/// Any non-terminal state may move to `Abandoned` when the caller walks away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum SessionState {
    Created,
    Active,
    Submitting(SubmitReason),
    Completed,
    Failed,
    Abandoned,
}

impl SessionState {
    /// No further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Abandoned)
    }

    /// The session has reached a state where it waits on the caller, not on
    /// the countdown or the network.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Abandoned
        )
    }

    #[must_use]
    pub fn accepts_answers(self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => f.write_str("created"),
            SessionState::Active => f.write_str("active"),
            SessionState::Submitting(reason) => write!(f, "submitting ({reason})"),
            SessionState::Completed => f.write_str("completed"),
            SessionState::Failed => f.write_str("failed"),
            SessionState::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Aggregated view of answering progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
}

impl SessionProgress {
    #[must_use]
    pub fn new(total: usize, answered: usize) -> Self {
        Self {
            total,
            answered,
            unanswered: total.saturating_sub(answered),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.unanswered == 0
    }
}
