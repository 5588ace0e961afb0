use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use exam_core::model::{SessionState, SubmissionResult, SubmitReason};

use super::controller::{SessionCore, SessionShared, SubmitOutcome};
use crate::error::{ExamApiError, ExamSessionError};
use crate::exam_api::{SubmissionPayload, SubmissionService};

/// Result of trying to take ownership of a session's submission.
#[derive(Debug)]
pub(crate) enum Claim {
    Won(SubmissionPayload),
    Lost(SessionState),
}

/// Move the session into `Submitting` if `reason` may submit from the current
/// state, snapshotting the answers at that instant.
///
/// Must be called with the session lock held; that is what makes the claim
/// atomic between the countdown and the caller.
pub(crate) fn claim(core: &mut SessionCore, reason: SubmitReason) -> Result<Claim, ExamSessionError> {
    let state = core.state;
    let may_claim = match (state, reason) {
        (SessionState::Active, _) => true,
        // Manual retry after a failed attempt re-enters through Active.
        (SessionState::Failed, SubmitReason::Manual) => true,
        (SessionState::Created | SessionState::Abandoned, SubmitReason::Manual) => {
            return Err(ExamSessionError::InvalidState {
                operation: "submit",
                state,
            });
        }
        _ => false,
    };
    if !may_claim {
        return Ok(Claim::Lost(state));
    }

    let Some(exam) = core.exam.as_ref() else {
        return Err(ExamSessionError::InvalidState {
            operation: "submit",
            state,
        });
    };
    let payload = SubmissionPayload {
        exam_id: exam.question_set.exam_id(),
        answers: core.ledger.snapshot(),
        started_at: exam.started_at,
    };
    core.state = SessionState::Submitting(reason);
    Ok(Claim::Won(payload))
}

/// Apply the backend's answer to a claimed session.
///
/// A session abandoned while the call was in flight keeps its state.
pub(crate) fn settle(
    core: &mut SessionCore,
    outcome: &Result<SubmissionResult, ExamApiError>,
) -> SessionState {
    if !matches!(core.state, SessionState::Submitting(_)) {
        return core.state;
    }
    match outcome {
        Ok(result) => {
            core.result = Some(result.clone());
            core.last_error = None;
            core.state = SessionState::Completed;
            core.stop_countdown();
        }
        Err(err) => {
            core.last_error = Some(err.to_string());
            core.state = SessionState::Failed;
        }
    }
    core.state
}

/// Guarantees a single outbound submission per claim, whichever trigger fires.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    service: Arc<dyn SubmissionService>,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(service: Arc<dyn SubmissionService>) -> Self {
        Self { service }
    }

    /// Claim the session for `reason` and send its answers.
    ///
    /// The backend call runs on its own task, which settles the session when
    /// the call returns. Dropping the returned future stops the wait, not the
    /// submission.
    pub(crate) async fn submit(
        &self,
        session: &Arc<SessionShared>,
        reason: SubmitReason,
    ) -> Result<SubmitOutcome, ExamSessionError> {
        let runtime = Handle::try_current().map_err(|_| ExamSessionError::NoRuntime)?;
        let payload = {
            let mut core = session.lock();
            match claim(&mut core, reason)? {
                Claim::Won(payload) => {
                    session.publish_state(core.state);
                    payload
                }
                Claim::Lost(state) => {
                    debug!(session_id = %session.id(), %reason, %state, "submission already claimed");
                    return Ok(SubmitOutcome::Skipped(state));
                }
            }
        };

        info!(
            session_id = %session.id(),
            exam_id = %payload.exam_id,
            %reason,
            answers = payload.answers.len(),
            "submitting exam"
        );
        let service = Arc::clone(&self.service);
        let shared = Arc::clone(session);
        let call = runtime.spawn(async move {
            let outcome = service.submit(&payload).await;
            settle_and_log(&shared, reason, &outcome);
            outcome
        });

        let outcome = match call.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let outcome = Err(ExamApiError::Interrupted(join_err.to_string()));
                settle_and_log(session, reason, &outcome);
                outcome
            }
        };
        outcome
            .map(SubmitOutcome::Submitted)
            .map_err(ExamSessionError::Submission)
    }
}

fn settle_and_log(
    session: &SessionShared,
    reason: SubmitReason,
    outcome: &Result<SubmissionResult, ExamApiError>,
) {
    {
        let mut core = session.lock();
        let state = settle(&mut core, outcome);
        session.publish_state(state);
    }
    match outcome {
        Ok(result) => info!(
            session_id = %session.id(),
            score = result.score,
            correct = result.total_correct,
            total = result.total_questions,
            "exam submitted"
        ),
        Err(err) => {
            warn!(session_id = %session.id(), %reason, error = %err, "exam submission failed");
        }
    }
}

impl fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionCoordinator").finish_non_exhaustive()
    }
}
