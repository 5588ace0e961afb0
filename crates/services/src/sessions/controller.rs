use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use exam_core::model::{
    AnswerLedger, ChoiceLabel, ExamId, LedgerError, QuestionId, QuestionSet, SessionId,
    SessionProgress, SessionState, SubmissionResult, SubmitReason,
};
use exam_core::{Clock, Countdown};

use super::config::SessionConfig;
use super::coordinator::SubmissionCoordinator;
use super::countdown::spawn_countdown;
use crate::error::ExamSessionError;
use crate::exam_api::QuestionProvider;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// What a submit trigger accomplished.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// This trigger won the claim and the backend graded the exam.
    Submitted(SubmissionResult),
    /// Another trigger already owns (or finished) the submission; nothing was sent.
    Skipped(SessionState),
}

//
// ─── SHARED STATE ──────────────────────────────────────────────────────────────
//

/// Exam data fixed at `start`.
#[derive(Debug)]
pub(crate) struct StartedExam {
    pub(crate) question_set: Arc<QuestionSet>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) countdown: Arc<Countdown>,
}

/// Everything guarded by the session lock. Each transition is made while
/// holding it, which is what makes the submission claim atomic.
#[derive(Debug)]
pub(crate) struct SessionCore {
    pub(crate) state: SessionState,
    pub(crate) exam: Option<StartedExam>,
    pub(crate) ledger: AnswerLedger,
    pub(crate) result: Option<SubmissionResult>,
    pub(crate) last_error: Option<String>,
    countdown_task: Option<JoinHandle<()>>,
}

impl SessionCore {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Created,
            exam: None,
            ledger: AnswerLedger::default(),
            result: None,
            last_error: None,
            countdown_task: None,
        }
    }

    pub(crate) fn begin(
        &mut self,
        question_set: QuestionSet,
        started_at: DateTime<Utc>,
        countdown: Arc<Countdown>,
    ) {
        self.ledger = AnswerLedger::for_question_set(&question_set);
        self.exam = Some(StartedExam {
            question_set: Arc::new(question_set),
            started_at,
            countdown,
        });
        self.state = SessionState::Active;
    }

    pub(crate) fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.exam
            .as_ref()
            .is_some_and(|exam| exam.countdown.remaining_at(now).is_zero())
    }

    pub(crate) fn stop_countdown(&mut self) {
        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
    }
}

pub(crate) struct SessionShared {
    id: SessionId,
    clock: Clock,
    config: SessionConfig,
    coordinator: SubmissionCoordinator,
    core: Mutex<SessionCore>,
    state_tx: watch::Sender<SessionState>,
    remaining_tx: watch::Sender<Duration>,
}

impl SessionShared {
    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish_state(&self, state: SessionState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    pub(crate) fn publish_remaining(&self, remaining: Duration) {
        self.remaining_tx.send_replace(remaining);
    }
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        core.stop_countdown();
    }
}

//
// ─── SESSION CONTROLLER ────────────────────────────────────────────────────────
//

/// One timed attempt at an exam.
///
/// Handles are cheap to clone and all observe the same session. The countdown
/// runs on the tokio runtime that was current when `start` was called; when the
/// last handle is dropped the countdown is stopped.
#[derive(Clone)]
pub struct ExamSession {
    shared: Arc<SessionShared>,
}

impl ExamSession {
    #[must_use]
    pub fn new(coordinator: SubmissionCoordinator, clock: Clock, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Created);
        let (remaining_tx, _) = watch::channel(Duration::ZERO);
        Self {
            shared: Arc::new(SessionShared {
                id: SessionId::generate(),
                clock,
                config,
                coordinator,
                core: Mutex::new(SessionCore::new()),
                state_tx,
                remaining_tx,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Fix the start time and deadline, begin the countdown and accept answers.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::InvalidState` if the session was already started,
    /// `ExamSessionError::NoRuntime` outside a tokio runtime.
    pub fn start(&self, question_set: QuestionSet) -> Result<(), ExamSessionError> {
        let runtime = Handle::try_current().map_err(|_| ExamSessionError::NoRuntime)?;
        let shared = &self.shared;

        let mut core = shared.lock();
        if core.state != SessionState::Created {
            return Err(ExamSessionError::InvalidState {
                operation: "start",
                state: core.state,
            });
        }

        let started_at = shared.clock.now();
        let countdown = Arc::new(Countdown::starting_at(started_at, question_set.duration())?);
        let exam_id = question_set.exam_id();
        let total = question_set.total_questions();

        shared.publish_remaining(countdown.remaining_at(started_at));
        core.begin(question_set, started_at, Arc::clone(&countdown));
        core.countdown_task = Some(spawn_countdown(
            &runtime,
            Arc::downgrade(shared),
            Arc::clone(&countdown),
            shared.clock.clone(),
            shared.config.tick_interval(),
        ));
        shared.publish_state(core.state);

        info!(
            session_id = %shared.id,
            %exam_id,
            questions = total,
            deadline = %countdown.deadline(),
            "exam session started"
        );
        Ok(())
    }

    /// Load the exam from `provider` and start it.
    ///
    /// A failed load leaves the session in `Created`, so this may be retried.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::Load` if the provider fails, plus everything
    /// `start` can return.
    pub async fn load_and_start(
        &self,
        provider: &dyn QuestionProvider,
        exam_id: ExamId,
    ) -> Result<(), ExamSessionError> {
        let state = self.state();
        if state != SessionState::Created {
            return Err(ExamSessionError::InvalidState {
                operation: "start",
                state,
            });
        }
        let question_set = provider
            .load_exam(exam_id)
            .await
            .map_err(ExamSessionError::Load)?;
        self.start(question_set)
    }

    /// Record `value` as the answer to `question_id`, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::InvalidState` unless the session is `Active`,
    /// `ExamSessionError::Expired` once the deadline has passed, and
    /// `ExamSessionError::UnknownQuestion` for ids outside the exam. The ledger
    /// is unchanged in every error case.
    pub fn record_answer(
        &self,
        question_id: QuestionId,
        value: impl Into<String>,
    ) -> Result<(), ExamSessionError> {
        let mut core = self.lock_accepting("record an answer")?;
        core.ledger.set(question_id, value)?;
        Ok(())
    }

    /// Record the text of choice `label` as the answer to `question_id`.
    ///
    /// # Errors
    ///
    /// Same as `record_answer`, plus `ExamSessionError::UnknownChoice` if the
    /// question has no such choice.
    pub fn record_choice(
        &self,
        question_id: QuestionId,
        label: ChoiceLabel,
    ) -> Result<(), ExamSessionError> {
        let mut core = self.lock_accepting("record an answer")?;
        let text = {
            let question = core
                .exam
                .as_ref()
                .and_then(|exam| exam.question_set.question(question_id))
                .ok_or(LedgerError::UnknownQuestion(question_id))?;
            question
                .choice(label)
                .ok_or(ExamSessionError::UnknownChoice { question_id, label })?
                .text
                .clone()
        };
        core.ledger.set(question_id, text)?;
        Ok(())
    }

    fn lock_accepting(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, SessionCore>, ExamSessionError> {
        let core = self.shared.lock();
        if !core.state.accepts_answers() {
            return Err(ExamSessionError::InvalidState {
                operation,
                state: core.state,
            });
        }
        if core.is_past_deadline(self.shared.clock.now()) {
            return Err(ExamSessionError::Expired);
        }
        Ok(core)
    }

    /// Submit on the user's request.
    ///
    /// Allowed from `Active`, and from `Failed` to retry a previous attempt.
    /// Returns `SubmitOutcome::Skipped` if another trigger already claimed the
    /// submission.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::InvalidState` before `start` or after
    /// abandonment, `ExamSessionError::Submission` if the backend call fails
    /// (the session is then `Failed` with its answers intact).
    pub async fn request_submit(&self) -> Result<SubmitOutcome, ExamSessionError> {
        self.shared
            .coordinator
            .submit(&self.shared, SubmitReason::Manual)
            .await
    }

    /// Submit because time ran out. Invoked by the countdown.
    ///
    /// Does nothing unless the session is `Active`.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::Submission` if the backend call fails.
    pub async fn on_expiry(&self) -> Result<SubmitOutcome, ExamSessionError> {
        self.shared
            .coordinator
            .submit(&self.shared, SubmitReason::Timeout)
            .await
    }

    /// Return a `Failed` session to `Active` so answers can be changed before
    /// retrying.
    ///
    /// # Errors
    ///
    /// Returns `ExamSessionError::InvalidState` unless the session is `Failed`,
    /// `ExamSessionError::Expired` if the deadline has passed.
    pub fn resume(&self) -> Result<(), ExamSessionError> {
        let mut core = self.shared.lock();
        if core.state != SessionState::Failed {
            return Err(ExamSessionError::InvalidState {
                operation: "resume",
                state: core.state,
            });
        }
        if core.is_past_deadline(self.shared.clock.now()) {
            return Err(ExamSessionError::Expired);
        }
        core.state = SessionState::Active;
        self.shared.publish_state(core.state);
        debug!(session_id = %self.shared.id, "exam session resumed after failed submission");
        Ok(())
    }

    /// Stop the countdown and discard the session. No-op once terminal.
    pub fn abandon(&self) {
        let mut core = self.shared.lock();
        if core.state.is_terminal() {
            return;
        }
        let previous = core.state;
        core.stop_countdown();
        core.state = SessionState::Abandoned;
        self.shared.publish_state(core.state);
        info!(session_id = %self.shared.id, %previous, "exam session abandoned");
    }

    //
    // ─── READ-ONLY VIEWS ───────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    #[must_use]
    pub fn question_set(&self) -> Option<Arc<QuestionSet>> {
        self.shared
            .lock()
            .exam
            .as_ref()
            .map(|exam| Arc::clone(&exam.question_set))
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().exam.as_ref().map(|exam| exam.started_at)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.shared
            .lock()
            .exam
            .as_ref()
            .map(|exam| exam.countdown.deadline())
    }

    /// Time left before the deadline, computed from the clock now.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.shared.clock.now();
        self.shared
            .lock()
            .exam
            .as_ref()
            .map(|exam| exam.countdown.remaining_at(now))
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.shared.lock().ledger.len()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let core = self.shared.lock();
        let total = core
            .exam
            .as_ref()
            .map_or(0, |exam| exam.question_set.total_questions());
        SessionProgress::new(total, core.ledger.len())
    }

    #[must_use]
    pub fn answer_for(&self, question_id: QuestionId) -> Option<String> {
        self.shared
            .lock()
            .ledger
            .get(question_id)
            .map(|answer| answer.chosen_value.clone())
    }

    /// Graded result, present once the session is `Completed`.
    #[must_use]
    pub fn submission_result(&self) -> Option<SubmissionResult> {
        self.shared.lock().result.clone()
    }

    /// Message of the most recent failed submission, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Remaining time as of the latest countdown tick.
    #[must_use]
    pub fn subscribe_remaining(&self) -> watch::Receiver<Duration> {
        self.shared.remaining_tx.subscribe()
    }

    /// Wait until the session is `Completed`, `Failed` or `Abandoned`.
    pub async fn wait_settled(&self) -> SessionState {
        let mut rx = self.subscribe_state();
        match rx.wait_for(|state| state.is_settled()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("ExamSession")
            .field("id", &self.shared.id)
            .field("state", &core.state)
            .field("exam_id", &core.exam.as_ref().map(|e| e.question_set.exam_id()))
            .field("answered", &core.ledger.len())
            .field("has_result", &core.result.is_some())
            .finish_non_exhaustive()
    }
}
