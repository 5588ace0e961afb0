use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio::sync::Semaphore;

use exam_core::model::{
    Choice, ChoiceLabel, ExamId, Question, QuestionId, QuestionSet, SessionState,
    SubmissionResult, SubmitReason,
};
use exam_core::time::fixed_now;
use services::{
    Clock, ExamApiError, ExamLoopService, ExamSession, ExamSessionError, QuestionProvider,
    SessionConfig, SubmissionPayload, SubmissionService, SubmitOutcome,
};

//
// ─── FAKES ─────────────────────────────────────────────────────────────────────
//

fn question_set(duration_secs: u64) -> QuestionSet {
    let questions = (1..=3)
        .map(|id| {
            Question::new(
                QuestionId::new(id),
                format!("Question {id}"),
                vec![
                    Choice::new(ChoiceLabel::A, format!("{id}-a")),
                    Choice::new(ChoiceLabel::B, format!("{id}-b")),
                    Choice::new(ChoiceLabel::C, format!("{id}-c")),
                ],
            )
            .unwrap()
        })
        .collect();
    QuestionSet::new(
        ExamId::new(7),
        "Data Structures",
        questions,
        Duration::from_secs(duration_secs),
    )
    .unwrap()
}

struct FakeProvider {
    failures_left: AtomicUsize,
    duration_secs: u64,
}

impl FakeProvider {
    fn new(failures: usize, duration_secs: u64) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            duration_secs,
        }
    }
}

#[async_trait]
impl QuestionProvider for FakeProvider {
    async fn load_exam(&self, exam_id: ExamId) -> Result<QuestionSet, ExamApiError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExamApiError::Rejected("backend unavailable".into()));
        }
        assert_eq!(exam_id, ExamId::new(7));
        Ok(question_set(self.duration_secs))
    }
}

#[derive(Default)]
struct RecordingSubmissions {
    payloads: Mutex<Vec<SubmissionPayload>>,
    failures_left: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    finished: AtomicUsize,
}

impl RecordingSubmissions {
    fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn payloads(&self) -> Vec<SubmissionPayload> {
        self.payloads.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionService for RecordingSubmissions {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmissionResult, ExamApiError> {
        self.payloads.lock().unwrap().push(payload.clone());
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExamApiError::Rejected("network error".into()));
        }
        let correct = u32::try_from(payload.answers.len()).unwrap();
        Ok(SubmissionResult {
            score: f64::from(correct) / 3.0 * 100.0,
            total_correct: correct,
            total_questions: 3,
            exam_name: "Data Structures".into(),
        })
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig::default().with_tick_interval(Duration::from_millis(5))
}

fn loop_service(
    clock: &Clock,
    provider: FakeProvider,
    submissions: &Arc<RecordingSubmissions>,
    config: SessionConfig,
) -> ExamLoopService {
    let submissions: Arc<dyn SubmissionService> = submissions.clone();
    ExamLoopService::new(clock.clone(), Arc::new(provider), submissions).with_config(config)
}

async fn settle(session: &ExamSession) -> SessionState {
    tokio::time::timeout(Duration::from_secs(5), session.wait_settled())
        .await
        .expect("session should settle")
}

async fn wait_for_calls(submissions: &RecordingSubmissions, calls: usize) {
    for _ in 0..500 {
        if submissions.calls() >= calls {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("expected {calls} submission calls");
}

//
// ─── SCENARIOS ─────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn manual_submit_sends_recorded_answers_once() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());

    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.deadline(), Some(fixed_now() + ChronoDuration::seconds(60)));

    session.record_answer(QuestionId::new(1), "1-a").unwrap();
    session.record_choice(QuestionId::new(2), ChoiceLabel::C).unwrap();
    clock.advance(ChronoDuration::seconds(10));

    let outcome = session.request_submit().await.unwrap();

    let SubmitOutcome::Submitted(result) = outcome else {
        panic!("manual submit should reach the backend");
    };
    assert_eq!(result.total_correct, 2);
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.submission_result(), Some(result));

    let payloads = submissions.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].exam_id, ExamId::new(7));
    assert_eq!(payloads[0].started_at, fixed_now());
    let answers: Vec<_> = payloads[0]
        .answers
        .iter()
        .map(|a| (a.question_id.value(), a.chosen_value.as_str()))
        .collect();
    assert_eq!(answers, vec![(1, "1-a"), (2, "2-c")]);
}

#[tokio::test]
async fn deadline_auto_submits_empty_answers() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    let mut states = session.subscribe_state();

    for step_ms in [7_000, 13_500, 39_400] {
        clock.advance(ChronoDuration::milliseconds(step_ms));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.state(), SessionState::Active);
    }
    assert_eq!(submissions.calls(), 0);

    clock.advance(ChronoDuration::milliseconds(100));
    let submitting = tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| !matches!(s, SessionState::Active)),
    )
    .await
    .unwrap()
    .map(|s| *s)
    .unwrap();
    assert!(matches!(
        submitting,
        SessionState::Submitting(SubmitReason::Timeout) | SessionState::Completed
    ));

    assert_eq!(settle(&session).await, SessionState::Completed);
    let payloads = submissions.payloads();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].answers.is_empty());
    assert_eq!(session.remaining(), Some(Duration::ZERO));
}

#[tokio::test]
async fn overshooting_ticks_still_submit_once() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(3), "3-b").unwrap();

    clock.advance(ChronoDuration::minutes(30));

    assert_eq!(settle(&session).await, SessionState::Completed);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(submissions.calls(), 1);
    assert_eq!(submissions.payloads()[0].answers.len(), 1);
}

#[tokio::test]
async fn failed_submission_keeps_answers_and_retry_submits_again() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::failing(1));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(1), "1-b").unwrap();

    let err = session.request_submit().await.unwrap_err();

    assert!(matches!(err, ExamSessionError::Submission(_)));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.answered_count(), 1);
    assert!(session.submission_result().is_none());
    assert!(session.last_error().unwrap().contains("network error"));

    let retried = session.request_submit().await.unwrap();

    assert!(matches!(retried, SubmitOutcome::Submitted(_)));
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(submissions.calls(), 2);
    assert_eq!(session.last_error(), None);
}

#[tokio::test]
async fn resume_after_failure_accepts_more_answers() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::failing(1));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(1), "1-a").unwrap();

    let _ = session.request_submit().await.unwrap_err();
    assert!(session.record_answer(QuestionId::new(2), "2-a").unwrap_err().is_invalid_state());

    session.resume().unwrap();
    session.record_answer(QuestionId::new(2), "2-a").unwrap();
    let _ = session.request_submit().await.unwrap();

    let payloads = submissions.payloads();
    assert_eq!(payloads[0].answers.len(), 1);
    assert_eq!(payloads[1].answers.len(), 2);
}

#[tokio::test]
async fn resume_after_deadline_is_rejected() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::failing(1));
    let config = SessionConfig::default().with_tick_interval(Duration::from_secs(3600));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, config);
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    let _ = session.request_submit().await.unwrap_err();
    clock.advance(ChronoDuration::seconds(61));

    assert!(matches!(session.resume(), Err(ExamSessionError::Expired)));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_manual_and_timeout_triggers_submit_once() {
    for _ in 0..50 {
        let clock = Clock::manual(fixed_now());
        let submissions = Arc::new(RecordingSubmissions::default());
        let config = SessionConfig::default().with_tick_interval(Duration::from_secs(3600));
        let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, config);
        let session = svc.start_exam(ExamId::new(7)).await.unwrap();

        let manual = tokio::spawn({
            let session = session.clone();
            async move { session.request_submit().await }
        });
        let timeout = tokio::spawn({
            let session = session.clone();
            async move { session.on_expiry().await }
        });
        let outcomes = [
            manual.await.unwrap().unwrap(),
            timeout.await.unwrap().unwrap(),
        ];

        let submitted = outcomes
            .iter()
            .filter(|o| matches!(o, SubmitOutcome::Submitted(_)))
            .count();
        assert_eq!(submitted, 1);
        assert_eq!(submissions.calls(), 1);
        assert_eq!(session.state(), SessionState::Completed);
    }
}

#[tokio::test]
async fn expiry_during_inflight_manual_submit_is_absorbed() {
    let clock = Clock::manual(fixed_now());
    let gate = Arc::new(Semaphore::new(0));
    let submissions = Arc::new(RecordingSubmissions::gated(Arc::clone(&gate)));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(1), "1-a").unwrap();

    let manual = tokio::spawn({
        let session = session.clone();
        async move { session.request_submit().await }
    });
    wait_for_calls(&submissions, 1).await;
    assert_eq!(session.state(), SessionState::Submitting(SubmitReason::Manual));

    // Recorded after the claim: rejected, and absent from the payload.
    assert!(session.record_answer(QuestionId::new(2), "2-a").unwrap_err().is_invalid_state());
    let expiry = session.on_expiry().await.unwrap();
    assert_eq!(
        expiry,
        SubmitOutcome::Skipped(SessionState::Submitting(SubmitReason::Manual))
    );

    gate.add_permits(1);
    let manual = manual.await.unwrap().unwrap();

    assert!(matches!(manual, SubmitOutcome::Submitted(_)));
    assert_eq!(submissions.calls(), 1);
    assert_eq!(submissions.payloads()[0].answers.len(), 1);
}

#[tokio::test]
async fn cancelled_submit_wait_still_fails_over_to_retry() {
    let clock = Clock::manual(fixed_now());
    let gate = Arc::new(Semaphore::new(0));
    let submissions = Arc::new(RecordingSubmissions {
        failures_left: AtomicUsize::new(1),
        ..RecordingSubmissions::gated(Arc::clone(&gate))
    });
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(1), "1-a").unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(50), session.request_submit()).await;
    assert!(waited.is_err());
    assert_eq!(session.state(), SessionState::Submitting(SubmitReason::Manual));

    gate.add_permits(1);
    assert_eq!(settle(&session).await, SessionState::Failed);
    assert!(session.last_error().unwrap().contains("network error"));
    assert_eq!(session.answered_count(), 1);

    let retried = session.request_submit().await.unwrap();

    assert!(matches!(retried, SubmitOutcome::Submitted(_)));
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(submissions.calls(), 2);
}

#[tokio::test]
async fn cancelled_submit_wait_still_delivers_the_result() {
    let clock = Clock::manual(fixed_now());
    let gate = Arc::new(Semaphore::new(0));
    let submissions = Arc::new(RecordingSubmissions::gated(Arc::clone(&gate)));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(2), "2-b").unwrap();

    let waited = tokio::time::timeout(Duration::from_millis(50), session.request_submit()).await;
    assert!(waited.is_err());

    gate.add_permits(1);
    assert_eq!(settle(&session).await, SessionState::Completed);
    assert_eq!(session.submission_result().map(|r| r.total_correct), Some(1));
    assert_eq!(
        session.on_expiry().await.unwrap(),
        SubmitOutcome::Skipped(SessionState::Completed)
    );
    assert_eq!(submissions.calls(), 1);
}

#[tokio::test]
async fn abandon_during_timeout_submit_lets_the_call_finish() {
    let mut clock = Clock::manual(fixed_now());
    let gate = Arc::new(Semaphore::new(0));
    let submissions = Arc::new(RecordingSubmissions::gated(Arc::clone(&gate)));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    clock.advance(ChronoDuration::seconds(61));
    wait_for_calls(&submissions, 1).await;
    assert_eq!(session.state(), SessionState::Submitting(SubmitReason::Timeout));

    session.abandon();
    gate.add_permits(1);
    for _ in 0..500 {
        if submissions.finished() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    assert_eq!(submissions.finished(), 1);
    assert_eq!(session.state(), SessionState::Abandoned);
    assert!(session.submission_result().is_none());
}

#[tokio::test]
async fn repeated_expiry_leaves_active_once() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    let first = session.on_expiry().await.unwrap();
    let second = session.on_expiry().await.unwrap();

    assert!(matches!(first, SubmitOutcome::Submitted(_)));
    assert_eq!(second, SubmitOutcome::Skipped(SessionState::Completed));
    assert_eq!(submissions.calls(), 1);
}

#[tokio::test]
async fn answers_after_completion_are_rejected() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();
    session.record_answer(QuestionId::new(1), "1-a").unwrap();
    let _ = session.request_submit().await.unwrap();

    let err = session.record_answer(QuestionId::new(1), "1-c").unwrap_err();

    assert!(matches!(
        err,
        ExamSessionError::InvalidState {
            state: SessionState::Completed,
            ..
        }
    ));
    assert_eq!(session.answer_for(QuestionId::new(1)).as_deref(), Some("1-a"));
    assert_eq!(session.answered_count(), 1);
}

#[tokio::test]
async fn answers_past_deadline_are_rejected_before_the_tick() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let config = SessionConfig::default().with_tick_interval(Duration::from_secs(3600));
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, config);
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    clock.advance(ChronoDuration::seconds(60));

    let err = session.record_answer(QuestionId::new(1), "1-a").unwrap_err();
    assert!(matches!(err, ExamSessionError::Expired));
    assert!(err.is_invalid_state());
    assert_eq!(session.answered_count(), 0);
}

#[tokio::test]
async fn overwrite_and_unknown_question() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    session.record_answer(QuestionId::new(1), "1-a").unwrap();
    session.record_answer(QuestionId::new(1), "1-b").unwrap();
    session.record_choice(QuestionId::new(1), ChoiceLabel::C).unwrap();
    let unknown = session.record_answer(QuestionId::new(99), "x").unwrap_err();
    let bad_choice = session
        .record_choice(QuestionId::new(2), ChoiceLabel::D)
        .unwrap_err();

    assert!(matches!(unknown, ExamSessionError::UnknownQuestion(_)));
    assert!(matches!(bad_choice, ExamSessionError::UnknownChoice { .. }));
    assert_eq!(session.answer_for(QuestionId::new(1)).as_deref(), Some("1-c"));
    let progress = session.progress();
    assert_eq!((progress.total, progress.answered, progress.unanswered), (3, 1, 2));
}

#[tokio::test]
async fn start_twice_is_invalid() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    let err = session.start(question_set(60)).unwrap_err();

    assert!(matches!(
        err,
        ExamSessionError::InvalidState {
            operation: "start",
            state: SessionState::Active
        }
    ));
}

#[tokio::test]
async fn load_failure_stays_created_and_can_retry() {
    let clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(1, 60), &submissions, fast_config());
    let session = svc.new_session();

    let err = svc.start(&session, ExamId::new(7)).await.unwrap_err();
    assert!(matches!(err, ExamSessionError::Load(_)));
    assert_eq!(session.state(), SessionState::Created);
    assert!(session.request_submit().await.unwrap_err().is_invalid_state());

    svc.start(&session, ExamId::new(7)).await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(*session.subscribe_remaining().borrow(), Duration::from_secs(60));
}

#[tokio::test]
async fn abandoned_session_never_auto_submits() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    session.abandon();
    clock.advance(ChronoDuration::seconds(120));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.state(), SessionState::Abandoned);
    assert_eq!(submissions.calls(), 0);
    assert!(session.request_submit().await.unwrap_err().is_invalid_state());
}

#[tokio::test]
async fn dropped_session_never_auto_submits() {
    let mut clock = Clock::manual(fixed_now());
    let submissions = Arc::new(RecordingSubmissions::default());
    let svc = loop_service(&clock, FakeProvider::new(0, 60), &submissions, fast_config());
    let session = svc.start_exam(ExamId::new(7)).await.unwrap();

    drop(session);
    clock.advance(ChronoDuration::seconds(120));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(submissions.calls(), 0);
}
