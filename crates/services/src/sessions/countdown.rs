use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

use exam_core::{Clock, Countdown, CountdownTick};

use super::controller::{ExamSession, SessionShared};

/// Drive `countdown` on `runtime`, publishing remaining time every `tick` and
/// calling `on_expiry` once the deadline passes.
///
/// The task only holds a weak reference to the session and exits as soon as
/// the session is gone or expiry has been handled.
pub(crate) fn spawn_countdown(
    runtime: &Handle,
    session: Weak<SessionShared>,
    countdown: Arc<Countdown>,
    clock: Clock,
    tick: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut interval = time::interval(tick);
        // Late ticks are dropped; remaining time comes from the deadline anyway.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let Some(shared) = session.upgrade() else {
                break;
            };

            match countdown.poll(clock.now()) {
                CountdownTick::Running { remaining } => shared.publish_remaining(remaining),
                CountdownTick::Expired => {
                    shared.publish_remaining(Duration::ZERO);
                    info!(session_id = %shared.id(), deadline = %countdown.deadline(), "exam time is over");
                    let session = ExamSession::from_shared(shared);
                    if let Err(err) = session.on_expiry().await {
                        warn!(session_id = %session.id(), error = %err, "auto-submit failed");
                    }
                    break;
                }
                CountdownTick::Finished => break,
            }
        }
    })
}
