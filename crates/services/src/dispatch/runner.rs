use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use quiz_core::model::{AnswerState, Learner, LearnerId, QuestionId, ScheduleSettings};
use quiz_core::time::to_local;
use rand::Rng;
use storage::repository::{AnswerLedger, LearnerDirectory, QuestionStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::delivery::DeliveryChannel;
use super::gates::{GateDecision, GateState};
use crate::Clock;
use crate::error::{DeliveryError, DispatchError};
use crate::planner::RepetitionPlanner;
use crate::rng::SharedRng;

const TICK: Duration = Duration::from_secs(1);
const FALLBACK_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of one dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub delivered: Vec<(LearnerId, QuestionId)>,
    pub failed: Vec<LearnerId>,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(GateDecision),
    Dispatched(RoundReport),
}

/// Periodically sends one question to every active learner, gated by the
/// schedule settings.
pub struct DispatchScheduler {
    planner: RepetitionPlanner,
    questions: Arc<dyn QuestionStore>,
    ledger: Arc<dyn AnswerLedger>,
    learners: Arc<dyn LearnerDirectory>,
    delivery: Arc<dyn DeliveryChannel>,
    settings: watch::Receiver<ScheduleSettings>,
    gates: GateState,
    rng: SharedRng,
    clock: Clock,
    utc_offset: FixedOffset,
}

impl DispatchScheduler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        planner: RepetitionPlanner,
        questions: Arc<dyn QuestionStore>,
        ledger: Arc<dyn AnswerLedger>,
        learners: Arc<dyn LearnerDirectory>,
        delivery: Arc<dyn DeliveryChannel>,
        settings: watch::Receiver<ScheduleSettings>,
        rng: SharedRng,
        clock: Clock,
    ) -> Self {
        Self {
            planner,
            questions,
            ledger,
            learners,
            delivery,
            settings,
            gates: GateState::new(),
            rng,
            clock,
            utc_offset: Utc.fix(),
        }
    }

    /// Evaluate time-window and weekday gates at this offset from UTC.
    #[must_use]
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    #[must_use]
    pub fn gates(&self) -> GateState {
        self.gates
    }

    /// Run one tick at `now`.
    ///
    /// Settings are read once at the start of the tick; updates published
    /// during a round apply from the next tick.
    pub async fn tick_at(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let settings = self.settings.borrow_and_update().clone();
        let local = to_local(now, self.utc_offset);

        match self.gates.evaluate(&settings, now, local) {
            GateDecision::Open => {
                let report = self.dispatch_round(&settings, now).await;
                self.gates.record_round(now);
                tracing::info!(
                    delivered = report.delivered.len(),
                    failed = report.failed.len(),
                    "dispatch round finished"
                );
                TickOutcome::Dispatched(report)
            }
            decision => {
                tracing::trace!(?decision, "dispatch tick skipped");
                TickOutcome::Skipped(decision)
            }
        }
    }

    /// Serve every active learner once. Failures are logged per learner and
    /// do not stop the round.
    pub async fn dispatch_round(
        &self,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> RoundReport {
        let mut report = RoundReport::default();

        let learners = match self.learners.list_active_learners().await {
            Ok(learners) => learners,
            Err(error) => {
                tracing::warn!(%error, "failed to list learners for dispatch");
                return report;
            }
        };

        for learner in learners {
            match self.dispatch_to(&learner, settings, now).await {
                Ok(question) => report.delivered.push((learner.id, question)),
                Err(error) => {
                    tracing::warn!(learner_id = %learner.id, %error, "dispatch to learner failed");
                    report.failed.push(learner.id);
                }
            }
        }

        report
    }

    /// Choose, deliver and mark one question for `learner`.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` if planning, delivery or the ledger update
    /// fails. An undelivered record stays pending and comes back as due.
    pub async fn dispatch_to(
        &self,
        learner: &Learner,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<QuestionId, DispatchError> {
        let mut due = self.planner.due_now(learner.id, settings, now).await?;
        let record = if due.is_empty() {
            self.planner
                .fresh_question(learner.id, settings, now)
                .await?
        } else {
            let index = self.rng.with(|rng| rng.random_range(0..due.len()));
            due.swap_remove(index)
        };

        let question = self.questions.get_question(record.question_id).await?;
        let timeout = settings
            .delivery_timeout()
            .to_std()
            .unwrap_or(FALLBACK_DELIVERY_TIMEOUT);

        match tokio::time::timeout(timeout, self.delivery.deliver(learner, &question)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => return Err(error.into()),
            Err(_elapsed) => return Err(DeliveryError::TimedOut(timeout).into()),
        }

        self.ledger
            .mark_state(record.id, AnswerState::Transferred)
            .await?;
        tracing::info!(
            learner_id = %learner.id,
            question_id = %question.id(),
            record_id = %record.id,
            "question delivered"
        );
        Ok(question.id())
    }

    /// Move the scheduler onto its own task, ticking once per second.
    #[must_use]
    pub fn spawn(mut self) -> DispatchHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("dispatch loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = self.clock.now();
                        self.tick_at(now).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("dispatch loop stopped");
                            break;
                        }
                    }
                }
            }
        });

        DispatchHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Control handle for a spawned dispatch loop.
pub struct DispatchHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatchHandle {
    /// Stop the loop after the current tick and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Join` if the loop task panicked.
    pub async fn shutdown(self) -> Result<(), DispatchError> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|error| {
            tracing::error!(%error, "dispatch loop terminated abnormally");
            DispatchError::Join(error.to_string())
        })
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
