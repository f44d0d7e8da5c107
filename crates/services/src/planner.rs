use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerRecord, AnswerState, GroupId, LearnerId, Question, QuestionId, ScheduleSettings,
};
use quiz_core::sampling::half_normal_level;
use rand::Rng;
use storage::repository::{AnswerLedger, LearnerDirectory, QuestionStore, StorageError};

use crate::error::PlannerError;
use crate::mastery_service::MasteryEstimator;
use crate::pending::ensure_pending;
use crate::rng::SharedRng;

/// Schedules repetitions of correctly answered questions and introduces new
/// ones when nothing is due.
#[derive(Clone)]
pub struct RepetitionPlanner {
    questions: Arc<dyn QuestionStore>,
    ledger: Arc<dyn AnswerLedger>,
    learners: Arc<dyn LearnerDirectory>,
    mastery: MasteryEstimator,
    rng: SharedRng,
}

impl RepetitionPlanner {
    #[must_use]
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        ledger: Arc<dyn AnswerLedger>,
        learners: Arc<dyn LearnerDirectory>,
        rng: SharedRng,
    ) -> Self {
        let mastery = MasteryEstimator::new(
            Arc::clone(&questions),
            Arc::clone(&ledger),
            Arc::clone(&learners),
        );
        Self {
            questions,
            ledger,
            learners,
            mastery,
            rng,
        }
    }

    /// Plan the next repetition of every correctly answered question that has
    /// none pending, then return the pending records due at `now`, oldest first.
    ///
    /// The gap is measured from the scheduled time of the latest correct
    /// answer, not from when it was given. Questions answered correctly
    /// `repetition_cap` times are mastered and get no further repetitions.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError::Storage` on storage failures.
    pub async fn due_now(
        &self,
        learner: LearnerId,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnswerRecord>, PlannerError> {
        let history = self.ledger.history_for_learner(learner).await?;
        let questions = self.mastery.answered_questions(&history).await?;

        let already_planned: BTreeSet<QuestionId> = history
            .iter()
            .filter(|r| r.is_pending())
            .map(|r| r.question_id)
            .collect();

        // Count of correct answers and latest scheduled time among them, per question.
        let mut correct: BTreeMap<QuestionId, (u32, DateTime<Utc>)> = BTreeMap::new();
        for record in &history {
            if record.state != AnswerState::Answered
                || already_planned.contains(&record.question_id)
            {
                continue;
            }
            let Some(question) = questions.get(&record.question_id) else {
                continue;
            };
            if !record.is_correct_for(question) {
                continue;
            }
            correct
                .entry(record.question_id)
                .and_modify(|(count, latest)| {
                    *count = count.saturating_add(1);
                    *latest = (*latest).max(record.scheduled_at);
                })
                .or_insert((1, record.scheduled_at));
        }

        let mut due: Vec<AnswerRecord> = history.into_iter().filter(|r| r.is_due(now)).collect();

        for (question, (length, anchor)) in correct {
            if length >= settings.repetition_cap() {
                continue;
            }
            let scheduled_at = anchor
                .checked_add_signed(settings.distribution().interval(length))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);

            match self
                .ledger
                .insert_pending(question, learner, scheduled_at)
                .await
            {
                Ok(id) => {
                    tracing::debug!(
                        learner_id = %learner,
                        question_id = %question,
                        repetition = length,
                        %scheduled_at,
                        "repetition planned"
                    );
                    let record = AnswerRecord::pending(id, question, learner, scheduled_at);
                    if record.is_due(now) {
                        due.push(record);
                    }
                }
                Err(StorageError::Conflict) => {
                    tracing::debug!(
                        learner_id = %learner,
                        question_id = %question,
                        "repetition already pending"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        due.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        Ok(due)
    }

    /// Pick a new question for a learner with nothing due and record it as
    /// pending at `now`.
    ///
    /// Groups are visited by largest mastery deficit. In each, a level is drawn
    /// around the learner's mastery and the first group with questions at that
    /// level wins. Otherwise any question from the learner's groups qualifies.
    /// Questions scheduled within the trailing lookback window are avoided
    /// unless nothing else remains.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError::NoEligibleQuestions` when the learner's groups
    /// hold no questions, or `PlannerError::Storage` on storage failures.
    pub async fn fresh_question(
        &self,
        learner: LearnerId,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<AnswerRecord, PlannerError> {
        let memberships = self.learners.get_group_memberships(learner).await?;
        let history = self.ledger.history_for_learner(learner).await?;
        let snapshot = self.mastery.snapshot_from(&memberships, &history).await?;

        let mut pool: Vec<Question> = Vec::new();
        for (group, deficit) in snapshot.by_deficit(&memberships) {
            let mastery = snapshot.level(group);
            let level = self
                .rng
                .with(|rng| half_normal_level(mastery, settings.level_spread(), rng));
            let found = self.questions.list_questions_at_level(group, level).await?;
            tracing::debug!(
                learner_id = %learner,
                group_id = %group,
                deficit,
                level,
                found = found.len(),
                "searched group for a fresh question"
            );
            if !found.is_empty() {
                pool = found;
                break;
            }
        }

        if pool.is_empty() {
            let groups: Vec<GroupId> = memberships.iter().map(|m| m.group_id).collect();
            pool = self.questions.list_questions_for_groups(&groups, &[]).await?;
        }
        if pool.is_empty() {
            return Err(PlannerError::NoEligibleQuestions);
        }

        let cutoff = now
            .checked_sub_signed(settings.lookback())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let recent: HashSet<QuestionId> = history
            .iter()
            .filter(|r| r.scheduled_at > cutoff)
            .map(|r| r.question_id)
            .collect();
        let unseen: Vec<&Question> = pool.iter().filter(|q| !recent.contains(&q.id())).collect();
        let choices: Vec<&Question> = if unseen.is_empty() {
            pool.iter().collect()
        } else {
            unseen
        };

        let index = self.rng.with(|rng| rng.random_range(0..choices.len()));
        let question = choices
            .get(index)
            .map(|q| q.id())
            .ok_or(PlannerError::NoEligibleQuestions)?;

        let record = ensure_pending(self.ledger.as_ref(), question, learner, now).await?;
        tracing::debug!(
            learner_id = %learner,
            question_id = %question,
            "fresh question planned"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::{GroupMembership, Learner, QuestionContent, ScheduleSettingsDraft};
    use quiz_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    async fn setup() -> (InMemoryRepository, RepetitionPlanner) {
        let repo = InMemoryRepository::new();
        repo.upsert_learner(&Learner::new(LearnerId::new(1), "Ada"))
            .await
            .unwrap();
        repo.set_membership(LearnerId::new(1), GroupMembership::new(GroupId::new(1), 2))
            .await
            .unwrap();
        repo.upsert_question(
            &Question::new(
                QuestionId::new(1),
                [GroupId::new(1)],
                1,
                QuestionContent::text_only("Q"),
                "A",
            )
            .unwrap(),
        )
        .await
        .unwrap();
        let planner = RepetitionPlanner::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            SharedRng::seeded(3),
        );
        (repo, planner)
    }

    #[tokio::test]
    async fn repetition_is_measured_from_the_scheduled_time() {
        let (repo, planner) = setup().await;
        let learner = LearnerId::new(1);
        let settings = ScheduleSettingsDraft::recommended().validate().unwrap();
        let now = fixed_now();

        // Asked eight days ago, answered yesterday.
        let id = repo
            .insert_pending(QuestionId::new(1), learner, now - Duration::days(8))
            .await
            .unwrap();
        repo.record_answer(id, "A", now - Duration::days(1))
            .await
            .unwrap();

        let due = planner.due_now(learner, &settings, now).await.unwrap();
        let expected = now - Duration::days(8) + settings.distribution().interval(1);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].scheduled_at, expected);
    }

    #[tokio::test]
    async fn repetition_follows_the_latest_correct_answer() {
        let (repo, planner) = setup().await;
        let learner = LearnerId::new(1);
        let settings = ScheduleSettingsDraft::recommended().validate().unwrap();
        let now = fixed_now();

        for days in [30, 2] {
            let id = repo
                .insert_pending(QuestionId::new(1), learner, now - Duration::days(days))
                .await
                .unwrap();
            repo.record_answer(id, "A", now - Duration::days(days))
                .await
                .unwrap();
        }

        // e^2 days after the second ask, still in the future.
        let due = planner.due_now(learner, &settings, now).await.unwrap();
        assert!(due.is_empty());

        let pending = repo
            .find_pending(learner, QuestionId::new(1))
            .await
            .unwrap()
            .expect("planned");
        let expected = now - Duration::days(2) + settings.distribution().interval(2);
        assert_eq!(pending.scheduled_at, expected);
    }

    #[tokio::test]
    async fn wrong_answers_are_not_repeated() {
        let (repo, planner) = setup().await;
        let learner = LearnerId::new(1);
        let settings = ScheduleSettingsDraft::recommended().validate().unwrap();

        let id = repo
            .insert_pending(QuestionId::new(1), learner, fixed_now())
            .await
            .unwrap();
        repo.record_answer(id, "wrong", fixed_now()).await.unwrap();

        planner
            .due_now(learner, &settings, fixed_now())
            .await
            .unwrap();
        assert!(
            repo.find_pending(learner, QuestionId::new(1))
                .await
                .unwrap()
                .is_none()
        );
    }
}
