use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use quiz_core::model::{AnswerRecord, LearnerId};
use storage::repository::AnswerLedger;

use crate::error::SessionError;
use crate::pending::ensure_pending;
use crate::selection::BatchItem;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Interactive, time-boxed run through a selection batch.
///
/// Items come out in batch order. Nothing is rescheduled while the session
/// runs; repetitions are planned later by the dispatch loop.
#[derive(Debug, Clone)]
pub struct QuizSession {
    learner: LearnerId,
    items: VecDeque<BatchItem>,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    served: usize,
}

impl QuizSession {
    /// Create a session holding at most `max_count` items that closes at
    /// `started_at + max_time`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidMaxCount` if `max_count` is zero and
    /// `SessionError::InvalidMaxTime` if `max_time` is not positive.
    pub fn new(
        learner: LearnerId,
        mut items: Vec<BatchItem>,
        started_at: DateTime<Utc>,
        max_time: Duration,
        max_count: usize,
    ) -> Result<Self, SessionError> {
        if max_count == 0 {
            return Err(SessionError::InvalidMaxCount);
        }
        if max_time <= Duration::zero() {
            return Err(SessionError::InvalidMaxTime);
        }
        items.truncate(max_count);

        let deadline = started_at
            .checked_add_signed(max_time)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Self {
            learner,
            items: items.into(),
            started_at,
            deadline,
            served: 0,
        })
    }

    #[must_use]
    pub fn learner(&self) -> LearnerId {
        self.learner
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Items not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Items handed out so far.
    #[must_use]
    pub fn served(&self) -> usize {
        self.served
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    #[must_use]
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.items.is_empty() || self.is_expired(now)
    }

    /// Next pending record, or `None` once the batch is exhausted or the
    /// deadline has passed.
    ///
    /// A fresh question gets its pending record here, scheduled at `now`. If
    /// one already exists it is reused.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the pending record cannot be stored.
    /// The item is consumed either way.
    pub async fn next_at(
        &mut self,
        ledger: &dyn AnswerLedger,
        now: DateTime<Utc>,
    ) -> Result<Option<AnswerRecord>, SessionError> {
        if self.is_expired(now) {
            return Ok(None);
        }
        let Some(item) = self.items.pop_front() else {
            return Ok(None);
        };
        self.served += 1;

        let record = match item {
            BatchItem::Planned(record) => record,
            BatchItem::Fresh(question) => {
                ensure_pending(ledger, question.id(), self.learner, now).await?
            }
        };
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{GroupId, Learner, Question, QuestionContent, QuestionId, RecordId};
    use quiz_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, LearnerDirectory, QuestionStore};

    fn question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            [GroupId::new(1)],
            1,
            QuestionContent::text_only(format!("Q{id}")),
            "A",
        )
        .unwrap()
    }

    fn planned(id: u64, question: u64) -> BatchItem {
        BatchItem::Planned(AnswerRecord::pending(
            RecordId::new(id),
            QuestionId::new(question),
            LearnerId::new(1),
            fixed_now(),
        ))
    }

    #[test]
    fn rejects_zero_count_and_non_positive_time() {
        let now = fixed_now();
        let err = QuizSession::new(LearnerId::new(1), Vec::new(), now, Duration::minutes(5), 0)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidMaxCount));

        let err = QuizSession::new(LearnerId::new(1), Vec::new(), now, Duration::zero(), 3)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidMaxTime));
    }

    #[test]
    fn truncates_to_max_count() {
        let items = vec![planned(1, 1), planned(2, 2), planned(3, 3)];
        let session =
            QuizSession::new(LearnerId::new(1), items, fixed_now(), Duration::minutes(5), 2)
                .unwrap();
        assert_eq!(session.remaining(), 2);
        assert_eq!(session.deadline(), fixed_now() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn yields_in_order_until_exhausted() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let items = vec![planned(7, 1), planned(8, 2)];
        let mut session =
            QuizSession::new(LearnerId::new(1), items, now, Duration::minutes(5), 10).unwrap();

        let first = session.next_at(&repo, now).await.unwrap().unwrap();
        let second = session.next_at(&repo, now).await.unwrap().unwrap();
        assert_eq!(first.id, RecordId::new(7));
        assert_eq!(second.id, RecordId::new(8));
        assert!(session.next_at(&repo, now).await.unwrap().is_none());
        assert_eq!(session.served(), 2);
    }

    #[tokio::test]
    async fn returns_none_after_deadline() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let mut session = QuizSession::new(
            LearnerId::new(1),
            vec![planned(1, 1)],
            now,
            Duration::seconds(30),
            5,
        )
        .unwrap();

        let late = now + Duration::seconds(31);
        assert!(session.next_at(&repo, late).await.unwrap().is_none());
        assert_eq!(session.remaining(), 1);
    }

    #[tokio::test]
    async fn fresh_questions_get_a_pending_record() {
        let repo = InMemoryRepository::new();
        repo.upsert_learner(&Learner::new(LearnerId::new(1), "Ada"))
            .await
            .unwrap();
        repo.upsert_question(&question(4)).await.unwrap();
        let now = fixed_now();

        let mut session = QuizSession::new(
            LearnerId::new(1),
            vec![BatchItem::Fresh(question(4))],
            now,
            Duration::minutes(1),
            1,
        )
        .unwrap();
        let record = session.next_at(&repo, now).await.unwrap().unwrap();

        assert!(record.is_pending());
        assert_eq!(record.question_id, QuestionId::new(4));
        assert_eq!(record.scheduled_at, now);
        let stored = repo
            .find_pending(LearnerId::new(1), QuestionId::new(4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, record.id);
    }

    #[tokio::test]
    async fn existing_pending_record_is_reused() {
        let repo = InMemoryRepository::new();
        repo.upsert_learner(&Learner::new(LearnerId::new(1), "Ada"))
            .await
            .unwrap();
        repo.upsert_question(&question(4)).await.unwrap();
        let now = fixed_now();
        let existing = repo
            .insert_pending(QuestionId::new(4), LearnerId::new(1), now - Duration::days(1))
            .await
            .unwrap();

        let mut session = QuizSession::new(
            LearnerId::new(1),
            vec![BatchItem::Fresh(question(4))],
            now,
            Duration::minutes(1),
            1,
        )
        .unwrap();
        let record = session.next_at(&repo, now).await.unwrap().unwrap();
        assert_eq!(record.id, existing);
    }
}
