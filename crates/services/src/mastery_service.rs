use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use quiz_core::mastery::MasterySnapshot;
use quiz_core::model::{AnswerRecord, GroupMembership, LearnerId, Question, QuestionId};
use storage::repository::{AnswerLedger, LearnerDirectory, QuestionStore, StorageError};

/// Computes per-group proficiency from stored answer history.
#[derive(Clone)]
pub struct MasteryEstimator {
    questions: Arc<dyn QuestionStore>,
    ledger: Arc<dyn AnswerLedger>,
    learners: Arc<dyn LearnerDirectory>,
}

impl MasteryEstimator {
    #[must_use]
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        ledger: Arc<dyn AnswerLedger>,
        learners: Arc<dyn LearnerDirectory>,
    ) -> Self {
        Self {
            questions,
            ledger,
            learners,
        }
    }

    /// Snapshot for every group the learner belongs to.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if memberships, history or questions cannot be read.
    pub async fn snapshot(&self, learner: LearnerId) -> Result<MasterySnapshot, StorageError> {
        let memberships = self.learners.get_group_memberships(learner).await?;
        let history = self.ledger.history_for_learner(learner).await?;
        self.snapshot_from(&memberships, &history).await
    }

    /// Snapshot from memberships and history the caller already loaded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the answered questions cannot be read.
    pub async fn snapshot_from(
        &self,
        memberships: &[GroupMembership],
        history: &[AnswerRecord],
    ) -> Result<MasterySnapshot, StorageError> {
        let questions = self.answered_questions(history).await?;
        Ok(MasterySnapshot::compute(memberships, &questions, history))
    }

    /// Questions behind every record that carries a submitted answer.
    pub(crate) async fn answered_questions(
        &self,
        history: &[AnswerRecord],
    ) -> Result<HashMap<QuestionId, Question>, StorageError> {
        let ids: Vec<QuestionId> = history
            .iter()
            .filter(|r| r.submitted_answer.is_some())
            .map(|r| r.question_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .questions
            .get_questions(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id(), q))
            .collect())
    }
}
