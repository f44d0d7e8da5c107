use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerRecord, GroupId, GroupMembership, LearnerId, Question, QuestionId, ScheduleSettings,
};
use quiz_core::sampling::sample_weighted_indices;
use quiz_core::weighting::{CandidateHistory, candidate_weight, fill_undefined, normalize};
use storage::repository::{AnswerLedger, LearnerDirectory, QuestionStore};

use crate::error::SelectionError;
use crate::rng::SharedRng;

/// One entry of a selection batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    /// A pending record that is already due.
    Planned(AnswerRecord),
    /// A sampled question with no pending record yet.
    Fresh(Question),
}

impl BatchItem {
    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        match self {
            BatchItem::Planned(record) => record.question_id,
            BatchItem::Fresh(question) => question.id(),
        }
    }
}

/// Picks the next questions for a learner: due items first, then a weighted
/// sample of the remaining questions in their groups.
#[derive(Clone)]
pub struct SelectionEngine {
    questions: Arc<dyn QuestionStore>,
    ledger: Arc<dyn AnswerLedger>,
    learners: Arc<dyn LearnerDirectory>,
    rng: SharedRng,
}

impl SelectionEngine {
    #[must_use]
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        ledger: Arc<dyn AnswerLedger>,
        learners: Arc<dyn LearnerDirectory>,
        rng: SharedRng,
    ) -> Self {
        Self {
            questions,
            ledger,
            learners,
            rng,
        }
    }

    /// Up to `count` items for `learner` as of `now`, planned items first.
    ///
    /// # Errors
    ///
    /// Returns `SelectionError` on storage failures.
    pub async fn next_batch(
        &self,
        learner: LearnerId,
        count: usize,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<Vec<BatchItem>, SelectionError> {
        let planned = self.ledger.find_due(learner, now).await?;
        if planned.len() >= count {
            return Ok(planned
                .into_iter()
                .take(count)
                .map(BatchItem::Planned)
                .collect());
        }

        let memberships = self.learners.get_group_memberships(learner).await?;
        let groups: Vec<GroupId> = memberships.iter().map(|m| m.group_id).collect();
        let excluded: Vec<QuestionId> = planned.iter().map(|r| r.question_id).collect();
        let candidates = self
            .questions
            .list_questions_for_groups(&groups, &excluded)
            .await?;

        let mut batch: Vec<BatchItem> = planned.into_iter().map(BatchItem::Planned).collect();
        if candidates.is_empty() {
            return Ok(batch);
        }

        let history = self.ledger.history_for_learner(learner).await?;
        let weights = score_candidates(&candidates, &memberships, &history, settings, now);
        let amount = (count - batch.len()).min(candidates.len());
        let picks = self
            .rng
            .with(|rng| sample_weighted_indices(&weights, amount, rng));

        let mut slots: Vec<Option<Question>> = candidates.into_iter().map(Some).collect();
        for index in picks {
            if let Some(question) = slots.get_mut(index).and_then(Option::take) {
                batch.push(BatchItem::Fresh(question));
            }
        }

        tracing::debug!(
            learner_id = %learner,
            requested = count,
            returned = batch.len(),
            "selection batch built"
        );
        Ok(batch)
    }
}

/// Normalized sampling weights, one per candidate.
fn score_candidates(
    candidates: &[Question],
    memberships: &[GroupMembership],
    history: &[AnswerRecord],
    settings: &ScheduleSettings,
    now: DateTime<Utc>,
) -> Vec<f64> {
    let mut by_question: HashMap<QuestionId, Vec<&AnswerRecord>> = HashMap::new();
    for record in history {
        by_question.entry(record.question_id).or_default().push(record);
    }

    let raw: Vec<Option<f64>> = candidates
        .iter()
        .map(|question| {
            let records = by_question
                .get(&question.id())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let summary = CandidateHistory::from_records(question, records.iter().copied());
            candidate_weight(
                &summary,
                target_level(question, memberships),
                question.level(),
                now,
                settings.review_period(),
            )
        })
        .collect();

    normalize(&fill_undefined(&raw))
}

/// Highest target level among the learner's groups that contain `question`.
fn target_level(question: &Question, memberships: &[GroupMembership]) -> u32 {
    memberships
        .iter()
        .filter(|m| question.belongs_to(m.group_id))
        .map(|m| m.target_level)
        .max()
        .unwrap_or_else(|| question.level())
}
