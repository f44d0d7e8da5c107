use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{LearnerId, QuestionId, RecordId};
use crate::model::question::Question;

//
// ─── ANSWER STATE ──────────────────────────────────────────────────────────────
//

/// Lifecycle of a ledger entry.
///
/// `NotAnswered` is a pending item (planned but not delivered), `Transferred`
/// means it reached the learner, `Answered` means a response was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    NotAnswered,
    Transferred,
    Answered,
}

impl AnswerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerState::NotAnswered => "not_answered",
            AnswerState::Transferred => "transferred",
            AnswerState::Answered => "answered",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "not_answered" => Some(Self::NotAnswered),
            "transferred" => Some(Self::Transferred),
            "answered" => Some(Self::Answered),
            _ => None,
        }
    }

    /// Whether a record in this state may move to `next`.
    ///
    /// States only move forward. Skipping `Transferred` is allowed for answers
    /// given inside an interactive session.
    #[must_use]
    pub fn can_advance_to(self, next: AnswerState) -> bool {
        matches!(
            (self, next),
            (AnswerState::NotAnswered, AnswerState::Transferred)
                | (AnswerState::NotAnswered, AnswerState::Answered)
                | (AnswerState::Transferred, AnswerState::Answered)
        )
    }
}

//
// ─── ANSWER RECORD ─────────────────────────────────────────────────────────────
//

/// One scheduled or answered attempt of a learner at a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub id: RecordId,
    pub question_id: QuestionId,
    pub learner_id: LearnerId,
    pub scheduled_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub submitted_answer: Option<String>,
    pub state: AnswerState,
}

impl AnswerRecord {
    /// A freshly inserted pending record.
    #[must_use]
    pub fn pending(
        id: RecordId,
        question_id: QuestionId,
        learner_id: LearnerId,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            question_id,
            learner_id,
            scheduled_at,
            answered_at: None,
            submitted_answer: None,
            state: AnswerState::NotAnswered,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == AnswerState::NotAnswered
    }

    /// Pending and scheduled at or before `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.scheduled_at <= now
    }

    #[must_use]
    pub fn is_correct_for(&self, question: &Question) -> bool {
        question.id() == self.question_id && question.is_correct(self.submitted_answer.as_deref())
    }
}
