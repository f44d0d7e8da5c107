use std::sync::Arc;

use chrono::Duration;
use quiz_core::model::{AnswerRecord, LearnerId, Question};
use storage::repository::{AnswerLedger, QuestionStore};

use super::session::QuizSession;
use crate::Clock;
use crate::error::SessionError;
use crate::selection::SelectionEngine;
use crate::settings_service::SettingsService;

/// A question handed to the learner together with the record it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPrompt {
    pub record: AnswerRecord,
    pub question: Question,
}

/// Result of answering a single prompt in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub record: AnswerRecord,
    pub is_correct: bool,
}

/// Orchestrates session start, prompting and persisted answering.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    selection: Arc<SelectionEngine>,
    questions: Arc<dyn QuestionStore>,
    ledger: Arc<dyn AnswerLedger>,
    settings: Arc<SettingsService>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        selection: Arc<SelectionEngine>,
        questions: Arc<dyn QuestionStore>,
        ledger: Arc<dyn AnswerLedger>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            clock,
            selection,
            questions,
            ledger,
            settings,
        }
    }

    /// Start a session for `learner` from a fresh selection batch.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for invalid limits or selection failures.
    pub async fn start_session(
        &self,
        learner: LearnerId,
        max_time: Duration,
        max_count: usize,
    ) -> Result<QuizSession, SessionError> {
        if max_count == 0 {
            return Err(SessionError::InvalidMaxCount);
        }
        let now = self.clock.now();
        let settings = self.settings.current();
        let batch = self
            .selection
            .next_batch(learner, max_count, &settings, now)
            .await?;
        tracing::info!(
            learner_id = %learner,
            items = batch.len(),
            max_secs = max_time.num_seconds(),
            "session started"
        );
        QuizSession::new(learner, batch, now, max_time, max_count)
    }

    /// Next prompt of the session, or `None` when it is over.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the record or question cannot be loaded.
    pub async fn next_question(
        &self,
        session: &mut QuizSession,
    ) -> Result<Option<SessionPrompt>, SessionError> {
        let now = self.clock.now();
        let Some(record) = session.next_at(self.ledger.as_ref(), now).await? else {
            return Ok(None);
        };
        let question = self.questions.get_question(record.question_id).await?;
        Ok(Some(SessionPrompt { record, question }))
    }

    /// Persist the learner's answer to a prompt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the record is unknown, already
    /// answered, or persistence fails.
    pub async fn submit_answer(
        &self,
        prompt: &SessionPrompt,
        answer: &str,
    ) -> Result<AnswerOutcome, SessionError> {
        let answered_at = self.clock.now();
        self.ledger
            .record_answer(prompt.record.id, answer, answered_at)
            .await?;
        let record = self.ledger.get_record(prompt.record.id).await?;
        let is_correct = prompt.question.is_correct(Some(answer));
        tracing::debug!(
            learner_id = %record.learner_id,
            question_id = %record.question_id,
            is_correct,
            "session answer recorded"
        );
        Ok(AnswerOutcome { record, is_correct })
    }
}
