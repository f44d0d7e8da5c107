use chrono::{DateTime, Utc};
use quiz_core::model::{AnswerRecord, LearnerId, QuestionId};
use storage::repository::{AnswerLedger, StorageError};

/// Insert a pending record, or adopt the one another writer already created.
pub(crate) async fn ensure_pending(
    ledger: &dyn AnswerLedger,
    question: QuestionId,
    learner: LearnerId,
    scheduled_at: DateTime<Utc>,
) -> Result<AnswerRecord, StorageError> {
    match ledger.insert_pending(question, learner, scheduled_at).await {
        Ok(id) => Ok(AnswerRecord::pending(id, question, learner, scheduled_at)),
        Err(StorageError::Conflict) => {
            tracing::debug!(
                learner_id = %learner,
                question_id = %question,
                "pending record already exists, adopting it"
            );
            ledger
                .find_pending(learner, question)
                .await?
                .ok_or(StorageError::Conflict)
        }
        Err(error) => Err(error),
    }
}
