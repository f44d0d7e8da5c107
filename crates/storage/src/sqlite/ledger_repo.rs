use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{AnswerRecord, AnswerState, LearnerId, QuestionId, RecordId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_answer_row, parse_state, record_id_from_i64, ser, write_err},
};
use crate::repository::{AnswerLedger, StorageError};

const ANSWER_COLUMNS: &str =
    "id, question_id, learner_id, scheduled_at, answered_at, submitted_answer, state";

fn map_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<AnswerRecord>, StorageError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(map_answer_row(row)?);
    }
    // Timestamps are TEXT columns; order on the parsed values.
    out.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
    Ok(out)
}

impl SqliteRepository {
    /// Apply a checked state transition inside one transaction.
    async fn advance(
        &self,
        record: RecordId,
        next: AnswerState,
        answer: Option<(&str, DateTime<Utc>)>,
    ) -> Result<(), StorageError> {
        let id = id_i64("record_id", record.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query("SELECT state FROM answers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let current = parse_state(&row.try_get::<String, _>("state").map_err(ser)?)?;
        if !current.can_advance_to(next) {
            return Err(StorageError::Conflict);
        }

        match answer {
            Some((text, answered_at)) => {
                sqlx::query(
                    r"
                    UPDATE answers
                    SET state = ?1, submitted_answer = ?2, answered_at = ?3
                    WHERE id = ?4
                    ",
                )
                .bind(next.as_str())
                .bind(text)
                .bind(answered_at)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
            }
            None => {
                sqlx::query("UPDATE answers SET state = ?1 WHERE id = ?2")
                    .bind(next.as_str())
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(write_err)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}

#[async_trait]
impl AnswerLedger for SqliteRepository {
    async fn insert_pending(
        &self,
        question: QuestionId,
        learner: LearnerId,
        scheduled_at: DateTime<Utc>,
    ) -> Result<RecordId, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO answers (question_id, learner_id, scheduled_at, state)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_i64("question_id", question.value())?)
        .bind(id_i64("learner_id", learner.value())?)
        .bind(scheduled_at)
        .bind(AnswerState::NotAnswered.as_str())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        record_id_from_i64(res.last_insert_rowid())
    }

    async fn find_due(
        &self,
        learner: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE learner_id = ?1 AND state = ?2"
        );
        let rows = sqlx::query(sql.as_str())
            .bind(id_i64("learner_id", learner.value())?)
            .bind(AnswerState::NotAnswered.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut due = map_rows(&rows)?;
        due.retain(|r| r.scheduled_at <= now);
        Ok(due)
    }

    async fn find_history(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE learner_id = ?1 AND question_id = ?2"
        );
        let rows = sqlx::query(sql.as_str())
            .bind(id_i64("learner_id", learner.value())?)
            .bind(id_i64("question_id", question.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        map_rows(&rows)
    }

    async fn history_for_learner(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<AnswerRecord>, StorageError> {
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE learner_id = ?1");
        let rows = sqlx::query(sql.as_str())
            .bind(id_i64("learner_id", learner.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        map_rows(&rows)
    }

    async fn find_pending(
        &self,
        learner: LearnerId,
        question: QuestionId,
    ) -> Result<Option<AnswerRecord>, StorageError> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers
             WHERE learner_id = ?1 AND question_id = ?2 AND state = ?3"
        );
        let row = sqlx::query(sql.as_str())
            .bind(id_i64("learner_id", learner.value())?)
            .bind(id_i64("question_id", question.value())?)
            .bind(AnswerState::NotAnswered.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_answer_row).transpose()
    }

    async fn get_record(&self, id: RecordId) -> Result<AnswerRecord, StorageError> {
        let sql = format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE id = ?1");
        let row = sqlx::query(sql.as_str())
            .bind(id_i64("record_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_answer_row(&row)
    }

    async fn mark_state(&self, record: RecordId, state: AnswerState) -> Result<(), StorageError> {
        self.advance(record, state, None).await
    }

    async fn record_answer(
        &self,
        record: RecordId,
        answer: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.advance(record, AnswerState::Answered, Some((answer, answered_at)))
            .await
    }
}
