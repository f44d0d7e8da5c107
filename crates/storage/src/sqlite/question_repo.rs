use std::collections::BTreeMap;

use async_trait::async_trait;
use quiz_core::model::{GroupId, Question, QuestionId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{
    SqliteRepository,
    mapping::{conn, group_id_from_i64, id_i64, map_question_row, options_to_json, ser},
};
use crate::repository::{QuestionStore, StorageError};

const QUESTION_COLUMNS: &str =
    "q.id, q.level, q.prompt, q.options, q.subject, q.article_url, q.answer_key";

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn ids_i64<I>(field: &'static str, ids: I) -> Result<Vec<i64>, StorageError>
where
    I: IntoIterator<Item = u64>,
{
    ids.into_iter().map(|v| id_i64(field, v)).collect()
}

impl SqliteRepository {
    /// Attach group ids to fetched `questions` rows, keeping row order.
    async fn hydrate_questions(&self, rows: Vec<SqliteRow>) -> Result<Vec<Question>, StorageError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(row.try_get::<i64, _>("id").map_err(ser)?);
        }

        let sql = format!(
            "SELECT question_id, group_id FROM question_groups
             WHERE question_id IN ({})
             ORDER BY question_id, group_id",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(sql.as_str());
        for id in &ids {
            query = query.bind(*id);
        }
        let group_rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut groups: BTreeMap<i64, Vec<GroupId>> = BTreeMap::new();
        for row in group_rows {
            let question: i64 = row.try_get("question_id").map_err(ser)?;
            let group = group_id_from_i64(row.try_get::<i64, _>("group_id").map_err(ser)?)?;
            groups.entry(question).or_default().push(group);
        }

        rows.iter()
            .zip(ids)
            .map(|(row, id)| map_question_row(row, groups.remove(&id).unwrap_or_default()))
            .collect()
    }
}

#[async_trait]
impl QuestionStore for SqliteRepository {
    async fn list_questions_for_groups(
        &self,
        groups: &[GroupId],
        excluding: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let group_ids = ids_i64("group_id", groups.iter().map(GroupId::value))?;
        let excluded = ids_i64("question_id", excluding.iter().map(QuestionId::value))?;

        let mut sql = format!(
            "SELECT DISTINCT {QUESTION_COLUMNS}
             FROM questions q
             JOIN question_groups qg ON qg.question_id = q.id
             WHERE qg.group_id IN ({})",
            placeholders(group_ids.len())
        );
        if !excluded.is_empty() {
            sql.push_str(&format!(" AND q.id NOT IN ({})", placeholders(excluded.len())));
        }
        sql.push_str(" ORDER BY q.id ASC");

        let mut query = sqlx::query(sql.as_str());
        for id in group_ids.iter().chain(excluded.iter()) {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
        self.hydrate_questions(rows).await
    }

    async fn list_questions_at_level(
        &self,
        group: GroupId,
        level: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS}
             FROM questions q
             JOIN question_groups qg ON qg.question_id = q.id
             WHERE qg.group_id = ?1 AND q.level = ?2
             ORDER BY q.id ASC"
        );
        let rows = sqlx::query(sql.as_str())
            .bind(id_i64("group_id", group.value())?)
            .bind(i64::from(level))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        self.hydrate_questions(rows).await
    }

    async fn get_question(&self, id: QuestionId) -> Result<Question, StorageError> {
        self.get_questions(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or(StorageError::NotFound)
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted = ids_i64("question_id", ids.iter().map(QuestionId::value))?;
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.id IN ({}) ORDER BY q.id ASC",
            placeholders(wanted.len())
        );
        let mut query = sqlx::query(sql.as_str());
        for id in &wanted {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
        let found = self.hydrate_questions(rows).await?;

        // Callers get the order they asked for.
        let mut by_id: BTreeMap<QuestionId, Question> =
            found.into_iter().map(|q| (q.id(), q)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let id = id_i64("question_id", question.id().value())?;
        let content = question.content();

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO questions (id, level, prompt, options, subject, article_url, answer_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                level = excluded.level,
                prompt = excluded.prompt,
                options = excluded.options,
                subject = excluded.subject,
                article_url = excluded.article_url,
                answer_key = excluded.answer_key
            ",
        )
        .bind(id)
        .bind(i64::from(question.level()))
        .bind(content.prompt.as_str())
        .bind(options_to_json(&content.options)?)
        .bind(content.subject.as_deref())
        .bind(content.article_url.as_deref())
        .bind(question.answer_key())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM question_groups WHERE question_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for group in question.groups() {
            sqlx::query("INSERT INTO question_groups (question_id, group_id) VALUES (?1, ?2)")
                .bind(id)
                .bind(id_i64("group_id", group.value())?)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
