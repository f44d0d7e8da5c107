use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS learners (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            is_paused INTEGER NOT NULL DEFAULT 0 CHECK (is_paused IN (0, 1))
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS group_memberships (
            learner_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            target_level INTEGER NOT NULL CHECK (target_level >= 0),
            PRIMARY KEY (learner_id, group_id),
            FOREIGN KEY (learner_id) REFERENCES learners(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            id INTEGER PRIMARY KEY,
            level INTEGER NOT NULL CHECK (level >= 1),
            prompt TEXT NOT NULL,
            options TEXT NOT NULL DEFAULT '[]',
            subject TEXT,
            article_url TEXT,
            answer_key TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_groups (
            question_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            PRIMARY KEY (question_id, group_id),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS answers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question_id INTEGER NOT NULL,
            learner_id INTEGER NOT NULL,
            scheduled_at TEXT NOT NULL,
            answered_at TEXT,
            submitted_answer TEXT,
            state TEXT NOT NULL CHECK (state IN ('not_answered', 'transferred', 'answered')),
            FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE,
            FOREIGN KEY (learner_id) REFERENCES learners(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS schedule_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            time_period_secs INTEGER NOT NULL,
            dispatch_order TEXT NOT NULL,
            week_days TEXT,
            from_time TEXT,
            to_time TEXT,
            review_period_secs INTEGER NOT NULL,
            repetition_amount INTEGER NOT NULL,
            distribution_function TEXT NOT NULL,
            level_spread REAL NOT NULL,
            delivery_timeout_secs INTEGER NOT NULL
        );
    ",
    // At most one pending record per (question, learner).
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_answers_single_pending
            ON answers(question_id, learner_id)
            WHERE state = 'not_answered';
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_answers_learner_state_scheduled
            ON answers(learner_id, state, scheduled_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_answers_learner_question
            ON answers(learner_id, question_id, scheduled_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_question_groups_group
            ON question_groups(group_id, question_id);
    ",
];

/// Runs the versioned schema migrations.
///
/// Version 1 creates learners, memberships, questions, the answer ledger and
/// the settings row.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
