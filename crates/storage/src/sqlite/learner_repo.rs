use async_trait::async_trait;
use quiz_core::model::{GroupMembership, Learner, LearnerId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, group_id_from_i64, id_i64, learner_id_from_i64, ser, u32_from_i64, write_err},
};
use crate::repository::{LearnerDirectory, StorageError};

fn map_learner_row(row: &sqlx::sqlite::SqliteRow) -> Result<Learner, StorageError> {
    let id = learner_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let name: String = row.try_get("name").map_err(ser)?;
    let is_paused: bool = row.try_get("is_paused").map_err(ser)?;
    Ok(Learner::new(id, name).paused(is_paused))
}

#[async_trait]
impl LearnerDirectory for SqliteRepository {
    async fn list_active_learners(&self) -> Result<Vec<Learner>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, name, is_paused
                FROM learners
                WHERE is_paused = 0
                ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_learner_row(&row)?);
        }
        Ok(out)
    }

    async fn get_learner(&self, id: LearnerId) -> Result<Learner, StorageError> {
        let row = sqlx::query("SELECT id, name, is_paused FROM learners WHERE id = ?1")
            .bind(id_i64("learner_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_learner_row(&row)
    }

    async fn get_group_memberships(
        &self,
        learner: LearnerId,
    ) -> Result<Vec<GroupMembership>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT group_id, target_level
                FROM group_memberships
                WHERE learner_id = ?1
                ORDER BY group_id ASC
            ",
        )
        .bind(id_i64("learner_id", learner.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let group = group_id_from_i64(row.try_get::<i64, _>("group_id").map_err(ser)?)?;
            let target = u32_from_i64(
                "target_level",
                row.try_get::<i64, _>("target_level").map_err(ser)?,
            )?;
            out.push(GroupMembership::new(group, target));
        }
        Ok(out)
    }

    async fn upsert_learner(&self, learner: &Learner) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO learners (id, name, is_paused)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                is_paused = excluded.is_paused
            ",
        )
        .bind(id_i64("learner_id", learner.id.value())?)
        .bind(learner.name.as_str())
        .bind(learner.is_paused)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn set_membership(
        &self,
        learner: LearnerId,
        membership: GroupMembership,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO group_memberships (learner_id, group_id, target_level)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(learner_id, group_id) DO UPDATE SET
                target_level = excluded.target_level
            ",
        )
        .bind(id_i64("learner_id", learner.value())?)
        .bind(id_i64("group_id", membership.group_id.value())?)
        .bind(i64::from(membership.target_level))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }
}
