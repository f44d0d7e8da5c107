use async_trait::async_trait;
use sqlx::Row;

use crate::repository::{SettingsRepository, StorageError};
use quiz_core::model::{
    DispatchOrder, DistributionFunction, ScheduleSettings, ScheduleSettingsDraft,
};

use super::SqliteRepository;
use super::mapping::{
    conn, ser, time_from_text, time_to_text, u32_from_i64, week_days_from_text, week_days_to_text,
};

#[async_trait]
impl SettingsRepository for SqliteRepository {
    async fn get_settings(&self) -> Result<Option<ScheduleSettings>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                time_period_secs,
                dispatch_order,
                week_days,
                from_time,
                to_time,
                review_period_secs,
                repetition_amount,
                distribution_function,
                level_spread,
                delivery_timeout_secs
            FROM schedule_settings
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let order: String = row.try_get("dispatch_order").map_err(ser)?;
        let distribution: String = row.try_get("distribution_function").map_err(ser)?;
        let week_days: Option<String> = row.try_get("week_days").map_err(ser)?;
        let from_time: Option<String> = row.try_get("from_time").map_err(ser)?;
        let to_time: Option<String> = row.try_get("to_time").map_err(ser)?;
        let repetition_amount: i64 = row.try_get("repetition_amount").map_err(ser)?;

        let draft = ScheduleSettingsDraft {
            time_period_secs: Some(row.try_get("time_period_secs").map_err(ser)?),
            order: Some(order.parse::<DispatchOrder>().map_err(ser)?),
            week_days: week_days.as_deref().map(week_days_from_text).transpose()?,
            from_time: from_time.as_deref().map(time_from_text).transpose()?,
            to_time: to_time.as_deref().map(time_from_text).transpose()?,
            review_period_secs: Some(row.try_get("review_period_secs").map_err(ser)?),
            repetition_amount: Some(u32_from_i64("repetition_amount", repetition_amount)?),
            distribution_function: Some(distribution.parse::<DistributionFunction>().map_err(ser)?),
            level_spread: Some(row.try_get("level_spread").map_err(ser)?),
            delivery_timeout_secs: Some(row.try_get("delivery_timeout_secs").map_err(ser)?),
        };

        ScheduleSettings::from_persisted(draft)
            .map(Some)
            .map_err(ser)
    }

    async fn save_settings(&self, settings: &ScheduleSettings) -> Result<(), StorageError> {
        let window = settings.window();

        sqlx::query(
            r"
            INSERT INTO schedule_settings (
                id,
                time_period_secs,
                dispatch_order,
                week_days,
                from_time,
                to_time,
                review_period_secs,
                repetition_amount,
                distribution_function,
                level_spread,
                delivery_timeout_secs
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                time_period_secs = excluded.time_period_secs,
                dispatch_order = excluded.dispatch_order,
                week_days = excluded.week_days,
                from_time = excluded.from_time,
                to_time = excluded.to_time,
                review_period_secs = excluded.review_period_secs,
                repetition_amount = excluded.repetition_amount,
                distribution_function = excluded.distribution_function,
                level_spread = excluded.level_spread,
                delivery_timeout_secs = excluded.delivery_timeout_secs
            ",
        )
        .bind(1_i64)
        .bind(settings.every().num_seconds())
        .bind(settings.order().as_str())
        .bind(settings.week_days().map(week_days_to_text))
        .bind(window.map(|w| time_to_text(w.from())))
        .bind(window.map(|w| time_to_text(w.to())))
        .bind(settings.review_period().num_seconds())
        .bind(i64::from(settings.repetition_cap()))
        .bind(settings.distribution().as_str())
        .bind(settings.level_spread())
        .bind(settings.delivery_timeout().num_seconds())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
