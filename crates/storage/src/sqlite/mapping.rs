use chrono::{DateTime, NaiveTime, Utc, Weekday};
use quiz_core::model::{
    AnswerRecord, AnswerState, GroupId, LearnerId, Question, QuestionContent, QuestionId, RecordId,
};
use sqlx::Row;

use crate::repository::StorageError;

const TIME_FORMAT: &str = "%H:%M:%S";

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Maps constraint violations to domain errors, everything else to `Connection`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound;
        }
    }
    conn(e)
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

pub(crate) fn group_id_from_i64(v: i64) -> Result<GroupId, StorageError> {
    Ok(GroupId::new(i64_to_u64("group_id", v)?))
}

pub(crate) fn record_id_from_i64(v: i64) -> Result<RecordId, StorageError> {
    Ok(RecordId::new(i64_to_u64("record_id", v)?))
}

pub(crate) fn parse_state(s: &str) -> Result<AnswerState, StorageError> {
    AnswerState::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid state: {s}")))
}

pub(crate) fn time_to_text(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub(crate) fn time_from_text(s: &str) -> Result<NaiveTime, StorageError> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(ser)
}

/// Weekdays stored as `Mon,Tue,...`.
pub(crate) fn week_days_to_text(days: &[Weekday]) -> String {
    days.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn week_days_from_text(s: &str) -> Result<Vec<Weekday>, StorageError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Weekday>()
                .map_err(|_| StorageError::Serialization(format!("invalid weekday: {part}")))
        })
        .collect()
}

pub(crate) fn options_to_json(options: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(options).map_err(ser)
}

/// Builds a question from a `questions` row and its group ids.
pub(crate) fn map_question_row(
    row: &sqlx::sqlite::SqliteRow,
    groups: Vec<GroupId>,
) -> Result<Question, StorageError> {
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;

    let content = QuestionContent {
        prompt: row.try_get("prompt").map_err(ser)?,
        options,
        subject: row.try_get("subject").map_err(ser)?,
        article_url: row.try_get("article_url").map_err(ser)?,
    };

    Question::new(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        groups,
        u32_from_i64("level", row.try_get::<i64, _>("level").map_err(ser)?)?,
        content,
        row.try_get::<String, _>("answer_key").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerRecord, StorageError> {
    let state: String = row.try_get("state").map_err(ser)?;
    let scheduled_at: DateTime<Utc> = row.try_get("scheduled_at").map_err(ser)?;
    let answered_at: Option<DateTime<Utc>> = row.try_get("answered_at").map_err(ser)?;

    Ok(AnswerRecord {
        id: record_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        learner_id: learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        scheduled_at,
        answered_at,
        submitted_answer: row.try_get("submitted_answer").map_err(ser)?,
        state: parse_state(&state)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_days_survive_text_form() {
        let days = vec![Weekday::Mon, Weekday::Thu, Weekday::Sun];
        let text = week_days_to_text(&days);
        assert_eq!(text, "Mon,Thu,Sun");
        assert_eq!(week_days_from_text(&text).unwrap(), days);
        assert!(week_days_from_text("Mon,Funday").is_err());
    }

    #[test]
    fn times_use_hour_minute_second() {
        let t = NaiveTime::from_hms_opt(7, 5, 0).unwrap();
        assert_eq!(time_to_text(t), "07:05:00");
        assert_eq!(time_from_text("07:05:00").unwrap(), t);
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(question_id_from_i64(-1).is_err());
        assert!(u32_from_i64("level", i64::from(u32::MAX) + 1).is_err());
    }
}
