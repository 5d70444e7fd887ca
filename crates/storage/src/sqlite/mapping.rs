use quiz_core::model::{EndReason, SessionResult, StageId, StageProgress};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::{SessionRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_stage_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(StageId, StageProgress), StorageError> {
    let stage_id: String = row.try_get("stage_id").map_err(ser)?;
    let level = u32_from_i64("level", row.try_get::<i64, _>("level").map_err(ser)?)?;
    let exp = u32_from_i64("exp", row.try_get::<i64, _>("exp").map_err(ser)?)?;
    let max_exp = u32_from_i64("max_exp", row.try_get::<i64, _>("max_exp").map_err(ser)?)?;
    let progress = StageProgress::from_persisted(level, exp, max_exp).map_err(ser)?;
    Ok((StageId::new(stage_id), progress))
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let end_reason: String = row.try_get("end_reason").map_err(ser)?;

    let result = SessionResult {
        session_id: Uuid::parse_str(&session_id).map_err(ser)?,
        stage: StageId::new(row.try_get::<String, _>("stage_id").map_err(ser)?),
        final_score: u32_from_i64(
            "final_score",
            row.try_get::<i64, _>("final_score").map_err(ser)?,
        )?,
        session_correct_count: u32_from_i64(
            "session_correct_count",
            row.try_get::<i64, _>("session_correct_count").map_err(ser)?,
        )?,
        questions_answered: u32_from_i64(
            "questions_answered",
            row.try_get::<i64, _>("questions_answered").map_err(ser)?,
        )?,
        max_combo: u32_from_i64("max_combo", row.try_get::<i64, _>("max_combo").map_err(ser)?)?,
        exp_gained: u32_from_i64("exp_gained", row.try_get::<i64, _>("exp_gained").map_err(ser)?)?,
        leveled_up: row.try_get("leveled_up").map_err(ser)?,
        aggregate_level: u32_from_i64(
            "aggregate_level",
            row.try_get::<i64, _>("aggregate_level").map_err(ser)?,
        )?,
        end_reason: EndReason::parse(&end_reason).ok_or_else(|| {
            StorageError::Serialization(format!("invalid end_reason: {end_reason}"))
        })?,
        started_at: row.try_get("started_at").map_err(ser)?,
        ended_at: row.try_get("ended_at").map_err(ser)?,
    };

    Ok(SessionRecord::new(id, result.validate().map_err(ser)?))
}
