use async_trait::async_trait;
use quiz_core::model::SessionResult;

use super::SqliteRepository;
use super::mapping::map_session_row;
use crate::repository::{SessionHistoryRepository, SessionRecord, StorageError};

fn insert_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StorageError::Conflict;
        }
    }
    StorageError::Connection(err.to_string())
}

#[async_trait]
impl SessionHistoryRepository for SqliteRepository {
    async fn append_session(&self, result: &SessionResult) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO session_results (
                session_id,
                stage_id,
                final_score,
                session_correct_count,
                questions_answered,
                max_combo,
                exp_gained,
                leveled_up,
                aggregate_level,
                end_reason,
                started_at,
                ended_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(result.session_id.to_string())
        .bind(result.stage.as_str())
        .bind(i64::from(result.final_score))
        .bind(i64::from(result.session_correct_count))
        .bind(i64::from(result.questions_answered))
        .bind(i64::from(result.max_combo))
        .bind(i64::from(result.exp_gained))
        .bind(result.leveled_up)
        .bind(i64::from(result.aggregate_level))
        .bind(result.end_reason.as_str())
        .bind(result.started_at)
        .bind(result.ended_at)
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;

        Ok(res.last_insert_rowid())
    }

    async fn list_recent_sessions(&self, limit: u32) -> Result<Vec<SessionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id,
                session_id,
                stage_id,
                final_score,
                session_correct_count,
                questions_answered,
                max_combo,
                exp_gained,
                leveled_up,
                aggregate_level,
                end_reason,
                started_at,
                ended_at
            FROM session_results
            ORDER BY ended_at DESC, id DESC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        rows.iter().map(map_session_row).collect()
    }

    async fn clear_sessions(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_results")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}
