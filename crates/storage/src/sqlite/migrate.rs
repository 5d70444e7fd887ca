use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

/// One schema version: statements applied together in a single transaction.
struct Migration {
    version: i64,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: &[
        r"CREATE TABLE IF NOT EXISTS profile (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            selected_character TEXT,
            player_name TEXT NOT NULL,
            character_name TEXT NOT NULL,
            hatched INTEGER NOT NULL CHECK (hatched IN (0, 1)),
            total_answers INTEGER NOT NULL CHECK (total_answers >= 0),
            total_correct INTEGER NOT NULL CHECK (total_correct >= 0),
            max_combo_ever INTEGER NOT NULL CHECK (max_combo_ever >= 0),
            updated_at TEXT NOT NULL
        )",
        r"CREATE TABLE IF NOT EXISTS stage_progress (
            profile_id INTEGER NOT NULL REFERENCES profile(id) ON DELETE CASCADE,
            stage_id TEXT NOT NULL,
            level INTEGER NOT NULL CHECK (level >= 1),
            exp INTEGER NOT NULL CHECK (exp >= 0),
            max_exp INTEGER NOT NULL CHECK (max_exp > 0),
            PRIMARY KEY (profile_id, stage_id)
        )",
        r"CREATE TABLE IF NOT EXISTS unlocked_equipment (
            profile_id INTEGER NOT NULL REFERENCES profile(id) ON DELETE CASCADE,
            equipment_id TEXT NOT NULL,
            PRIMARY KEY (profile_id, equipment_id)
        )",
        r"CREATE TABLE IF NOT EXISTS session_results (
            id INTEGER PRIMARY KEY,
            session_id TEXT NOT NULL UNIQUE,
            stage_id TEXT NOT NULL,
            final_score INTEGER NOT NULL CHECK (final_score >= 0),
            session_correct_count INTEGER NOT NULL CHECK (session_correct_count >= 0),
            questions_answered INTEGER NOT NULL CHECK (questions_answered >= 0),
            max_combo INTEGER NOT NULL CHECK (max_combo >= 0),
            exp_gained INTEGER NOT NULL CHECK (exp_gained >= 0),
            leveled_up INTEGER NOT NULL CHECK (leveled_up IN (0, 1)),
            aggregate_level INTEGER NOT NULL CHECK (aggregate_level >= 0),
            end_reason TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT NOT NULL
        )",
        r"CREATE INDEX IF NOT EXISTS idx_session_results_ended
            ON session_results (ended_at, id)",
    ],
}];

/// Applies every migration not yet recorded in `schema_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    let current = current.unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(migration.version)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(target: "quiz::storage", version = migration.version, "schema migration applied");
    }

    Ok(())
}
