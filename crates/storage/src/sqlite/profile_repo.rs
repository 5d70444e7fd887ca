use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use quiz_core::model::{CharacterId, EquipmentId, PlayerProfile, ProfileDraft};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{map_stage_row, ser, u32_from_i64};
use crate::repository::{ProfileRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProfileRepository for SqliteRepository {
    async fn load_profile(&self) -> Result<Option<ProfileDraft>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                selected_character,
                player_name,
                character_name,
                hatched,
                total_answers,
                total_correct,
                max_combo_ever,
                updated_at
            FROM profile
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let selected_character: Option<String> = row.try_get("selected_character").map_err(ser)?;
        let total_answers = u32_from_i64(
            "total_answers",
            row.try_get::<i64, _>("total_answers").map_err(ser)?,
        )?;
        let total_correct = u32_from_i64(
            "total_correct",
            row.try_get::<i64, _>("total_correct").map_err(ser)?,
        )?;
        let max_combo_ever = u32_from_i64(
            "max_combo_ever",
            row.try_get::<i64, _>("max_combo_ever").map_err(ser)?,
        )?;

        let stage_rows = sqlx::query(
            r"
            SELECT stage_id, level, exp, max_exp
            FROM stage_progress
            WHERE profile_id = 1
            ORDER BY stage_id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        let stages = stage_rows
            .iter()
            .map(map_stage_row)
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let equipment_rows = sqlx::query(
            r"
            SELECT equipment_id
            FROM unlocked_equipment
            WHERE profile_id = 1
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        let mut unlocked_equipment = BTreeSet::new();
        for r in &equipment_rows {
            let id: String = r.try_get("equipment_id").map_err(ser)?;
            unlocked_equipment.insert(EquipmentId::new(id));
        }

        Ok(Some(ProfileDraft {
            selected_character: selected_character.map(CharacterId::new),
            player_name: row.try_get("player_name").map_err(ser)?,
            character_name: row.try_get("character_name").map_err(ser)?,
            hatched: row.try_get("hatched").map_err(ser)?,
            total_answers,
            total_correct,
            max_combo_ever,
            unlocked_equipment,
            stages,
            updated_at: row.try_get("updated_at").map_err(ser)?,
        }))
    }

    async fn save_profile(&self, profile: &PlayerProfile) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO profile (
                id,
                selected_character,
                player_name,
                character_name,
                hatched,
                total_answers,
                total_correct,
                max_combo_ever,
                updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                selected_character = excluded.selected_character,
                player_name = excluded.player_name,
                character_name = excluded.character_name,
                hatched = excluded.hatched,
                total_answers = excluded.total_answers,
                total_correct = excluded.total_correct,
                max_combo_ever = excluded.max_combo_ever,
                updated_at = excluded.updated_at
            ",
        )
        .bind(1_i64)
        .bind(profile.selected_character().map(CharacterId::as_str))
        .bind(profile.player_name())
        .bind(profile.character_name())
        .bind(profile.hatched())
        .bind(i64::from(profile.total_answers()))
        .bind(i64::from(profile.total_correct()))
        .bind(i64::from(profile.max_combo_ever()))
        .bind(profile.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM stage_progress WHERE profile_id = 1")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        for (stage_id, progress) in profile.stages() {
            sqlx::query(
                r"
                INSERT INTO stage_progress (profile_id, stage_id, level, exp, max_exp)
                VALUES (1, ?1, ?2, ?3, ?4)
                ",
            )
            .bind(stage_id.as_str())
            .bind(i64::from(progress.level()))
            .bind(i64::from(progress.exp()))
            .bind(i64::from(progress.max_exp()))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        sqlx::query("DELETE FROM unlocked_equipment WHERE profile_id = 1")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        for id in profile.unlocked_equipment() {
            sqlx::query(
                r"
                INSERT INTO unlocked_equipment (profile_id, equipment_id)
                VALUES (1, ?1)
                ",
            )
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn delete_profile(&self) -> Result<(), StorageError> {
        // Stage and equipment rows cascade.
        sqlx::query("DELETE FROM profile WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
