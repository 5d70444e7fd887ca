use std::sync::Arc;

use serde::Serialize;

use quiz_core::Clock;
use quiz_core::model::{
    CharacterId, EquipmentItem, EvolutionForm, PlayerProfile, SessionResult, StageId,
};
use quiz_core::progression::ProgressionEngine;
use storage::repository::{ProfileRepository, SessionHistoryRepository};
use tracing::info;

use crate::error::ProfileServiceError;

/// How many finished sessions the status view lists.
pub const RECENT_SESSIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStatus {
    pub id: StageId,
    pub level: u32,
    pub exp: u32,
    pub max_exp: u32,
}

/// Everything the status screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileStatus {
    pub player_name: String,
    pub character: Option<String>,
    pub evolution: EvolutionForm,
    pub hatched: bool,
    pub aggregate_level: u32,
    pub highest_stage_level: u32,
    pub accuracy_percent: u32,
    pub total_answers: u32,
    pub total_correct: u32,
    pub max_combo_ever: u32,
    pub stages: Vec<StageStatus>,
    pub equipment: Vec<EquipmentItem>,
    pub equipment_bonus: u32,
    pub recent: Vec<SessionResult>,
}

/// Loads, edits and saves the single local profile.
#[derive(Clone)]
pub struct ProfileService {
    clock: Clock,
    progression: ProgressionEngine,
    profiles: Arc<dyn ProfileRepository>,
    sessions: Arc<dyn SessionHistoryRepository>,
}

impl ProfileService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progression: ProgressionEngine,
        profiles: Arc<dyn ProfileRepository>,
        sessions: Arc<dyn SessionHistoryRepository>,
    ) -> Self {
        Self {
            clock,
            progression,
            profiles,
            sessions,
        }
    }

    /// The saved profile, or a fresh one when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `ProfileServiceError` if storage fails or the saved profile is
    /// inconsistent.
    pub async fn load_or_create(&self) -> Result<PlayerProfile, ProfileServiceError> {
        let Some(draft) = self.profiles.load_profile().await? else {
            info!(target: "quiz::services", "no saved profile; starting fresh");
            return Ok(self.progression.new_profile(self.clock.now()));
        };
        let mut profile = PlayerProfile::from_draft(draft, self.progression.aggregate_factor())?;
        let unlocked = self.progression.reconcile_unlocks(&mut profile);
        if !unlocked.is_empty() {
            info!(
                target: "quiz::services",
                count = unlocked.len(),
                "equipment unlocked on load"
            );
            self.save(&mut profile).await?;
        }
        Ok(profile)
    }

    /// Stamp and persist the profile.
    ///
    /// # Errors
    ///
    /// Returns `ProfileServiceError::Storage` if the save fails.
    pub async fn save(&self, profile: &mut PlayerProfile) -> Result<(), ProfileServiceError> {
        profile.touch(self.clock.now());
        self.profiles.save_profile(profile).await?;
        Ok(())
    }

    /// Append a finished session to the history.
    ///
    /// # Errors
    ///
    /// Returns `ProfileServiceError::Storage` if the append fails.
    pub async fn record_session(&self, result: &SessionResult) -> Result<i64, ProfileServiceError> {
        Ok(self.sessions.append_session(result).await?)
    }

    /// # Errors
    ///
    /// Returns `ProfileServiceError` for a blank name or a storage failure.
    pub async fn set_player_name(&self, name: &str) -> Result<PlayerProfile, ProfileServiceError> {
        let mut profile = self.load_or_create().await?;
        profile.set_player_name(name)?;
        self.save(&mut profile).await?;
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `ProfileServiceError` for a blank name or a storage failure.
    pub async fn set_character_name(&self, name: &str) -> Result<PlayerProfile, ProfileServiceError> {
        let mut profile = self.load_or_create().await?;
        profile.set_character_name(name)?;
        self.save(&mut profile).await?;
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `ProfileServiceError` for an unknown character or a storage
    /// failure.
    pub async fn select_character(&self, id: CharacterId) -> Result<PlayerProfile, ProfileServiceError> {
        let mut profile = self.load_or_create().await?;
        profile.select_character(id)?;
        self.save(&mut profile).await?;
        Ok(profile)
    }

    /// Delete the saved profile and the session history.
    ///
    /// # Errors
    ///
    /// Returns `ProfileServiceError::Storage` if either delete fails.
    pub async fn reset(&self) -> Result<(), ProfileServiceError> {
        self.profiles.delete_profile().await?;
        self.sessions.clear_sessions().await?;
        info!(target: "quiz::services", "profile and history reset");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProfileServiceError` if the profile or history cannot be read.
    pub async fn status(&self) -> Result<ProfileStatus, ProfileServiceError> {
        let profile = self.load_or_create().await?;
        let recent = self
            .sessions
            .list_recent_sessions(RECENT_SESSIONS)
            .await?
            .into_iter()
            .map(|record| record.result)
            .collect();
        Ok(self.status_of(&profile, recent))
    }

    fn status_of(&self, profile: &PlayerProfile, recent: Vec<SessionResult>) -> ProfileStatus {
        let catalog = self.progression.catalog();
        ProfileStatus {
            player_name: profile.player_name().to_owned(),
            character: profile.display_character_name(),
            evolution: profile.evolution_form(),
            hatched: profile.hatched(),
            aggregate_level: profile.aggregate_level(),
            highest_stage_level: profile.highest_stage_level(),
            accuracy_percent: profile.accuracy_percent(),
            total_answers: profile.total_answers(),
            total_correct: profile.total_correct(),
            max_combo_ever: profile.max_combo_ever(),
            stages: profile
                .stages()
                .iter()
                .map(|(id, p)| StageStatus {
                    id: id.clone(),
                    level: p.level(),
                    exp: p.exp(),
                    max_exp: p.max_exp(),
                })
                .collect(),
            equipment: catalog
                .items()
                .iter()
                .filter(|item| profile.unlocked_equipment().contains(&item.id))
                .cloned()
                .collect(),
            equipment_bonus: profile.equipment_bonus_total(catalog),
            recent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::GameRules;
    use quiz_core::model::{EquipmentCatalog, ProfileError};
    use quiz_core::rules::{GameRulesDraft, UnlockPolicy};
    use quiz_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, Storage};

    fn service_with(rules: &GameRules, storage: &Storage) -> ProfileService {
        ProfileService::new(
            Clock::fixed(fixed_now()),
            ProgressionEngine::new(rules, EquipmentCatalog::default()),
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.sessions),
        )
    }

    #[tokio::test]
    async fn missing_profile_loads_fresh_without_saving() {
        let storage = Storage::in_memory();
        let svc = service_with(&GameRules::default(), &storage);
        let profile = svc.load_or_create().await.unwrap();
        assert_eq!(profile.aggregate_level(), 4);
        assert!(storage.profiles.load_profile().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edits_are_persisted() {
        let storage = Storage::in_memory();
        let svc = service_with(&GameRules::default(), &storage);
        svc.set_player_name("  Noor ").await.unwrap();
        svc.select_character(CharacterId::new("leaf")).await.unwrap();

        let status = svc.status().await.unwrap();
        assert_eq!(status.player_name, "Noor");
        assert_eq!(status.character.as_deref(), Some("Leaf"));

        let err = svc.set_character_name(" ").await.unwrap_err();
        assert!(matches!(err, ProfileServiceError::Profile(ProfileError::EmptyName)));
    }

    #[tokio::test]
    async fn threshold_policy_reconciles_on_load() {
        let repo = InMemoryRepository::new();
        let storage = Storage {
            profiles: Arc::new(repo.clone()),
            sessions: Arc::new(repo),
        };
        let rules = GameRules::new(GameRulesDraft {
            unlock_policy: UnlockPolicy::Threshold,
            ..GameRulesDraft::default()
        })
        .unwrap();
        let svc = service_with(&rules, &storage);
        let mut fresh = svc.load_or_create().await.unwrap();
        svc.save(&mut fresh).await.unwrap();

        let loaded = svc.load_or_create().await.unwrap();
        // Aggregate 4 qualifies for pen1, book1, pen2 and book2.
        assert_eq!(loaded.unlocked_equipment().len(), 4);
        let status = svc.status().await.unwrap();
        assert_eq!(status.equipment_bonus, 30);
    }

    #[tokio::test]
    async fn reset_clears_profile_and_history() {
        let storage = Storage::in_memory();
        let svc = service_with(&GameRules::default(), &storage);
        svc.set_player_name("Ari").await.unwrap();
        svc.reset().await.unwrap();
        assert!(storage.profiles.load_profile().await.unwrap().is_none());
        assert!(svc.status().await.unwrap().recent.is_empty());
    }

    #[test]
    fn status_serializes_for_json_output() {
        let storage = Storage::in_memory();
        let svc = service_with(&GameRules::default(), &storage);
        let profile = svc.progression.new_profile(fixed_now());
        let json = serde_json::to_value(svc.status_of(&profile, Vec::new())).unwrap();
        assert_eq!(json["aggregate_level"], 4);
        assert_eq!(json["stages"].as_array().map(Vec::len), Some(6));
    }
}
