use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::character::{EvolutionForm, find_character};
use crate::model::equipment::EquipmentCatalog;
use crate::model::ids::{CharacterId, EquipmentId, StageId};
use crate::model::stage::{DEFAULT_STAGE_IDS, StageProgress};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProfileError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("unknown character: {0}")]
    UnknownCharacter(CharacterId),

    #[error("invalid stage progress (level {level}, exp {exp}/{max_exp})")]
    InvalidStageProgress { level: u32, exp: u32, max_exp: u32 },

    #[error("correct answers ({correct}) exceed total answers ({total})")]
    CountMismatch { correct: u32, total: u32 },
}

//
// ─── PERSISTED SHAPE ───────────────────────────────────────────────────────────
//

/// Plain persisted shape of a profile.
///
/// Storage adapters serialize this instead of reaching into the domain type.
/// `aggregate_level` is not part of it: it is always re-derived on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub selected_character: Option<CharacterId>,
    pub player_name: String,
    pub character_name: String,
    pub hatched: bool,
    pub total_answers: u32,
    pub total_correct: u32,
    pub max_combo_ever: u32,
    pub unlocked_equipment: BTreeSet<EquipmentId>,
    pub stages: BTreeMap<StageId, StageProgress>,
    pub updated_at: DateTime<Utc>,
}

//
// ─── PROFILE ───────────────────────────────────────────────────────────────────
//

/// Long-lived player state: companion, lifetime counters, stage tracks and
/// unlocked equipment.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerProfile {
    selected_character: Option<CharacterId>,
    player_name: String,
    character_name: String,
    hatched: bool,
    aggregate_level: u32,
    total_answers: u32,
    total_correct: u32,
    max_combo_ever: u32,
    unlocked_equipment: BTreeSet<EquipmentId>,
    stages: BTreeMap<StageId, StageProgress>,
    updated_at: DateTime<Utc>,
}

/// Overall level: `floor(sum of stage levels * factor)`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn aggregate_level<'a>(levels: impl IntoIterator<Item = &'a StageProgress>, factor: f64) -> u32 {
    let total: u64 = levels.into_iter().map(|s| u64::from(s.level())).sum();
    #[allow(clippy::cast_precision_loss)]
    let scaled = (total as f64 * factor).floor();
    if scaled <= 0.0 {
        return 0;
    }
    if scaled >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    scaled as u32
}

impl PlayerProfile {
    /// A new profile with one level 1 track per given stage.
    #[must_use]
    pub fn fresh<'a>(
        stage_ids: impl IntoIterator<Item = &'a str>,
        initial_max_exp: u32,
        aggregate_factor: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let stages: BTreeMap<StageId, StageProgress> = stage_ids
            .into_iter()
            .map(|id| (StageId::new(id), StageProgress::new(initial_max_exp)))
            .collect();
        let aggregate = aggregate_level(stages.values(), aggregate_factor);
        Self {
            selected_character: None,
            player_name: String::new(),
            character_name: String::new(),
            hatched: false,
            aggregate_level: aggregate,
            total_answers: 0,
            total_correct: 0,
            max_combo_ever: 0,
            unlocked_equipment: BTreeSet::new(),
            stages,
            updated_at: now,
        }
    }

    /// A new profile over the default stage set.
    #[must_use]
    pub fn with_default_stages(initial_max_exp: u32, aggregate_factor: f64, now: DateTime<Utc>) -> Self {
        Self::fresh(DEFAULT_STAGE_IDS, initial_max_exp, aggregate_factor, now)
    }

    /// Rehydrate a profile from storage, re-deriving the aggregate level.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::CountMismatch` if lifetime counters are inconsistent.
    pub fn from_draft(draft: ProfileDraft, aggregate_factor: f64) -> Result<Self, ProfileError> {
        if draft.total_correct > draft.total_answers {
            return Err(ProfileError::CountMismatch {
                correct: draft.total_correct,
                total: draft.total_answers,
            });
        }
        let aggregate = aggregate_level(draft.stages.values(), aggregate_factor);
        Ok(Self {
            selected_character: draft.selected_character,
            player_name: draft.player_name,
            character_name: draft.character_name,
            hatched: draft.hatched,
            aggregate_level: aggregate,
            total_answers: draft.total_answers,
            total_correct: draft.total_correct,
            max_combo_ever: draft.max_combo_ever,
            unlocked_equipment: draft.unlocked_equipment,
            stages: draft.stages,
            updated_at: draft.updated_at,
        })
    }

    #[must_use]
    pub fn to_draft(&self) -> ProfileDraft {
        ProfileDraft {
            selected_character: self.selected_character.clone(),
            player_name: self.player_name.clone(),
            character_name: self.character_name.clone(),
            hatched: self.hatched,
            total_answers: self.total_answers,
            total_correct: self.total_correct,
            max_combo_ever: self.max_combo_ever,
            unlocked_equipment: self.unlocked_equipment.clone(),
            stages: self.stages.clone(),
            updated_at: self.updated_at,
        }
    }

    // ─── Edits ─────────────────────────────────────────────────────────────

    /// Pick the companion.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::UnknownCharacter` if the id is not in the catalog.
    pub fn select_character(&mut self, id: CharacterId) -> Result<(), ProfileError> {
        if find_character(&id).is_none() {
            return Err(ProfileError::UnknownCharacter(id));
        }
        self.selected_character = Some(id);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProfileError::EmptyName` if the name is blank after trimming.
    pub fn set_player_name(&mut self, name: &str) -> Result<(), ProfileError> {
        self.player_name = validated_name(name)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProfileError::EmptyName` if the name is blank after trimming.
    pub fn set_character_name(&mut self, name: &str) -> Result<(), ProfileError> {
        self.character_name = validated_name(name)?;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn selected_character(&self) -> Option<&CharacterId> {
        self.selected_character.as_ref()
    }

    #[must_use]
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    #[must_use]
    pub fn character_name(&self) -> &str {
        &self.character_name
    }

    /// The custom companion name, or the catalog name when none was given.
    #[must_use]
    pub fn display_character_name(&self) -> Option<String> {
        if !self.character_name.is_empty() {
            return Some(self.character_name.clone());
        }
        self.selected_character
            .as_ref()
            .and_then(find_character)
            .map(|c| c.name.to_owned())
    }

    #[must_use]
    pub fn hatched(&self) -> bool {
        self.hatched
    }

    #[must_use]
    pub fn aggregate_level(&self) -> u32 {
        self.aggregate_level
    }

    #[must_use]
    pub fn total_answers(&self) -> u32 {
        self.total_answers
    }

    #[must_use]
    pub fn total_correct(&self) -> u32 {
        self.total_correct
    }

    #[must_use]
    pub fn max_combo_ever(&self) -> u32 {
        self.max_combo_ever
    }

    #[must_use]
    pub fn unlocked_equipment(&self) -> &BTreeSet<EquipmentId> {
        &self.unlocked_equipment
    }

    #[must_use]
    pub fn stages(&self) -> &BTreeMap<StageId, StageProgress> {
        &self.stages
    }

    #[must_use]
    pub fn stage(&self, id: &StageId) -> Option<&StageProgress> {
        self.stages.get(id)
    }

    /// Current level in a stage; stages without a track count as level 1.
    #[must_use]
    pub fn stage_level(&self, id: &StageId) -> u32 {
        self.stages.get(id).map_or(1, StageProgress::level)
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Correct answer ratio as a rounded percentage; 0 before the first answer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn accuracy_percent(&self) -> u32 {
        if self.total_answers == 0 {
            return 0;
        }
        let ratio = f64::from(self.total_correct) / f64::from(self.total_answers);
        (ratio * 100.0).round() as u32
    }

    #[must_use]
    pub fn highest_stage_level(&self) -> u32 {
        self.stages.values().map(StageProgress::level).max().unwrap_or(1)
    }

    #[must_use]
    pub fn evolution_form(&self) -> EvolutionForm {
        EvolutionForm::for_level(self.highest_stage_level())
    }

    /// Sum of bonuses of every unlocked catalog item.
    #[must_use]
    pub fn equipment_bonus_total(&self, catalog: &EquipmentCatalog) -> u32 {
        self.unlocked_equipment
            .iter()
            .filter_map(|id| catalog.get(id))
            .map(|item| item.bonus)
            .sum()
    }

    // ─── Engine-only mutation ──────────────────────────────────────────────

    pub(crate) fn stage_or_new(&self, id: &StageId, initial_max_exp: u32) -> StageProgress {
        self.stages
            .get(id)
            .copied()
            .unwrap_or_else(|| StageProgress::new(initial_max_exp))
    }

    pub(crate) fn put_stage(&mut self, id: StageId, progress: StageProgress) {
        self.stages.insert(id, progress);
    }

    pub(crate) fn set_aggregate_level(&mut self, level: u32) {
        self.aggregate_level = level;
    }

    pub(crate) fn unlock(&mut self, id: EquipmentId) -> bool {
        self.unlocked_equipment.insert(id)
    }

    pub(crate) fn mark_hatched(&mut self) -> bool {
        !std::mem::replace(&mut self.hatched, true)
    }

    pub(crate) fn record_answer(&mut self, correct: bool, combo: u32) {
        self.total_answers = self.total_answers.saturating_add(1);
        if correct {
            self.total_correct = self.total_correct.saturating_add(1);
        }
        self.max_combo_ever = self.max_combo_ever.max(combo);
    }
}

fn validated_name(name: &str) -> Result<String, ProfileError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProfileError::EmptyName);
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn profile() -> PlayerProfile {
        PlayerProfile::with_default_stages(100, 0.8, fixed_now())
    }

    #[test]
    fn aggregate_is_eighty_percent_of_level_sum() {
        let levels: Vec<StageProgress> = [3, 1, 1, 1, 1, 1]
            .into_iter()
            .map(|l| StageProgress::from_persisted(l, 0, 100).unwrap())
            .collect();
        assert_eq!(aggregate_level(&levels, 0.8), 6);
    }

    #[test]
    fn fresh_profile_derives_aggregate() {
        let p = profile();
        assert_eq!(p.stages().len(), 6);
        assert_eq!(p.aggregate_level(), 4);
        assert_eq!(p.evolution_form(), EvolutionForm::Egg);
    }

    #[test]
    fn names_are_trimmed_and_required() {
        let mut p = profile();
        assert_eq!(p.set_player_name("   "), Err(ProfileError::EmptyName));
        p.set_player_name("  Mika ").unwrap();
        assert_eq!(p.player_name(), "Mika");
    }

    #[test]
    fn display_name_falls_back_to_catalog() {
        let mut p = profile();
        assert_eq!(p.display_character_name(), None);
        p.select_character(CharacterId::new("fire")).unwrap();
        assert_eq!(p.display_character_name().as_deref(), Some("Flare"));
        p.set_character_name("Ember").unwrap();
        assert_eq!(p.display_character_name().as_deref(), Some("Ember"));
    }

    #[test]
    fn unknown_character_is_rejected() {
        let mut p = profile();
        let err = p.select_character(CharacterId::new("stone")).unwrap_err();
        assert!(matches!(err, ProfileError::UnknownCharacter(_)));
    }

    #[test]
    fn accuracy_rounds() {
        let mut p = profile();
        assert_eq!(p.accuracy_percent(), 0);
        p.record_answer(true, 1);
        p.record_answer(true, 2);
        p.record_answer(false, 0);
        assert_eq!(p.accuracy_percent(), 67);
        assert_eq!(p.max_combo_ever(), 2);
    }

    #[test]
    fn draft_round_trip_rederives_aggregate() {
        let mut draft = profile().to_draft();
        draft
            .stages
            .insert(StageId::new("ai"), StageProgress::from_persisted(3, 0, 225).unwrap());
        let p = PlayerProfile::from_draft(draft, 0.8).unwrap();
        assert_eq!(p.aggregate_level(), 6);
    }

    #[test]
    fn draft_with_inconsistent_counters_is_rejected() {
        let mut draft = profile().to_draft();
        draft.total_correct = 3;
        draft.total_answers = 2;
        assert!(matches!(
            PlayerProfile::from_draft(draft, 0.8),
            Err(ProfileError::CountMismatch { .. })
        ));
    }
}
