use serde::{Deserialize, Serialize};

use crate::model::ids::StageId;
use crate::model::profile::ProfileError;

/// Stage ids every fresh profile starts with.
pub const DEFAULT_STAGE_IDS: [&str; 6] = ["ai", "writing", "design", "marketing", "coding", "other"];

//
// ─── STAGE PROGRESS ────────────────────────────────────────────────────────────
//

/// Independent level/exp track of one stage.
///
/// Invariants: `level >= 1`, `max_exp > 0`, `exp < max_exp` between grants.
/// Only the progression engine mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    level: u32,
    exp: u32,
    max_exp: u32,
}

impl StageProgress {
    /// A level 1 track with no exp.
    #[must_use]
    pub fn new(initial_max_exp: u32) -> Self {
        Self {
            level: 1,
            exp: 0,
            max_exp: initial_max_exp.max(1),
        }
    }

    /// Rehydrate from persisted values.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::InvalidStageProgress` if any invariant is violated.
    pub fn from_persisted(level: u32, exp: u32, max_exp: u32) -> Result<Self, ProfileError> {
        if level == 0 || max_exp == 0 || exp >= max_exp {
            return Err(ProfileError::InvalidStageProgress {
                level,
                exp,
                max_exp,
            });
        }
        Ok(Self {
            level,
            exp,
            max_exp,
        })
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub fn exp(&self) -> u32 {
        self.exp
    }

    #[must_use]
    pub fn max_exp(&self) -> u32 {
        self.max_exp
    }

    /// Fill ratio of the exp bar in `[0, 1)`.
    #[must_use]
    pub fn exp_fraction(&self) -> f64 {
        f64::from(self.exp) / f64::from(self.max_exp)
    }

    pub(crate) fn add_exp(&mut self, amount: u32) {
        self.exp = self.exp.saturating_add(amount);
    }

    /// Consume one threshold if reached. Returns true if a level was gained.
    pub(crate) fn try_level_up(&mut self, growth: f64) -> bool {
        if self.exp < self.max_exp {
            return false;
        }
        self.exp -= self.max_exp;
        self.level = self.level.saturating_add(1);
        self.max_exp = scale_threshold(self.max_exp, growth);
        true
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_threshold(max_exp: u32, growth: f64) -> u32 {
    let scaled = (f64::from(max_exp) * growth).floor();
    if scaled >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    (scaled as u32).max(1)
}

//
// ─── STAGE INFO ────────────────────────────────────────────────────────────────
//

/// Static stage catalog entry, as listed in `stages.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub id: StageId,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    pub quiz_file: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub coming_soon: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_up_carries_remainder_and_scales_threshold() {
        let mut p = StageProgress::new(100);
        p.add_exp(130);
        assert!(p.try_level_up(1.5));
        assert_eq!((p.level(), p.exp(), p.max_exp()), (2, 30, 150));
        assert!(!p.try_level_up(1.5));
    }

    #[test]
    fn threshold_is_floored_each_step() {
        assert_eq!(scale_threshold(225, 1.5), 337);
        assert_eq!(scale_threshold(337, 1.5), 505);
    }

    #[test]
    fn persisted_progress_is_validated() {
        assert!(StageProgress::from_persisted(0, 0, 100).is_err());
        assert!(StageProgress::from_persisted(1, 100, 100).is_err());
        assert!(StageProgress::from_persisted(1, 5, 0).is_err());
        let ok = StageProgress::from_persisted(3, 5, 225).unwrap();
        assert_eq!(ok.level(), 3);
    }

    #[test]
    fn stage_info_reads_camel_case_fields() {
        let info: StageInfo = serde_json::from_str(
            r#"{"id":"ai","name":"AI Basics","icon":"A","description":"d","quizFile":"ai.json","comingSoon":true}"#,
        )
        .unwrap();
        assert_eq!(info.id, StageId::new("ai"));
        assert_eq!(info.quiz_file, "ai.json");
        assert!(!info.locked);
        assert!(info.coming_soon);
    }
}
