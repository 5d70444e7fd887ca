use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum RulesError {
    #[error("session length must be > 0 seconds")]
    InvalidSessionLength,

    #[error("countdown must be > 0 ticks")]
    InvalidCountdown,

    #[error("end-of-session exp divisor must be > 0")]
    InvalidExpDivisor,

    #[error("initial max exp must be > 0")]
    InvalidInitialMaxExp,

    #[error("max exp growth must be finite and > 1.0, got {0}")]
    InvalidGrowth(f64),

    #[error("aggregate factor must be in (0, 1], got {0}")]
    InvalidAggregateFactor(f64),

    #[error("hatch level must be >= 2")]
    InvalidHatchLevel,
}

//
// ─── UNLOCK POLICY ─────────────────────────────────────────────────────────────
//

/// How equipment unlocks compare against the aggregate level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockPolicy {
    /// Unlock items whose `unlock_level` equals the aggregate level reached by
    /// a level-up step. Items whose level is skipped stay locked.
    #[default]
    ExactLevel,
    /// Unlock every item whose `unlock_level` is at or below the aggregate level.
    Threshold,
}

impl UnlockPolicy {
    #[must_use]
    pub fn unlocks(self, unlock_level: u32, aggregate_level: u32) -> bool {
        match self {
            Self::ExactLevel => unlock_level == aggregate_level,
            Self::Threshold => unlock_level <= aggregate_level,
        }
    }
}

//
// ─── RULES ─────────────────────────────────────────────────────────────────────
//

/// Tunables for scoring, timing and progression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GameRulesDraft")]
pub struct GameRules {
    session_secs: u32,
    countdown_ticks: u32,
    result_dwell_ms: u64,
    base_score: u32,
    combo_score_bonus: u32,
    answer_exp_base: u32,
    combo_exp_bonus: u32,
    end_exp_divisor: u32,
    initial_max_exp: u32,
    max_exp_growth: f64,
    aggregate_factor: f64,
    hatch_level: u32,
    unlock_policy: UnlockPolicy,
}

/// Unvalidated rules as read from a config file. Missing keys take defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameRulesDraft {
    pub session_secs: u32,
    pub countdown_ticks: u32,
    pub result_dwell_ms: u64,
    pub base_score: u32,
    pub combo_score_bonus: u32,
    pub answer_exp_base: u32,
    pub combo_exp_bonus: u32,
    pub end_exp_divisor: u32,
    pub initial_max_exp: u32,
    pub max_exp_growth: f64,
    pub aggregate_factor: f64,
    pub hatch_level: u32,
    pub unlock_policy: UnlockPolicy,
}

impl Default for GameRulesDraft {
    fn default() -> Self {
        Self {
            session_secs: 60,
            countdown_ticks: 3,
            result_dwell_ms: 1_500,
            base_score: 100,
            combo_score_bonus: 20,
            answer_exp_base: 10,
            combo_exp_bonus: 2,
            end_exp_divisor: 10,
            initial_max_exp: 100,
            max_exp_growth: 1.5,
            aggregate_factor: 0.8,
            hatch_level: 5,
            unlock_policy: UnlockPolicy::ExactLevel,
        }
    }
}

impl TryFrom<GameRulesDraft> for GameRules {
    type Error = RulesError;

    fn try_from(draft: GameRulesDraft) -> Result<Self, Self::Error> {
        GameRules::new(draft)
    }
}

impl Default for GameRules {
    fn default() -> Self {
        let d = GameRulesDraft::default();
        Self {
            session_secs: d.session_secs,
            countdown_ticks: d.countdown_ticks,
            result_dwell_ms: d.result_dwell_ms,
            base_score: d.base_score,
            combo_score_bonus: d.combo_score_bonus,
            answer_exp_base: d.answer_exp_base,
            combo_exp_bonus: d.combo_exp_bonus,
            end_exp_divisor: d.end_exp_divisor,
            initial_max_exp: d.initial_max_exp,
            max_exp_growth: d.max_exp_growth,
            aggregate_factor: d.aggregate_factor,
            hatch_level: d.hatch_level,
            unlock_policy: d.unlock_policy,
        }
    }
}

impl GameRules {
    /// Validate a draft.
    ///
    /// # Errors
    ///
    /// Returns `RulesError` if a duration or divisor is zero, growth does not
    /// increase thresholds, or the aggregate factor is outside `(0, 1]`.
    pub fn new(draft: GameRulesDraft) -> Result<Self, RulesError> {
        if draft.session_secs == 0 {
            return Err(RulesError::InvalidSessionLength);
        }
        if draft.countdown_ticks == 0 {
            return Err(RulesError::InvalidCountdown);
        }
        if draft.end_exp_divisor == 0 {
            return Err(RulesError::InvalidExpDivisor);
        }
        if draft.initial_max_exp == 0 {
            return Err(RulesError::InvalidInitialMaxExp);
        }
        if !draft.max_exp_growth.is_finite() || draft.max_exp_growth <= 1.0 {
            return Err(RulesError::InvalidGrowth(draft.max_exp_growth));
        }
        if !draft.aggregate_factor.is_finite()
            || draft.aggregate_factor <= 0.0
            || draft.aggregate_factor > 1.0
        {
            return Err(RulesError::InvalidAggregateFactor(draft.aggregate_factor));
        }
        if draft.hatch_level < 2 {
            return Err(RulesError::InvalidHatchLevel);
        }

        Ok(Self {
            session_secs: draft.session_secs,
            countdown_ticks: draft.countdown_ticks,
            result_dwell_ms: draft.result_dwell_ms,
            base_score: draft.base_score,
            combo_score_bonus: draft.combo_score_bonus,
            answer_exp_base: draft.answer_exp_base,
            combo_exp_bonus: draft.combo_exp_bonus,
            end_exp_divisor: draft.end_exp_divisor,
            initial_max_exp: draft.initial_max_exp,
            max_exp_growth: draft.max_exp_growth,
            aggregate_factor: draft.aggregate_factor,
            hatch_level: draft.hatch_level,
            unlock_policy: draft.unlock_policy,
        })
    }

    #[must_use]
    pub fn with_unlock_policy(mut self, policy: UnlockPolicy) -> Self {
        self.unlock_policy = policy;
        self
    }

    #[must_use]
    pub fn session_secs(&self) -> u32 {
        self.session_secs
    }

    #[must_use]
    pub fn countdown_ticks(&self) -> u32 {
        self.countdown_ticks
    }

    #[must_use]
    pub fn result_dwell(&self) -> Duration {
        Duration::from_millis(self.result_dwell_ms)
    }

    /// Score for a correct answer given the combo count *after* incrementing.
    #[must_use]
    pub fn answer_score(&self, combo: u32) -> u32 {
        self.base_score
            .saturating_add(combo.saturating_mul(self.combo_score_bonus))
    }

    /// Immediate exp for a correct answer given the combo count after incrementing.
    #[must_use]
    pub fn answer_exp(&self, combo: u32) -> u32 {
        self.answer_exp_base
            .saturating_add(combo.saturating_mul(self.combo_exp_bonus))
    }

    /// Exp granted when a session ends: `floor(score / divisor)`.
    #[must_use]
    pub fn end_of_session_exp(&self, score: u32) -> u32 {
        score / self.end_exp_divisor
    }

    #[must_use]
    pub fn initial_max_exp(&self) -> u32 {
        self.initial_max_exp
    }

    #[must_use]
    pub fn max_exp_growth(&self) -> f64 {
        self.max_exp_growth
    }

    #[must_use]
    pub fn aggregate_factor(&self) -> f64 {
        self.aggregate_factor
    }

    #[must_use]
    pub fn hatch_level(&self) -> u32 {
        self.hatch_level
    }

    #[must_use]
    pub fn unlock_policy(&self) -> UnlockPolicy {
        self.unlock_policy
    }
}
