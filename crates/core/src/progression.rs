use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::model::{EquipmentCatalog, EquipmentId, PlayerProfile, StageId, aggregate_level};
use crate::rules::{GameRules, UnlockPolicy};

/// One-time progression events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// A stage reached the hatch level for the first time.
    Hatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressionEvent {
    LevelUp {
        stage: StageId,
        level: u32,
        aggregate_level: u32,
    },
    EquipmentUnlocked {
        id: EquipmentId,
    },
    MilestoneReached {
        milestone: Milestone,
    },
}

/// Outcome of one exp grant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpGrant {
    pub amount: u32,
    pub levels_gained: u32,
    pub events: Vec<ProgressionEvent>,
}

impl ExpGrant {
    #[must_use]
    pub fn leveled_up(&self) -> bool {
        self.levels_gained > 0
    }

    pub fn milestones(&self) -> impl Iterator<Item = Milestone> + '_ {
        self.events.iter().filter_map(|e| match e {
            ProgressionEvent::MilestoneReached { milestone } => Some(*milestone),
            _ => None,
        })
    }

    pub fn unlocked(&self) -> impl Iterator<Item = &EquipmentId> + '_ {
        self.events.iter().filter_map(|e| match e {
            ProgressionEvent::EquipmentUnlocked { id } => Some(id),
            _ => None,
        })
    }
}

/// Exp accumulation, level-up cascades, aggregate level, equipment unlocks
/// and the hatch milestone.
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    initial_max_exp: u32,
    growth: f64,
    aggregate_factor: f64,
    hatch_level: u32,
    unlock_policy: UnlockPolicy,
    catalog: EquipmentCatalog,
}

impl ProgressionEngine {
    #[must_use]
    pub fn new(rules: &GameRules, catalog: EquipmentCatalog) -> Self {
        Self {
            initial_max_exp: rules.initial_max_exp(),
            growth: rules.max_exp_growth(),
            aggregate_factor: rules.aggregate_factor(),
            hatch_level: rules.hatch_level(),
            unlock_policy: rules.unlock_policy(),
            catalog,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &EquipmentCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn aggregate_factor(&self) -> f64 {
        self.aggregate_factor
    }

    /// A profile with the default stage set at level 1.
    #[must_use]
    pub fn new_profile(&self, now: DateTime<Utc>) -> PlayerProfile {
        PlayerProfile::with_default_stages(self.initial_max_exp, self.aggregate_factor, now)
    }

    /// Add `amount` exp to one stage and apply every level-up it causes.
    ///
    /// All effects are computed on a copy and committed together.
    pub fn grant_exp(&self, profile: &mut PlayerProfile, stage: &StageId, amount: u32) -> ExpGrant {
        let mut grant = ExpGrant {
            amount,
            ..ExpGrant::default()
        };
        if amount == 0 {
            return grant;
        }

        let mut working = profile.clone();
        let mut progress = working.stage_or_new(stage, self.initial_max_exp);
        progress.add_exp(amount);

        while progress.try_level_up(self.growth) {
            grant.levels_gained += 1;
            working.put_stage(stage.clone(), progress);

            let aggregate = aggregate_level(working.stages().values(), self.aggregate_factor);
            working.set_aggregate_level(aggregate);
            info!(
                target: "quiz::progression",
                stage = %stage,
                level = progress.level(),
                aggregate_level = aggregate,
                "stage leveled up"
            );
            grant.events.push(ProgressionEvent::LevelUp {
                stage: stage.clone(),
                level: progress.level(),
                aggregate_level: aggregate,
            });

            self.unlock_equipment(&mut working, &mut grant.events);

            if progress.level() >= self.hatch_level && working.mark_hatched() {
                info!(target: "quiz::progression", stage = %stage, "companion hatched");
                grant.events.push(ProgressionEvent::MilestoneReached {
                    milestone: Milestone::Hatched,
                });
            }
        }
        working.put_stage(stage.clone(), progress);

        *profile = working;
        grant
    }

    /// Unlock anything the current aggregate level qualifies for.
    ///
    /// Only does work under [`UnlockPolicy::Threshold`]; exact-level unlocks
    /// happen on level-up steps alone.
    pub fn reconcile_unlocks(&self, profile: &mut PlayerProfile) -> Vec<EquipmentId> {
        if self.unlock_policy != UnlockPolicy::Threshold {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.unlock_equipment(profile, &mut events);
        events
            .into_iter()
            .filter_map(|e| match e {
                ProgressionEvent::EquipmentUnlocked { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    fn unlock_equipment(&self, profile: &mut PlayerProfile, events: &mut Vec<ProgressionEvent>) {
        let aggregate = profile.aggregate_level();
        for item in self.catalog.items() {
            if self.unlock_policy.unlocks(item.unlock_level, aggregate) && profile.unlock(item.id.clone()) {
                info!(
                    target: "quiz::progression",
                    id = %item.id,
                    aggregate_level = aggregate,
                    "equipment unlocked"
                );
                events.push(ProgressionEvent::EquipmentUnlocked { id: item.id.clone() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StageProgress;
    use crate::time::fixed_now;

    fn engine() -> ProgressionEngine {
        ProgressionEngine::new(&GameRules::default(), EquipmentCatalog::default())
    }

    fn ai() -> StageId {
        StageId::new("ai")
    }

    #[test]
    fn grant_below_threshold_only_adds_exp() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        let grant = engine.grant_exp(&mut profile, &ai(), 40);
        assert!(!grant.leveled_up());
        assert!(grant.events.is_empty());
        assert_eq!(profile.stage(&ai()).map(StageProgress::exp), Some(40));
    }

    #[test]
    fn single_grant_cascades_two_levels() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        // 100 to reach level 2, 150 to reach level 3, 5 left over.
        let grant = engine.grant_exp(&mut profile, &ai(), 255);

        assert_eq!(grant.levels_gained, 2);
        let stage = profile.stage(&ai()).copied().unwrap();
        assert_eq!((stage.level(), stage.exp(), stage.max_exp()), (3, 5, 225));
    }

    #[test]
    fn double_threshold_grant_stops_at_level_two() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        let grant = engine.grant_exp(&mut profile, &ai(), 205);

        assert_eq!(grant.levels_gained, 1);
        let stage = profile.stage(&ai()).copied().unwrap();
        assert_eq!((stage.level(), stage.exp(), stage.max_exp()), (2, 105, 150));
    }

    #[test]
    fn stages_level_independently() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        engine.grant_exp(&mut profile, &ai(), 100);
        assert_eq!(profile.stage_level(&ai()), 2);
        assert_eq!(profile.stage_level(&StageId::new("coding")), 1);
    }

    #[test]
    fn aggregate_level_updates_and_exact_unlock_fires() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        assert_eq!(profile.aggregate_level(), 4);

        // Levels [3,1,1,1,1,1]: aggregate passes 5 then 6.
        let grant = engine.grant_exp(&mut profile, &ai(), 250);
        assert_eq!(profile.aggregate_level(), 6);

        let unlocked: Vec<&str> = grant.unlocked().map(EquipmentId::as_str).collect();
        assert_eq!(unlocked, vec!["pen3", "glasses"]);
        assert!(!profile.unlocked_equipment().contains(&EquipmentId::new("pen1")));
    }

    #[test]
    fn exact_policy_never_unlocks_levels_below_the_start() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        // A fresh profile already sits at aggregate 4.
        engine.grant_exp(&mut profile, &ai(), 250);
        assert!(!profile.unlocked_equipment().contains(&EquipmentId::new("pen1")));
        assert!(engine.reconcile_unlocks(&mut profile).is_empty());

        let threshold = ProgressionEngine::new(
            &GameRules::default().with_unlock_policy(UnlockPolicy::Threshold),
            EquipmentCatalog::default(),
        );
        let mut newly = threshold.reconcile_unlocks(&mut profile);
        newly.sort();
        let names: Vec<&str> = newly.iter().map(EquipmentId::as_str).collect();
        assert_eq!(names, vec!["book1", "book2", "pen1", "pen2"]);
        assert!(threshold.reconcile_unlocks(&mut profile).is_empty());
    }

    #[test]
    fn threshold_policy_unlocks_everything_below() {
        let rules = GameRules::default().with_unlock_policy(UnlockPolicy::Threshold);
        let engine = ProgressionEngine::new(&rules, EquipmentCatalog::default());
        let mut profile = engine.new_profile(fixed_now());
        let grant = engine.grant_exp(&mut profile, &ai(), 100);
        assert_eq!(profile.aggregate_level(), 5);
        let mut unlocked: Vec<&str> = grant.unlocked().map(EquipmentId::as_str).collect();
        unlocked.sort_unstable();
        assert_eq!(unlocked, vec!["book1", "book2", "pen1", "pen2", "pen3"]);
    }

    #[test]
    fn hatch_milestone_fires_once() {
        let engine = engine();
        let mut profile = engine.new_profile(fixed_now());
        // 100 + 150 + 225 + 337 = 812 exp reaches level 5.
        let grant = engine.grant_exp(&mut profile, &ai(), 812);
        assert_eq!(profile.stage_level(&ai()), 5);
        assert_eq!(grant.milestones().collect::<Vec<_>>(), vec![Milestone::Hatched]);
        assert!(profile.hatched());

        let grant = engine.grant_exp(&mut profile, &StageId::new("design"), 812);
        assert!(grant.leveled_up());
        assert_eq!(grant.milestones().count(), 0);
    }
}
