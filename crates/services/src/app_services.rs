use std::sync::Arc;

use quiz_core::model::{EquipmentCatalog, PlayerProfile};
use quiz_core::progression::ProgressionEngine;
use quiz_core::question::QuestionRegistry;
use quiz_core::session::SessionScheduler;
use quiz_core::{Clock, GameRules};
use storage::assets::QuestionSource;
use storage::repository::Storage;
use tokio::task::JoinHandle;

use crate::error::{AppServicesError, GameError};
use crate::game::{GameDriver, GameHandle};
use crate::profile_service::ProfileService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    rules: GameRules,
    progression: ProgressionEngine,
    profiles: Arc<ProfileService>,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: &Storage, rules: GameRules, clock: Clock) -> Self {
        let progression = ProgressionEngine::new(&rules, EquipmentCatalog::default());
        let profiles = Arc::new(ProfileService::new(
            clock,
            progression.clone(),
            Arc::clone(&storage.profiles),
            Arc::clone(&storage.sessions),
        ));
        Self {
            clock,
            rules,
            progression,
            profiles,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        rules: GameRules,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, rules, clock))
    }

    #[must_use]
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    #[must_use]
    pub fn profiles(&self) -> Arc<ProfileService> {
        Arc::clone(&self.profiles)
    }

    /// A scheduler over the built-in question types. A seed makes question
    /// order reproducible.
    #[must_use]
    pub fn scheduler(&self, seed: Option<u64>) -> SessionScheduler {
        let scheduler = SessionScheduler::new(
            self.rules.clone(),
            QuestionRegistry::default(),
            self.progression.clone(),
        )
        .with_clock(self.clock);
        match seed {
            Some(seed) => scheduler.with_seed(seed),
            None => scheduler,
        }
    }

    /// Load the profile and start a game driver task.
    ///
    /// # Errors
    ///
    /// Returns `GameError` if the profile cannot be loaded.
    pub async fn start_game(
        &self,
        source: Arc<dyn QuestionSource>,
        seed: Option<u64>,
    ) -> Result<(GameHandle, JoinHandle<Result<PlayerProfile, GameError>>), GameError> {
        GameDriver::spawn(self.scheduler(seed), self.profiles(), source).await
    }
}
