//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{ProfileError, StageId};
use quiz_core::session::SessionError;
use storage::assets::AssetLoadError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProfileService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileServiceError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the game driver.
///
/// Session and asset errors are reported to the player and the driver keeps
/// running. Profile storage errors stop it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GameError {
    #[error("unknown stage: {0}")]
    UnknownStage(StageId),
    #[error("game driver has stopped")]
    Closed,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Assets(#[from] AssetLoadError),
    #[error(transparent)]
    Profile(#[from] ProfileServiceError),
}

impl GameError {
    /// True for failures that leave the saved profile out of sync.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Profile(ProfileServiceError::Storage(_)) | Self::Closed)
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
