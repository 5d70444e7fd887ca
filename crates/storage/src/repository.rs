use async_trait::async_trait;
use quiz_core::model::{PlayerProfile, ProfileDraft, SessionResult};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored session result with its row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: i64,
    pub result: SessionResult,
}

impl SessionRecord {
    #[must_use]
    pub fn new(id: i64, result: SessionResult) -> Self {
        Self { id, result }
    }
}

/// Repository contract for the single local player profile.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Fetch the saved profile, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or stored data is invalid.
    async fn load_profile(&self) -> Result<Option<ProfileDraft>, StorageError>;

    /// Persist the profile, replacing any previous save.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn save_profile(&self, profile: &PlayerProfile) -> Result<(), StorageError>;

    /// Remove the saved profile. Missing profiles are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn delete_profile(&self) -> Result<(), StorageError>;
}

/// Append-only log of finished sessions.
#[async_trait]
pub trait SessionHistoryRepository: Send + Sync {
    /// Store a finished session and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session id was already stored.
    async fn append_session(&self, result: &SessionResult) -> Result<i64, StorageError>;

    /// Most recent sessions first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails or a row is invalid.
    async fn list_recent_sessions(&self, limit: u32) -> Result<Vec<SessionRecord>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend fails.
    async fn clear_sessions(&self) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    profile: Arc<Mutex<Option<ProfileDraft>>>,
    sessions: Arc<Mutex<Vec<SessionRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn load_profile(&self) -> Result<Option<ProfileDraft>, StorageError> {
        let guard = self
            .profile
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn save_profile(&self, profile: &PlayerProfile) -> Result<(), StorageError> {
        let mut guard = self
            .profile
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = Some(profile.to_draft());
        Ok(())
    }

    async fn delete_profile(&self) -> Result<(), StorageError> {
        let mut guard = self
            .profile
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[async_trait]
impl SessionHistoryRepository for InMemoryRepository {
    async fn append_session(&self, result: &SessionResult) -> Result<i64, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.iter().any(|r| r.result.session_id == result.session_id) {
            return Err(StorageError::Conflict);
        }
        let id = guard.last().map_or(1, |r| r.id + 1);
        guard.push(SessionRecord::new(id, result.clone()));
        Ok(id)
    }

    async fn list_recent_sessions(&self, limit: u32) -> Result<Vec<SessionRecord>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut out: Vec<SessionRecord> = guard.clone();
        out.sort_by(|a, b| {
            b.result
                .ended_at
                .cmp(&a.result.ended_at)
                .then(b.id.cmp(&a.id))
        });
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }

    async fn clear_sessions(&self) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.clear();
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub profiles: Arc<dyn ProfileRepository>,
    pub sessions: Arc<dyn SessionHistoryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let profiles: Arc<dyn ProfileRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionHistoryRepository> = Arc::new(repo);
        Self { profiles, sessions }
    }
}
