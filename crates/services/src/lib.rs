#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod game;
pub mod profile_service;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, GameError, ProfileServiceError};
pub use game::{GameCommand, GameDriver, GameEvent, GameHandle};
pub use profile_service::{ProfileService, ProfileStatus, StageStatus};
