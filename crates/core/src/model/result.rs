use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::ids::StageId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionResultError {
    #[error("ended_at is before started_at")]
    InvalidTimeRange,

    #[error("correct answers ({correct}) exceed questions ({questions})")]
    CountMismatch { correct: u32, questions: u32 },

    #[error("max combo ({max_combo}) exceeds correct answers ({correct})")]
    ComboMismatch { max_combo: u32, correct: u32 },
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    TimeUp,
    Finished,
    NoEligibleQuestions,
}

impl EndReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeUp => "time_up",
            Self::Finished => "finished",
            Self::NoEligibleQuestions => "no_eligible_questions",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "time_up" => Some(Self::TimeUp),
            "finished" => Some(Self::Finished),
            "no_eligible_questions" => Some(Self::NoEligibleQuestions),
            _ => None,
        }
    }
}

/// Frozen outcome of one play session.
///
/// `questions_answered` counts the questions presented during the session,
/// including the one on screen when time ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub stage: StageId,
    pub final_score: u32,
    pub session_correct_count: u32,
    pub questions_answered: u32,
    pub max_combo: u32,
    pub exp_gained: u32,
    pub leveled_up: bool,
    pub aggregate_level: u32,
    pub end_reason: EndReason,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SessionResult {
    /// Validate a result read back from storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionResultError` if timestamps or counters are inconsistent.
    pub fn validate(self) -> Result<Self, SessionResultError> {
        if self.ended_at < self.started_at {
            return Err(SessionResultError::InvalidTimeRange);
        }
        if self.session_correct_count > self.questions_answered {
            return Err(SessionResultError::CountMismatch {
                correct: self.session_correct_count,
                questions: self.questions_answered,
            });
        }
        if self.max_combo > self.session_correct_count {
            return Err(SessionResultError::ComboMismatch {
                max_combo: self.max_combo,
                correct: self.session_correct_count,
            });
        }
        Ok(self)
    }

    /// Session length in whole seconds.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        self.ended_at.signed_duration_since(self.started_at).num_seconds()
    }
}
