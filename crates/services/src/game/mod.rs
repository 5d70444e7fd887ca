//! Real-time host for the session scheduler.
//!
//! One tokio task owns the scheduler and the profile. Player commands,
//! the 1 Hz ticker and the post-answer dwell all arrive through a single
//! `tokio::select!` loop, so every mutation is serialized.

mod driver;

use tokio::sync::mpsc;

use quiz_core::model::{SessionResult, StageId, StageInfo};
use quiz_core::progression::{ExpGrant, Milestone};
use quiz_core::question::{OutcomeDescriptor, QuestionWarning, RenderDescriptor};
use quiz_core::session::{Cue, SessionSnapshot};

use crate::error::GameError;

pub use driver::GameDriver;

/// Player input accepted by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCommand {
    SelectStage(StageId),
    SelectOption(usize),
    Confirm,
    Finish,
    Abandon,
    /// Name the companion, typically after the hatch milestone.
    NameCharacter(String),
    Shutdown,
}

/// Everything the presentation layer needs to render and play sounds.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Cue(Cue),
    CountdownStarted {
        stage: StageInfo,
        remaining: u32,
    },
    Countdown {
        remaining: u32,
    },
    Question {
        descriptor: RenderDescriptor,
        snapshot: SessionSnapshot,
    },
    SelectionChanged {
        descriptor: RenderDescriptor,
    },
    Answered {
        is_correct: bool,
        outcome: OutcomeDescriptor,
        score_gained: u32,
        exp: ExpGrant,
        snapshot: SessionSnapshot,
    },
    Clock {
        time_remaining: u32,
    },
    /// A question was built with a fallback variant.
    Warning(QuestionWarning),
    /// Sent after `Ended` for the session that raised it.
    Milestone(Milestone),
    Ended {
        result: SessionResult,
        record_id: i64,
        snapshot: SessionSnapshot,
    },
    Abandoned,
    CharacterNamed {
        name: String,
    },
    /// A command could not be applied; the driver keeps running.
    Rejected {
        reason: String,
    },
}

/// Channels connecting a front end to a running driver.
#[derive(Debug)]
pub struct GameHandle {
    pub commands: mpsc::UnboundedSender<GameCommand>,
    pub events: mpsc::UnboundedReceiver<GameEvent>,
}

impl GameHandle {
    /// # Errors
    ///
    /// Returns `GameError::Closed` once the driver has stopped.
    pub fn send(&self, command: GameCommand) -> Result<(), GameError> {
        self.commands.send(command).map_err(|_| GameError::Closed)
    }

    pub async fn next_event(&mut self) -> Option<GameEvent> {
        self.events.recv().await
    }
}
