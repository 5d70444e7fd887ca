use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use quiz_core::model::{PlayerProfile, SessionResult, StageId};
use quiz_core::session::{
    Advance, AnswerOutcome, Continuation, Countdown, SessionPhase, SessionScheduler, Selection, Tick,
};
use storage::assets::QuestionSource;

use super::{GameCommand, GameEvent, GameHandle};
use crate::error::{GameError, ProfileServiceError};
use crate::profile_service::ProfileService;

const TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Timers {
    ticker: Option<Interval>,
    dwell: Option<(Pin<Box<Sleep>>, Continuation)>,
}

impl Timers {
    fn start_ticker(&mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn clear(&mut self) {
        self.ticker = None;
        self.dwell = None;
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn dwell_elapsed(dwell: &mut Option<(Pin<Box<Sleep>>, Continuation)>) -> Continuation {
    let Some((sleep, continuation)) = dwell.as_mut() else {
        return std::future::pending().await;
    };
    sleep.as_mut().await;
    let continuation = *continuation;
    *dwell = None;
    continuation
}

/// Owns one scheduler and the loaded profile for the lifetime of a game.
pub struct GameDriver {
    scheduler: SessionScheduler,
    profile: PlayerProfile,
    profiles: Arc<ProfileService>,
    source: Arc<dyn QuestionSource>,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl GameDriver {
    /// Load the profile and spawn the driver task.
    ///
    /// The task resolves to the final profile after `Shutdown` or once every
    /// command sender is dropped.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Profile` if the profile cannot be loaded.
    pub async fn spawn(
        scheduler: SessionScheduler,
        profiles: Arc<ProfileService>,
        source: Arc<dyn QuestionSource>,
    ) -> Result<(GameHandle, JoinHandle<Result<PlayerProfile, GameError>>), GameError> {
        let profile = profiles.load_or_create().await?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Self {
            scheduler,
            profile,
            profiles,
            source,
            events: event_tx,
        };
        let task = tokio::spawn(driver.run(command_rx));
        Ok((
            GameHandle {
                commands: command_tx,
                events: event_rx,
            },
            task,
        ))
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<GameCommand>,
    ) -> Result<PlayerProfile, GameError> {
        let mut timers = Timers::default();
        info!(target: "quiz::driver", "game driver started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        None | Some(GameCommand::Shutdown) => break,
                        Some(command) => self.handle(command, &mut timers).await?,
                    }
                }
                () = next_tick(&mut timers.ticker) => self.on_tick(&mut timers).await?,
                continuation = dwell_elapsed(&mut timers.dwell) => {
                    self.on_dwell(continuation, &mut timers).await?;
                }
            }
        }

        self.scheduler.abandon();
        info!(target: "quiz::driver", "game driver stopped");
        Ok(self.profile)
    }

    async fn handle(&mut self, command: GameCommand, timers: &mut Timers) -> Result<(), GameError> {
        debug!(target: "quiz::driver", ?command, "command received");
        match command {
            GameCommand::SelectStage(id) => self.select_stage(id, timers).await,
            GameCommand::SelectOption(index) => {
                match self.scheduler.select_option(&mut self.profile, index) {
                    Ok(Selection::Answered(outcome)) => self.answered(outcome, timers).await,
                    Ok(Selection::Pending(_)) => {
                        self.flush_cues();
                        if let Some(descriptor) = self.scheduler.present() {
                            self.emit(GameEvent::SelectionChanged { descriptor });
                        }
                        Ok(())
                    }
                    Err(err) => self.reject(err),
                }
            }
            GameCommand::Confirm => match self.scheduler.confirm(&mut self.profile) {
                Ok(outcome) => self.answered(outcome, timers).await,
                Err(err) => self.reject(err),
            },
            GameCommand::Finish => match self.scheduler.finish(&mut self.profile) {
                Ok(result) => self.conclude(result, timers).await,
                Err(err) => self.reject(err),
            },
            GameCommand::Abandon => {
                self.scheduler.abandon();
                timers.clear();
                self.emit(GameEvent::Abandoned);
                self.flush_milestones();
                Ok(())
            }
            GameCommand::NameCharacter(name) => {
                if let Err(err) = self.profile.set_character_name(&name) {
                    return self.reject(ProfileServiceError::from(err));
                }
                self.profiles.save(&mut self.profile).await?;
                self.emit(GameEvent::CharacterNamed {
                    name: self.profile.character_name().to_owned(),
                });
                Ok(())
            }
            GameCommand::Shutdown => Ok(()),
        }
    }

    async fn select_stage(&mut self, id: StageId, timers: &mut Timers) -> Result<(), GameError> {
        let stages = match self.source.stages().await {
            Ok(stages) => stages,
            Err(err) => return self.reject(err),
        };
        let Some(stage) = stages.into_iter().find(|s| s.id == id) else {
            return self.reject(GameError::UnknownStage(id));
        };
        let questions = match self.source.questions(&stage).await {
            Ok(questions) => questions,
            Err(err) => return self.reject(err),
        };

        match self.scheduler.select_stage(&self.profile, stage.clone(), questions) {
            Ok(remaining) => {
                timers.clear();
                timers.start_ticker();
                self.flush_cues();
                self.emit(GameEvent::CountdownStarted { stage, remaining });
                Ok(())
            }
            Err(err) => self.reject(err),
        }
    }

    async fn on_tick(&mut self, timers: &mut Timers) -> Result<(), GameError> {
        match self.scheduler.phase() {
            SessionPhase::Countdown => match self.scheduler.countdown_tick(&self.profile) {
                Ok(Countdown::Remaining(remaining)) => {
                    self.flush_cues();
                    self.emit(GameEvent::Countdown { remaining });
                    Ok(())
                }
                Ok(Countdown::Started(descriptor)) => {
                    self.flush_cues();
                    self.flush_warnings();
                    let snapshot = self.scheduler.snapshot(&self.profile);
                    self.emit(GameEvent::Question { descriptor, snapshot });
                    Ok(())
                }
                Err(err) => {
                    timers.clear();
                    self.reject(err)
                }
            },
            SessionPhase::Active => match self.scheduler.tick(&mut self.profile) {
                Ok(Tick::Running { time_remaining }) => {
                    self.emit(GameEvent::Clock { time_remaining });
                    Ok(())
                }
                Ok(Tick::Ended(result)) => self.conclude(result, timers).await,
                Err(err) => self.reject(err),
            },
            SessionPhase::Idle | SessionPhase::Ended => {
                timers.ticker = None;
                Ok(())
            }
        }
    }

    async fn on_dwell(
        &mut self,
        continuation: Continuation,
        timers: &mut Timers,
    ) -> Result<(), GameError> {
        match self.scheduler.advance_question(&mut self.profile, continuation) {
            Ok(Advance::Next(descriptor)) => {
                self.flush_warnings();
                let snapshot = self.scheduler.snapshot(&self.profile);
                self.emit(GameEvent::Question { descriptor, snapshot });
                Ok(())
            }
            Ok(Advance::Stale) => Ok(()),
            Err(err) => {
                if let Some(result) = self.scheduler.result().cloned() {
                    warn!(target: "quiz::driver", error = %err, "session ended early");
                    return self.conclude(result, timers).await;
                }
                self.reject(err)
            }
        }
    }

    async fn answered(&mut self, outcome: AnswerOutcome, timers: &mut Timers) -> Result<(), GameError> {
        self.profiles.save(&mut self.profile).await?;
        self.flush_cues();
        let AnswerOutcome {
            is_correct,
            outcome,
            score_gained,
            exp,
            continuation,
        } = outcome;
        let snapshot = self.scheduler.snapshot(&self.profile);
        self.emit(GameEvent::Answered {
            is_correct,
            outcome,
            score_gained,
            exp,
            snapshot,
        });
        let dwell = Box::pin(tokio::time::sleep(self.scheduler.rules().result_dwell()));
        timers.dwell = Some((dwell, continuation));
        Ok(())
    }

    async fn conclude(&mut self, result: SessionResult, timers: &mut Timers) -> Result<(), GameError> {
        timers.clear();
        self.profiles.save(&mut self.profile).await?;
        let record_id = self.profiles.record_session(&result).await?;
        info!(
            target: "quiz::driver",
            session_id = %result.session_id,
            record_id,
            score = result.final_score,
            "session recorded"
        );
        self.flush_cues();
        let snapshot = self.scheduler.snapshot(&self.profile);
        self.emit(GameEvent::Ended {
            result,
            record_id,
            snapshot,
        });
        self.flush_milestones();
        Ok(())
    }

    fn reject(&mut self, err: impl Into<GameError>) -> Result<(), GameError> {
        let err = err.into();
        if err.is_fatal() {
            return Err(err);
        }
        self.flush_cues();
        warn!(target: "quiz::driver", error = %err, "command rejected");
        self.emit(GameEvent::Rejected {
            reason: err.to_string(),
        });
        Ok(())
    }

    fn flush_cues(&mut self) {
        for cue in self.scheduler.drain_cues() {
            self.emit(GameEvent::Cue(cue));
        }
    }

    fn flush_warnings(&mut self) {
        for warning in self.scheduler.drain_warnings() {
            self.emit(GameEvent::Warning(warning));
        }
    }

    /// Milestones stay queued in the scheduler until the result screen.
    fn flush_milestones(&mut self) {
        for milestone in self.scheduler.drain_milestones() {
            self.emit(GameEvent::Milestone(milestone));
        }
    }

    fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            debug!(target: "quiz::driver", "event receiver dropped");
        }
    }
}
