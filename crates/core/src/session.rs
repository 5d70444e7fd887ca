//! Timed play session: `Idle -> Countdown -> Active -> Ended`.
//!
//! The scheduler is synchronous. A host drives it with `countdown_tick`
//! and `tick` once per second and calls `advance_question` after the result
//! dwell. Every operation completes its effects before returning.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{
    EndReason, PlayerProfile, QuestionError, QuestionSpec, SessionResult, StageId, StageInfo,
};
use crate::progression::{ExpGrant, Milestone, ProgressionEngine, ProgressionEvent};
use crate::question::{
    Candidate, OutcomeDescriptor, QuestionRegistry, QuestionType, QuestionWarning, RenderDescriptor,
    SelectionStep,
};
use crate::rules::GameRules;
use crate::shuffle::QuestionOrder;
use crate::time::Clock;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("`{operation}` is not allowed while the session is {phase}")]
    InvalidSessionState {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("stage `{0}` is locked")]
    StageLocked(StageId),

    #[error("no eligible questions for stage `{stage}` at level {stage_level}")]
    NoEligibleQuestions { stage: StageId, stage_level: u32 },

    #[error(transparent)]
    Question(#[from] QuestionError),
}

//
// ─── PUBLIC TYPES ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Countdown,
    Active,
    Ended,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Countdown => "countdown",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio/feedback cue names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cue {
    #[serde(rename = "tick")]
    Tick,
    #[serde(rename = "click")]
    Click,
    #[serde(rename = "correct")]
    Correct,
    #[serde(rename = "incorrect")]
    Incorrect,
    #[serde(rename = "levelUp")]
    LevelUp,
    #[serde(rename = "resultEntry")]
    ResultEntry,
}

impl Cue {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Click => "click",
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::LevelUp => "levelUp",
            Self::ResultEntry => "resultEntry",
        }
    }
}

/// Token for the dwell-delayed advance after an answer.
///
/// Redeeming it after the session ended, or twice, is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    generation: u64,
    question: u32,
}

impl Continuation {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Countdown {
    Remaining(u32),
    Started(RenderDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Running { time_remaining: u32 },
    Ended(SessionResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next(RenderDescriptor),
    /// The continuation no longer matches the live session.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub is_correct: bool,
    pub outcome: OutcomeDescriptor,
    pub score_gained: u32,
    pub exp: ExpGrant,
    pub continuation: Continuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Answered(AnswerOutcome),
    Pending(BTreeSet<usize>),
}

/// Mutable counters of the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    score: u32,
    combo: u32,
    max_combo: u32,
    time_remaining: u32,
    order: QuestionOrder,
    questions_answered: u32,
    session_correct_count: u32,
}

impl SessionState {
    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn combo(&self) -> u32 {
        self.combo
    }

    #[must_use]
    pub fn max_combo(&self) -> u32 {
        self.max_combo
    }

    #[must_use]
    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    #[must_use]
    pub fn order(&self) -> &QuestionOrder {
        &self.order
    }

    #[must_use]
    pub fn questions_answered(&self) -> u32 {
        self.questions_answered
    }

    #[must_use]
    pub fn session_correct_count(&self) -> u32 {
        self.session_correct_count
    }
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub stage: Option<StageId>,
    pub countdown: Option<u32>,
    pub score: u32,
    pub combo: u32,
    pub max_combo: u32,
    pub time_remaining: u32,
    pub question_number: u32,
    pub stage_level: u32,
    pub exp_fraction: f64,
    pub aggregate_level: u32,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

#[derive(Debug)]
struct Prepared {
    stage: StageInfo,
    questions: Vec<Arc<QuestionSpec>>,
}

#[derive(Debug)]
struct Live {
    id: Uuid,
    prepared: Prepared,
    state: SessionState,
    current: Box<dyn QuestionType>,
    answered: bool,
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Countdown { prepared: Prepared, remaining: u32 },
    Active(Box<Live>),
    Ended(SessionResult),
}

impl Phase {
    fn kind(&self) -> SessionPhase {
        match self {
            Phase::Idle => SessionPhase::Idle,
            Phase::Countdown { .. } => SessionPhase::Countdown,
            Phase::Active(_) => SessionPhase::Active,
            Phase::Ended(_) => SessionPhase::Ended,
        }
    }
}

/// Orchestrates one play session at a time.
#[derive(Debug)]
pub struct SessionScheduler {
    rules: GameRules,
    registry: QuestionRegistry,
    progression: ProgressionEngine,
    rng: StdRng,
    clock: Clock,
    phase: Phase,
    generation: u64,
    cues: VecDeque<Cue>,
    milestones: VecDeque<Milestone>,
    warnings: VecDeque<QuestionWarning>,
}

impl SessionScheduler {
    #[must_use]
    pub fn new(rules: GameRules, registry: QuestionRegistry, progression: ProgressionEngine) -> Self {
        Self {
            rules,
            registry,
            progression,
            rng: StdRng::from_os_rng(),
            clock: Clock::default(),
            phase: Phase::Idle,
            generation: 0,
            cues: VecDeque::new(),
            milestones: VecDeque::new(),
            warnings: VecDeque::new(),
        }
    }

    /// Deterministic shuffles.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    #[must_use]
    pub fn progression(&self) -> &ProgressionEngine {
        &self.progression
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase.kind()
    }

    /// Bumped whenever a session starts, ends or is abandoned.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn state(&self) -> Option<&SessionState> {
        match &self.phase {
            Phase::Active(live) => Some(&live.state),
            _ => None,
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&dyn QuestionType> {
        match &self.phase {
            Phase::Active(live) => Some(live.current.as_ref()),
            _ => None,
        }
    }

    /// Render descriptor of the question on screen.
    #[must_use]
    pub fn present(&self) -> Option<RenderDescriptor> {
        self.current_question().map(QuestionType::present)
    }

    /// Result of the last session, until a new one starts.
    #[must_use]
    pub fn result(&self) -> Option<&SessionResult> {
        match &self.phase {
            Phase::Ended(result) => Some(result),
            _ => None,
        }
    }

    pub fn drain_cues(&mut self) -> Vec<Cue> {
        self.cues.drain(..).collect()
    }

    /// One-shot milestones raised since the last drain.
    pub fn drain_milestones(&mut self) -> Vec<Milestone> {
        self.milestones.drain(..).collect()
    }

    /// Warnings raised while building questions since the last drain.
    pub fn drain_warnings(&mut self) -> Vec<QuestionWarning> {
        self.warnings.drain(..).collect()
    }

    // ─── Transitions ───────────────────────────────────────────────────────

    /// Pick a stage and enter the countdown. Returns the ticks left.
    ///
    /// # Errors
    ///
    /// - `InvalidSessionState` during a countdown or a live session
    /// - `StageLocked` for a locked stage
    /// - `NoEligibleQuestions` if nothing can be asked at the player's level
    pub fn select_stage(
        &mut self,
        profile: &PlayerProfile,
        stage: StageInfo,
        questions: Vec<QuestionSpec>,
    ) -> Result<u32, SessionError> {
        if !matches!(self.phase, Phase::Idle | Phase::Ended(_)) {
            return Err(self.invalid("select_stage"));
        }
        if stage.locked {
            return Err(SessionError::StageLocked(stage.id));
        }
        let stage_level = profile.stage_level(&stage.id);
        if !questions.iter().any(|q| q.is_eligible(stage_level)) {
            return Err(SessionError::NoEligibleQuestions {
                stage: stage.id,
                stage_level,
            });
        }

        let remaining = self.rules.countdown_ticks();
        debug!(
            target: "quiz::session",
            stage = %stage.id,
            questions = questions.len(),
            "stage selected"
        );
        self.generation += 1;
        self.cues.push_back(Cue::Tick);
        self.phase = Phase::Countdown {
            prepared: Prepared {
                stage,
                questions: questions.into_iter().map(Arc::new).collect(),
            },
            remaining,
        };
        Ok(remaining)
    }

    /// One countdown step. The last step starts the session.
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` outside the countdown, `NoEligibleQuestions` if
    /// the shuffle finds nothing to ask (the scheduler returns to idle).
    pub fn countdown_tick(&mut self, profile: &PlayerProfile) -> Result<Countdown, SessionError> {
        let Phase::Countdown { remaining, .. } = &mut self.phase else {
            return Err(self.invalid("countdown_tick"));
        };
        *remaining = remaining.saturating_sub(1);
        self.cues.push_back(Cue::Tick);
        if *remaining > 0 {
            return Ok(Countdown::Remaining(*remaining));
        }

        let Phase::Countdown { prepared, .. } = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return Err(self.invalid("countdown_tick"));
        };
        let stage_level = profile.stage_level(&prepared.stage.id);
        let no_eligible = |stage: &StageInfo| SessionError::NoEligibleQuestions {
            stage: stage.id.clone(),
            stage_level,
        };
        let mut order = QuestionOrder::shuffled(&prepared.questions, stage_level, &mut self.rng)
            .map_err(|_| no_eligible(&prepared.stage))?;
        let first = order
            .next_index(&prepared.questions, stage_level, &mut self.rng)
            .map_err(|_| no_eligible(&prepared.stage))?;
        let current = self.build_question(&prepared.questions[first]);

        let live = Live {
            id: Uuid::new_v4(),
            state: SessionState {
                score: 0,
                combo: 0,
                max_combo: 0,
                time_remaining: self.rules.session_secs(),
                order,
                questions_answered: 1,
                session_correct_count: 0,
            },
            current,
            answered: false,
            started_at: self.clock.now(),
            prepared,
        };
        info!(
            target: "quiz::session",
            session_id = %live.id,
            stage = %live.prepared.stage.id,
            stage_level,
            eligible = live.state.order.order().len(),
            "session started"
        );
        let descriptor = live.current.present();
        self.phase = Phase::Active(Box::new(live));
        Ok(Countdown::Started(descriptor))
    }

    /// Route a click on option `index` into the current question.
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` outside an unanswered live question,
    /// `Question(OptionOutOfRange)` for an index past the options.
    pub fn select_option(
        &mut self,
        profile: &mut PlayerProfile,
        index: usize,
    ) -> Result<Selection, SessionError> {
        let live = self.open_question("select_option")?;
        let step = live.current.record_selection(index)?;
        self.cues.push_back(Cue::Click);
        match step {
            SelectionStep::Pending(selected) => Ok(Selection::Pending(selected)),
            SelectionStep::Submitted(candidate) => {
                self.answer(profile, candidate).map(Selection::Answered)
            }
        }
    }

    /// Submit the accumulated multi-choice selection.
    ///
    /// # Errors
    ///
    /// `Question(EmptySelection)` with nothing selected (the question stays
    /// open), `InvalidSessionState` outside an unanswered live question.
    pub fn confirm(&mut self, profile: &mut PlayerProfile) -> Result<AnswerOutcome, SessionError> {
        let live = self.open_question("confirm")?;
        let candidate = live.current.confirm()?;
        self.cues.push_back(Cue::Click);
        self.answer(profile, candidate)
    }

    /// Score a candidate for the current question and grant its exp.
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` unless a live question is waiting for an answer,
    /// `Question(EmptySelection)` for an empty multi-choice candidate (nothing
    /// changes).
    pub fn answer(
        &mut self,
        profile: &mut PlayerProfile,
        candidate: Candidate,
    ) -> Result<AnswerOutcome, SessionError> {
        let generation = self.generation;
        let rules = &self.rules;
        let progression = &self.progression;
        let Phase::Active(live) = &mut self.phase else {
            return Err(self.invalid("answer"));
        };
        if live.answered {
            return Err(SessionError::InvalidSessionState {
                operation: "answer",
                phase: SessionPhase::Active,
            });
        }
        if candidate.is_empty() {
            return Err(QuestionError::EmptySelection.into());
        }

        let is_correct = live.current.validate(&candidate);
        let outcome = live.current.describe_outcome(is_correct, &candidate);
        let state = &mut live.state;
        let mut score_gained = 0;
        let mut exp = ExpGrant::default();

        if is_correct {
            state.combo += 1;
            state.max_combo = state.max_combo.max(state.combo);
            score_gained = rules.answer_score(state.combo);
            state.score = state.score.saturating_add(score_gained);
            state.session_correct_count += 1;
            exp = progression.grant_exp(profile, &live.prepared.stage.id, rules.answer_exp(state.combo));
            self.cues.push_back(Cue::Correct);
        } else {
            state.combo = 0;
            self.cues.push_back(Cue::Incorrect);
        }
        profile.record_answer(is_correct, state.combo);
        live.answered = true;

        debug!(
            target: "quiz::session",
            question = state.questions_answered,
            is_correct,
            combo = state.combo,
            score = state.score,
            "answer scored"
        );
        let continuation = Continuation {
            generation,
            question: state.questions_answered,
        };
        Self::queue_progression(&mut self.cues, &mut self.milestones, &exp);

        Ok(AnswerOutcome {
            is_correct,
            outcome,
            score_gained,
            exp,
            continuation,
        })
    }

    /// Show the next question once the result dwell has elapsed.
    ///
    /// # Errors
    ///
    /// `NoEligibleQuestions` if a reshuffle finds nothing; the session ends
    /// and its result is available from [`Self::result`].
    pub fn advance_question(
        &mut self,
        profile: &mut PlayerProfile,
        continuation: Continuation,
    ) -> Result<Advance, SessionError> {
        let Phase::Active(live) = &mut self.phase else {
            debug!(target: "quiz::session", "stale continuation ignored");
            return Ok(Advance::Stale);
        };
        if continuation.generation != self.generation
            || continuation.question != live.state.questions_answered
            || !live.answered
        {
            debug!(target: "quiz::session", "stale continuation ignored");
            return Ok(Advance::Stale);
        }

        let stage_level = profile.stage_level(&live.prepared.stage.id);
        let next = live
            .state
            .order
            .next_index(&live.prepared.questions, stage_level, &mut self.rng);
        let Ok(index) = next else {
            let stage = live.prepared.stage.id.clone();
            self.end(profile, EndReason::NoEligibleQuestions)?;
            return Err(SessionError::NoEligibleQuestions { stage, stage_level });
        };

        let spec = Arc::clone(&live.prepared.questions[index]);
        let current = self.build_question(&spec);
        let Phase::Active(live) = &mut self.phase else {
            return Ok(Advance::Stale);
        };
        live.current = current;
        live.answered = false;
        live.state.questions_answered += 1;
        Ok(Advance::Next(live.current.present()))
    }

    /// One second of session time. Reaching zero ends the session.
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` unless the session is live.
    pub fn tick(&mut self, profile: &mut PlayerProfile) -> Result<Tick, SessionError> {
        let Phase::Active(live) = &mut self.phase else {
            return Err(self.invalid("tick"));
        };
        live.state.time_remaining = live.state.time_remaining.saturating_sub(1);
        if live.state.time_remaining > 0 {
            return Ok(Tick::Running {
                time_remaining: live.state.time_remaining,
            });
        }
        self.end(profile, EndReason::TimeUp).map(Tick::Ended)
    }

    /// End the live session early.
    ///
    /// # Errors
    ///
    /// `InvalidSessionState` unless the session is live.
    pub fn finish(&mut self, profile: &mut PlayerProfile) -> Result<SessionResult, SessionError> {
        if !matches!(self.phase, Phase::Active(_)) {
            return Err(self.invalid("finish"));
        }
        self.end(profile, EndReason::Finished)
    }

    /// Drop any countdown or live session without granting exp.
    pub fn abandon(&mut self) {
        if matches!(self.phase, Phase::Countdown { .. } | Phase::Active(_)) {
            info!(target: "quiz::session", phase = %self.phase(), "session abandoned");
            self.generation += 1;
        }
        self.phase = Phase::Idle;
    }

    #[must_use]
    pub fn snapshot(&self, profile: &PlayerProfile) -> SessionSnapshot {
        let (stage, countdown, state) = match &self.phase {
            Phase::Idle => (None, None, None),
            Phase::Countdown {
                prepared,
                remaining,
            } => (Some(&prepared.stage.id), Some(*remaining), None),
            Phase::Active(live) => (Some(&live.prepared.stage.id), None, Some(&live.state)),
            Phase::Ended(result) => (Some(&result.stage), None, None),
        };
        let progress = stage.and_then(|id| profile.stage(id));
        let ended = self.result();

        SessionSnapshot {
            phase: self.phase(),
            stage: stage.cloned(),
            countdown,
            score: state.map_or_else(|| ended.map_or(0, |r| r.final_score), |s| s.score),
            combo: state.map_or(0, |s| s.combo),
            max_combo: state.map_or_else(|| ended.map_or(0, |r| r.max_combo), |s| s.max_combo),
            time_remaining: state.map_or(0, |s| s.time_remaining),
            question_number: state.map_or_else(
                || ended.map_or(0, |r| r.questions_answered),
                |s| s.questions_answered,
            ),
            stage_level: progress.map_or(1, |p| p.level()),
            exp_fraction: progress.map_or(0.0, |p| p.exp_fraction()),
            aggregate_level: profile.aggregate_level(),
        }
    }

    // ─── Internals ─────────────────────────────────────────────────────────

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidSessionState {
            operation,
            phase: self.phase(),
        }
    }

    fn open_question(&mut self, operation: &'static str) -> Result<&mut Live, SessionError> {
        let phase = self.phase();
        match &mut self.phase {
            Phase::Active(live) if !live.answered => Ok(live.as_mut()),
            _ => Err(SessionError::InvalidSessionState { operation, phase }),
        }
    }

    fn build_question(&mut self, spec: &Arc<QuestionSpec>) -> Box<dyn QuestionType> {
        let created = self.registry.create(Arc::clone(spec));
        self.warnings.extend(created.warning);
        created.question
    }

    fn queue_progression(cues: &mut VecDeque<Cue>, milestones: &mut VecDeque<Milestone>, grant: &ExpGrant) {
        for event in &grant.events {
            match event {
                ProgressionEvent::LevelUp { .. } => cues.push_back(Cue::LevelUp),
                ProgressionEvent::MilestoneReached { milestone } => milestones.push_back(*milestone),
                ProgressionEvent::EquipmentUnlocked { .. } => {}
            }
        }
    }

    fn end(&mut self, profile: &mut PlayerProfile, reason: EndReason) -> Result<SessionResult, SessionError> {
        let live = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active(live) => live,
            other => {
                self.phase = other;
                return Err(self.invalid("end"));
            }
        };
        self.generation += 1;

        let exp_gained = self.rules.end_of_session_exp(live.state.score);
        let grant = self
            .progression
            .grant_exp(profile, &live.prepared.stage.id, exp_gained);
        Self::queue_progression(&mut self.cues, &mut self.milestones, &grant);
        self.cues.push_back(Cue::ResultEntry);

        let result = SessionResult {
            session_id: live.id,
            stage: live.prepared.stage.id.clone(),
            final_score: live.state.score,
            session_correct_count: live.state.session_correct_count,
            questions_answered: live.state.questions_answered,
            max_combo: live.state.max_combo,
            exp_gained,
            leveled_up: grant.leveled_up(),
            aggregate_level: profile.aggregate_level(),
            end_reason: reason,
            started_at: live.started_at,
            ended_at: self.clock.now().max(live.started_at),
        };
        info!(
            target: "quiz::session",
            session_id = %result.session_id,
            stage = %result.stage,
            reason = reason.as_str(),
            score = result.final_score,
            correct = result.session_correct_count,
            questions = result.questions_answered,
            exp = exp_gained,
            leveled_up = result.leveled_up,
            "session ended"
        );
        self.phase = Phase::Ended(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CorrectAnswer, EquipmentCatalog, MULTIPLE_CHOICE_TAG, SINGLE_CHOICE_TAG, StageProgress,
    };
    use crate::question::OptionMark;
    use crate::time::{fixed_clock, fixed_now};

    fn stage(locked: bool) -> StageInfo {
        StageInfo {
            id: StageId::new("ai"),
            name: "AI".into(),
            icon: String::new(),
            description: String::new(),
            quiz_file: "ai.json".into(),
            locked,
            coming_soon: false,
        }
    }

    fn single(n: usize) -> Vec<QuestionSpec> {
        (0..n)
            .map(|i| {
                QuestionSpec::new(
                    format!("single {i}"),
                    vec!["right".into(), "wrong".into(), "also wrong".into()],
                    SINGLE_CHOICE_TAG,
                    CorrectAnswer::Single(0),
                    "AI",
                    1,
                )
                .unwrap()
            })
            .collect()
    }

    fn multi() -> Vec<QuestionSpec> {
        vec![
            QuestionSpec::new(
                "pick two",
                vec!["a".into(), "b".into(), "c".into()],
                MULTIPLE_CHOICE_TAG,
                CorrectAnswer::multiple([0, 2]),
                "AI",
                1,
            )
            .unwrap(),
        ]
    }

    fn scheduler() -> SessionScheduler {
        let rules = GameRules::default();
        let progression = ProgressionEngine::new(&rules, EquipmentCatalog::default());
        SessionScheduler::new(rules, QuestionRegistry::default(), progression)
            .with_seed(42)
            .with_clock(fixed_clock())
    }

    fn profile() -> PlayerProfile {
        PlayerProfile::with_default_stages(100, 0.8, fixed_now())
    }

    fn start(s: &mut SessionScheduler, p: &PlayerProfile, questions: Vec<QuestionSpec>) {
        assert_eq!(s.select_stage(p, stage(false), questions).unwrap(), 3);
        assert_eq!(s.countdown_tick(p).unwrap(), Countdown::Remaining(2));
        assert_eq!(s.countdown_tick(p).unwrap(), Countdown::Remaining(1));
        assert!(matches!(s.countdown_tick(p).unwrap(), Countdown::Started(_)));
        assert_eq!(s.phase(), SessionPhase::Active);
    }

    fn answer_and_advance(s: &mut SessionScheduler, p: &mut PlayerProfile, pick: usize) -> AnswerOutcome {
        let out = s.answer(p, Candidate::Single(pick)).unwrap();
        assert!(matches!(s.advance_question(p, out.continuation).unwrap(), Advance::Next(_)));
        out
    }

    #[test]
    fn countdown_leads_into_a_fresh_session() {
        let mut s = scheduler();
        let p = profile();
        assert_eq!(s.phase(), SessionPhase::Idle);
        start(&mut s, &p, single(4));

        let state = s.state().unwrap();
        assert_eq!(state.score(), 0);
        assert_eq!(state.combo(), 0);
        assert_eq!(state.time_remaining(), 60);
        assert_eq!(state.questions_answered(), 1);
        assert_eq!(s.drain_cues(), vec![Cue::Tick; 4]);
    }

    #[test]
    fn consecutive_correct_answers_build_combo_score() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(5));

        let gains: Vec<u32> = (0..3)
            .map(|_| answer_and_advance(&mut s, &mut p, 0).score_gained)
            .collect();
        assert_eq!(gains, vec![120, 140, 160]);

        let state = s.state().unwrap();
        assert_eq!(state.score(), 420);
        assert_eq!(state.max_combo(), 3);
        assert_eq!(state.session_correct_count(), 3);
        // 12 + 14 + 16 exp granted immediately.
        assert_eq!(p.stage(&StageId::new("ai")).map(StageProgress::exp), Some(42));
        assert_eq!(p.total_answers(), 3);
    }

    #[test]
    fn wrong_answer_resets_combo_without_exp() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(5));

        answer_and_advance(&mut s, &mut p, 0);
        let out = answer_and_advance(&mut s, &mut p, 1);
        assert!(!out.is_correct);
        assert_eq!(out.score_gained, 0);
        assert!(out.exp.events.is_empty());
        assert_eq!(out.outcome.mark(0), Some(OptionMark::CorrectRevealed));

        let out = answer_and_advance(&mut s, &mut p, 0);
        assert_eq!(out.score_gained, 120);
        assert_eq!(s.state().unwrap().max_combo(), 1);
        assert_eq!(p.max_combo_ever(), 1);
        assert_eq!((p.total_answers(), p.total_correct()), (3, 2));
    }

    #[test]
    fn sixty_ticks_end_the_session_once() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(3));
        answer_and_advance(&mut s, &mut p, 0);
        s.drain_cues();

        let mut ended = Vec::new();
        for _ in 0..60 {
            if let Tick::Ended(result) = s.tick(&mut p).unwrap() {
                ended.push(result);
            }
        }
        assert_eq!(ended.len(), 1);
        let result = &ended[0];
        assert_eq!(result.end_reason, EndReason::TimeUp);
        assert_eq!(result.final_score, 120);
        assert_eq!(result.exp_gained, 12);
        assert_eq!(result.questions_answered, 2);
        assert_eq!(s.phase(), SessionPhase::Ended);
        assert_eq!(s.drain_cues(), vec![Cue::ResultEntry]);

        let err = s.answer(&mut p, Candidate::Single(0)).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidSessionState {
                operation: "answer",
                phase: SessionPhase::Ended,
            }
        );
        assert!(s.tick(&mut p).is_err());
        assert_eq!(s.result(), Some(result));
    }

    #[test]
    fn end_of_session_grant_uses_score_over_ten() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(5));
        for _ in 0..3 {
            answer_and_advance(&mut s, &mut p, 0);
        }
        let result = s.finish(&mut p).unwrap();
        assert_eq!(result.end_reason, EndReason::Finished);
        assert_eq!(result.exp_gained, 42);
        assert!(!result.leveled_up);
        assert_eq!(p.stage(&StageId::new("ai")).map(StageProgress::exp), Some(84));
        assert!(result.clone().validate().is_ok());
    }

    #[test]
    fn continuation_is_stale_after_the_session_ends() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(3));
        let out = s.answer(&mut p, Candidate::Single(0)).unwrap();
        s.finish(&mut p).unwrap();
        assert_eq!(s.advance_question(&mut p, out.continuation).unwrap(), Advance::Stale);
        assert_eq!(s.phase(), SessionPhase::Ended);
    }

    #[test]
    fn continuation_redeems_once() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(3));
        let out = s.answer(&mut p, Candidate::Single(0)).unwrap();
        assert!(matches!(s.advance_question(&mut p, out.continuation).unwrap(), Advance::Next(_)));
        assert_eq!(s.advance_question(&mut p, out.continuation).unwrap(), Advance::Stale);
        assert_eq!(s.state().unwrap().questions_answered(), 2);
    }

    #[test]
    fn answered_question_is_locked_until_advance() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(3));
        s.answer(&mut p, Candidate::Single(0)).unwrap();
        assert!(matches!(
            s.answer(&mut p, Candidate::Single(0)),
            Err(SessionError::InvalidSessionState { .. })
        ));
        assert!(s.select_option(&mut p, 0).is_err());
        assert_eq!(s.state().unwrap().score(), 120);
    }

    #[test]
    fn exhausted_order_reshuffles() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(2));
        for _ in 0..7 {
            answer_and_advance(&mut s, &mut p, 1);
        }
        let state = s.state().unwrap();
        assert_eq!(state.questions_answered(), 8);
        assert_eq!(state.order().passes(), 4);
    }

    #[test]
    fn multi_choice_goes_through_confirm() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, multi());
        s.drain_cues();

        assert_eq!(
            s.confirm(&mut p).unwrap_err(),
            SessionError::Question(QuestionError::EmptySelection)
        );
        assert!(s.drain_cues().is_empty());

        assert!(matches!(s.select_option(&mut p, 2).unwrap(), Selection::Pending(_)));
        assert!(matches!(s.select_option(&mut p, 0).unwrap(), Selection::Pending(_)));
        assert_eq!(
            s.select_option(&mut p, 9).unwrap_err(),
            SessionError::Question(QuestionError::OptionOutOfRange { index: 9, len: 3 })
        );
        let out = s.confirm(&mut p).unwrap();
        assert!(out.is_correct);
        assert_eq!(
            s.drain_cues(),
            vec![Cue::Click, Cue::Click, Cue::Click, Cue::Correct]
        );
    }

    #[test]
    fn empty_multi_candidate_leaves_the_question_open() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, multi());
        s.drain_cues();

        assert_eq!(
            s.answer(&mut p, Candidate::multiple([])).unwrap_err(),
            SessionError::Question(QuestionError::EmptySelection)
        );
        assert_eq!(p.total_answers(), 0);
        assert!(s.drain_cues().is_empty());

        let out = s.answer(&mut p, Candidate::multiple([2, 0])).unwrap();
        assert!(out.is_correct);
        assert_eq!(s.state().unwrap().combo(), 1);
    }

    #[test]
    fn unknown_type_tag_warning_is_queued() {
        let mut s = scheduler();
        let mut p = profile();
        let odd = vec![
            QuestionSpec::new("order these", vec!["x".into(), "y".into()], "sort", CorrectAnswer::Single(1), "AI", 1)
                .unwrap(),
        ];
        start(&mut s, &p, odd);
        assert_eq!(
            s.drain_warnings(),
            vec![QuestionWarning::UnknownQuestionType {
                tag: "sort".into(),
                fallback: SINGLE_CHOICE_TAG,
            }]
        );

        answer_and_advance(&mut s, &mut p, 1);
        assert_eq!(s.drain_warnings().len(), 1);
        assert!(s.drain_warnings().is_empty());
    }

    #[test]
    fn exclusive_click_answers_immediately() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(2));
        match s.select_option(&mut p, 0).unwrap() {
            Selection::Answered(out) => assert!(out.is_correct),
            Selection::Pending(_) => panic!("exclusive choice must answer on click"),
        }
    }

    #[test]
    fn locked_stage_and_empty_pool_are_rejected() {
        let mut s = scheduler();
        let p = profile();
        assert_eq!(
            s.select_stage(&p, stage(true), single(2)).unwrap_err(),
            SessionError::StageLocked(StageId::new("ai"))
        );

        let hard = vec![
            QuestionSpec::new("later", vec!["x".into()], SINGLE_CHOICE_TAG, CorrectAnswer::Single(0), "AI", 3)
                .unwrap(),
        ];
        assert_eq!(
            s.select_stage(&p, stage(false), hard).unwrap_err(),
            SessionError::NoEligibleQuestions {
                stage: StageId::new("ai"),
                stage_level: 1,
            }
        );
        assert_eq!(s.phase(), SessionPhase::Idle);
    }

    #[test]
    fn hatch_milestone_is_queued_once() {
        let mut s = scheduler();
        let mut draft = profile().to_draft();
        draft
            .stages
            .insert(StageId::new("ai"), StageProgress::from_persisted(4, 330, 337).unwrap());
        let mut p = PlayerProfile::from_draft(draft, 0.8).unwrap();
        start(&mut s, &p, single(3));

        let out = answer_and_advance(&mut s, &mut p, 0);
        assert!(out.exp.leveled_up());
        assert!(p.hatched());
        assert_eq!(s.drain_milestones(), vec![Milestone::Hatched]);
        assert!(s.drain_milestones().is_empty());
        assert!(s.drain_cues().contains(&Cue::LevelUp));
    }

    #[test]
    fn snapshot_reflects_live_counters() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(3));
        answer_and_advance(&mut s, &mut p, 0);
        s.tick(&mut p).unwrap();

        let snap = s.snapshot(&p);
        assert_eq!(snap.phase, SessionPhase::Active);
        assert_eq!(snap.score, 120);
        assert_eq!(snap.combo, 1);
        assert_eq!(snap.time_remaining, 59);
        assert_eq!(snap.question_number, 2);
        assert!((snap.exp_fraction - 0.12).abs() < f64::EPSILON);
    }

    #[test]
    fn abandon_invalidates_pending_work() {
        let mut s = scheduler();
        let mut p = profile();
        start(&mut s, &p, single(3));
        let out = s.answer(&mut p, Candidate::Single(0)).unwrap();
        let before = s.generation();
        s.abandon();
        assert!(s.generation() > before);
        assert_eq!(s.phase(), SessionPhase::Idle);
        assert_eq!(s.advance_question(&mut p, out.continuation).unwrap(), Advance::Stale);
        assert!(s.countdown_tick(&p).is_err());
    }
}
