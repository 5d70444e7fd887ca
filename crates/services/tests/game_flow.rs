use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::GameRules;
use quiz_core::model::{
    CorrectAnswer, EndReason, MULTIPLE_CHOICE_TAG, PlayerProfile, ProfileDraft, QuestionSpec,
    SINGLE_CHOICE_TAG, StageId, StageInfo, StageProgress,
};
use quiz_core::progression::Milestone;
use quiz_core::question::SelectionMode;
use quiz_core::session::{Cue, SessionPhase};
use quiz_core::time::fixed_now;
use services::{AppServices, Clock, GameCommand, GameError, GameEvent, GameHandle};
use storage::assets::StaticQuestionSource;
use storage::repository::{
    InMemoryRepository, ProfileRepository, SessionHistoryRepository, Storage, StorageError,
};

fn stage(id: &str, locked: bool) -> StageInfo {
    StageInfo {
        id: StageId::new(id),
        name: format!("{id} stage"),
        icon: String::new(),
        description: String::new(),
        quiz_file: format!("{id}.json"),
        locked,
        coming_soon: false,
    }
}

fn single(text: &str) -> QuestionSpec {
    QuestionSpec::new(
        text,
        vec!["right".into(), "wrong".into(), "also wrong".into()],
        SINGLE_CHOICE_TAG,
        CorrectAnswer::Single(0),
        "ai stage",
        1,
    )
    .unwrap()
}

fn source() -> Arc<StaticQuestionSource> {
    let multi = QuestionSpec::new(
        "Pick the vowels",
        vec!["a".into(), "b".into(), "e".into()],
        MULTIPLE_CHOICE_TAG,
        CorrectAnswer::multiple([0, 2]),
        "multi stage",
        1,
    )
    .unwrap();
    Arc::new(
        StaticQuestionSource::new()
            .with_stage(stage("ai", false), vec![single("Q1"), single("Q2"), single("Q3")])
            .with_stage(stage("multi", false), vec![multi])
            .with_stage(stage("vault", true), vec![single("Q4")]),
    )
}

fn services(storage: &Storage) -> AppServices {
    AppServices::new(storage, GameRules::default(), Clock::fixed(fixed_now()))
}

async fn next_until(handle: &mut GameHandle, mut pred: impl FnMut(&GameEvent) -> bool) -> GameEvent {
    loop {
        let event = handle.next_event().await.expect("driver alive");
        if pred(&event) {
            return event;
        }
    }
}

async fn start_stage(handle: &mut GameHandle, id: &str) {
    handle
        .send(GameCommand::SelectStage(StageId::new(id)))
        .unwrap();
    let started = next_until(handle, |e| matches!(e, GameEvent::CountdownStarted { .. })).await;
    assert!(matches!(started, GameEvent::CountdownStarted { remaining: 3, .. }));
    next_until(handle, |e| matches!(e, GameEvent::Question { .. })).await;
}

#[tokio::test(start_paused = true)]
async fn answer_then_time_up_persists_profile_and_history() {
    let storage = Storage::in_memory();
    let app = services(&storage);
    let (mut handle, task) = app.start_game(source(), Some(7)).await.unwrap();

    handle
        .send(GameCommand::SelectStage(StageId::new("ai")))
        .unwrap();
    assert_eq!(handle.next_event().await, Some(GameEvent::Cue(Cue::Tick)));
    let first = next_until(&mut handle, |e| matches!(e, GameEvent::Question { .. })).await;
    let GameEvent::Question { descriptor, snapshot } = first else {
        unreachable!()
    };
    assert_eq!(descriptor.mode, SelectionMode::Exclusive);
    assert_eq!(snapshot.phase, SessionPhase::Active);
    assert_eq!(snapshot.question_number, 1);
    assert_eq!(snapshot.time_remaining, 60);

    handle.send(GameCommand::SelectOption(0)).unwrap();
    let answered = next_until(&mut handle, |e| matches!(e, GameEvent::Answered { .. })).await;
    let GameEvent::Answered {
        is_correct,
        score_gained,
        snapshot,
        ..
    } = answered
    else {
        unreachable!()
    };
    assert!(is_correct);
    assert_eq!(score_gained, 120);
    assert_eq!(snapshot.combo, 1);

    let second = next_until(&mut handle, |e| matches!(e, GameEvent::Question { .. })).await;
    let GameEvent::Question { snapshot, .. } = second else {
        unreachable!()
    };
    assert_eq!(snapshot.question_number, 2);

    let ended = next_until(&mut handle, |e| matches!(e, GameEvent::Ended { .. })).await;
    let GameEvent::Ended {
        result, record_id, ..
    } = ended
    else {
        unreachable!()
    };
    assert_eq!(result.end_reason, EndReason::TimeUp);
    assert_eq!(result.final_score, 120);
    assert_eq!(result.session_correct_count, 1);
    assert_eq!(result.questions_answered, 2);
    assert_eq!(result.exp_gained, 12);

    handle.send(GameCommand::Shutdown).unwrap();
    let profile = task.await.unwrap().unwrap();
    assert_eq!(profile.total_answers(), 1);
    assert_eq!(profile.stage(&StageId::new("ai")).unwrap().exp(), 24);

    let draft = storage.profiles.load_profile().await.unwrap().unwrap();
    assert_eq!(draft.total_correct, 1);
    let history = storage.sessions.list_recent_sessions(5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record_id);
    assert_eq!(history[0].result, result);
}

#[tokio::test(start_paused = true)]
async fn bad_commands_are_rejected_without_stopping_the_driver() {
    let storage = Storage::in_memory();
    let app = services(&storage);
    let (mut handle, task) = app.start_game(source(), Some(1)).await.unwrap();

    for command in [
        GameCommand::SelectStage(StageId::new("vault")),
        GameCommand::SelectStage(StageId::new("missing")),
        GameCommand::SelectOption(0),
        GameCommand::Finish,
    ] {
        handle.send(command).unwrap();
        let event = next_until(&mut handle, |e| matches!(e, GameEvent::Rejected { .. })).await;
        assert!(matches!(event, GameEvent::Rejected { .. }));
    }

    start_stage(&mut handle, "ai").await;
    handle.send(GameCommand::SelectOption(9)).unwrap();
    let GameEvent::Rejected { reason } =
        next_until(&mut handle, |e| matches!(e, GameEvent::Rejected { .. })).await
    else {
        unreachable!()
    };
    assert!(reason.contains("outside"));

    handle.send(GameCommand::Shutdown).unwrap();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn multi_choice_needs_a_selection_before_confirm() {
    let storage = Storage::in_memory();
    let app = services(&storage);
    let (mut handle, task) = app.start_game(source(), Some(3)).await.unwrap();
    start_stage(&mut handle, "multi").await;

    handle.send(GameCommand::Confirm).unwrap();
    next_until(&mut handle, |e| matches!(e, GameEvent::Rejected { .. })).await;

    handle.send(GameCommand::SelectOption(0)).unwrap();
    handle.send(GameCommand::SelectOption(2)).unwrap();
    next_until(&mut handle, |e| matches!(e, GameEvent::SelectionChanged { .. })).await;
    let GameEvent::SelectionChanged { descriptor } =
        next_until(&mut handle, |e| matches!(e, GameEvent::SelectionChanged { .. })).await
    else {
        unreachable!()
    };
    let selected: Vec<usize> = descriptor
        .slots
        .iter()
        .filter(|s| s.selected)
        .map(|s| s.index)
        .collect();
    assert_eq!(selected, vec![0, 2]);

    handle.send(GameCommand::Confirm).unwrap();
    let answered = next_until(&mut handle, |e| matches!(e, GameEvent::Answered { .. })).await;
    assert!(matches!(answered, GameEvent::Answered { is_correct: true, .. }));

    handle.send(GameCommand::Shutdown).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn finish_and_abandon_control_history() {
    let storage = Storage::in_memory();
    let app = services(&storage);
    let (mut handle, task) = app.start_game(source(), Some(5)).await.unwrap();

    handle
        .send(GameCommand::SelectStage(StageId::new("ai")))
        .unwrap();
    next_until(&mut handle, |e| matches!(e, GameEvent::CountdownStarted { .. })).await;
    handle.send(GameCommand::Abandon).unwrap();
    next_until(&mut handle, |e| matches!(e, GameEvent::Abandoned)).await;

    start_stage(&mut handle, "ai").await;
    handle.send(GameCommand::Finish).unwrap();
    let GameEvent::Ended { result, .. } =
        next_until(&mut handle, |e| matches!(e, GameEvent::Ended { .. })).await
    else {
        unreachable!()
    };
    assert_eq!(result.end_reason, EndReason::Finished);
    assert_eq!(result.final_score, 0);

    handle
        .send(GameCommand::NameCharacter("  Pip ".into()))
        .unwrap();
    let named = next_until(&mut handle, |e| matches!(e, GameEvent::CharacterNamed { .. })).await;
    assert_eq!(named, GameEvent::CharacterNamed { name: "Pip".into() });

    handle.send(GameCommand::Shutdown).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(storage.sessions.list_recent_sessions(5).await.unwrap().len(), 1);
    let draft = storage.profiles.load_profile().await.unwrap().unwrap();
    assert_eq!(draft.character_name, "Pip");
}

fn kind(event: &GameEvent) -> &'static str {
    match event {
        GameEvent::Question { .. } => "question",
        GameEvent::Answered { .. } => "answered",
        GameEvent::Milestone(_) => "milestone",
        GameEvent::Ended { .. } => "ended",
        _ => "other",
    }
}

#[tokio::test(start_paused = true)]
async fn hatch_is_announced_after_the_result() {
    let storage = Storage::in_memory();
    let mut draft = PlayerProfile::with_default_stages(100, 0.8, fixed_now()).to_draft();
    draft
        .stages
        .insert(StageId::new("ai"), StageProgress::from_persisted(4, 330, 337).unwrap());
    let profile = PlayerProfile::from_draft(draft, 0.8).unwrap();
    storage.profiles.save_profile(&profile).await.unwrap();

    let app = services(&storage);
    let (mut handle, task) = app.start_game(source(), Some(11)).await.unwrap();
    start_stage(&mut handle, "ai").await;
    handle.send(GameCommand::SelectOption(0)).unwrap();

    let mut seen = Vec::new();
    loop {
        let event = handle.next_event().await.expect("driver alive");
        let kind = kind(&event);
        if kind != "other" {
            seen.push(kind);
        }
        if kind == "milestone" {
            assert_eq!(event, GameEvent::Milestone(Milestone::Hatched));
            break;
        }
    }
    assert_eq!(seen.first(), Some(&"answered"));
    assert_eq!(&seen[seen.len() - 2..], &["ended", "milestone"]);
    assert_eq!(seen.iter().filter(|k| **k == "milestone").count(), 1);

    handle.send(GameCommand::Shutdown).unwrap();
    let profile = task.await.unwrap().unwrap();
    assert!(profile.hatched());
}

struct BrokenProfiles;

#[async_trait]
impl ProfileRepository for BrokenProfiles {
    async fn load_profile(&self) -> Result<Option<ProfileDraft>, StorageError> {
        Ok(None)
    }

    async fn save_profile(&self, _profile: &PlayerProfile) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk full".into()))
    }

    async fn delete_profile(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn storage_failure_stops_the_driver() {
    let sessions: Arc<dyn SessionHistoryRepository> = Arc::new(InMemoryRepository::new());
    let storage = Storage {
        profiles: Arc::new(BrokenProfiles),
        sessions,
    };
    let app = services(&storage);
    let (mut handle, task) = app.start_game(source(), Some(9)).await.unwrap();
    start_stage(&mut handle, "ai").await;

    handle.send(GameCommand::SelectOption(0)).unwrap();
    let err = task.await.unwrap().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, GameError::Profile(_)));
}
