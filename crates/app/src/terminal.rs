//! Line-based terminal front end over the game driver.

use std::sync::Arc;

use quiz_core::model::{SessionResult, StageId, StageInfo};
use quiz_core::progression::{ExpGrant, Milestone, ProgressionEvent};
use quiz_core::question::{
    OptionMark, OutcomeDescriptor, RenderDescriptor, SelectionMode, option_label, parse_option_label,
};
use quiz_core::session::SessionSnapshot;
use services::{AppServices, GameCommand, GameEvent, ProfileStatus};
use storage::assets::QuestionSource;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// What the next input line means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Waiting,
    Answer,
    AfterResult,
}

pub async fn play(
    app: &AppServices,
    source: Arc<dyn QuestionSource>,
    stage: Option<StageId>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let stages = source.stages().await?;

    let stage = match stage {
        Some(stage) => stage,
        None => {
            print_stages(&stages);
            println!("Pick a stage id:");
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            line.trim().parse::<StageId>()?
        }
    };

    let (mut handle, task) = app.start_game(source, seed).await?;
    handle.send(GameCommand::SelectStage(stage.clone()))?;

    let mut input = Input::Waiting;
    let mut naming = false;
    let mut current: Option<RenderDescriptor> = None;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                match event {
                    GameEvent::Cue(cue) => debug!(target: "quiz::app", cue = cue.as_str(), "cue"),
                    GameEvent::CountdownStarted { stage, remaining } => {
                        println!("\n{} {}", stage.icon, stage.name);
                        println!("{remaining}...");
                    }
                    GameEvent::Countdown { remaining } => println!("{remaining}..."),
                    GameEvent::Question { descriptor, snapshot } => {
                        if snapshot.question_number == 1 {
                            println!("Go!");
                        }
                        render_question(&descriptor, &snapshot);
                        current = Some(descriptor);
                        input = Input::Answer;
                    }
                    GameEvent::SelectionChanged { descriptor } => {
                        render_slots(&descriptor);
                        current = Some(descriptor);
                    }
                    GameEvent::Answered { is_correct, outcome, score_gained, exp, snapshot } => {
                        if let Some(descriptor) = &current {
                            render_outcome(descriptor, &outcome);
                        }
                        render_answer(is_correct, score_gained, &exp, &snapshot);
                        input = Input::Waiting;
                    }
                    GameEvent::Clock { time_remaining } => {
                        if time_remaining % 15 == 0 || time_remaining <= 5 {
                            println!("  [{time_remaining}s left]");
                        }
                    }
                    GameEvent::Warning(warning) => warn!(target: "quiz::app", %warning, "question fallback"),
                    GameEvent::Milestone(Milestone::Hatched) => {
                        println!("\nYour companion hatched! Type a name for it:");
                        naming = true;
                    }
                    GameEvent::Ended { result, snapshot, .. } => {
                        render_result(&result, &snapshot);
                        println!("Enter to play again, q to quit.");
                        input = Input::AfterResult;
                    }
                    GameEvent::Abandoned => input = Input::Waiting,
                    GameEvent::CharacterNamed { name } => println!("Say hello to {name}!"),
                    GameEvent::Rejected { reason } => println!("  ! {reason}"),
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    handle.send(GameCommand::Shutdown)?;
                    break;
                };
                let line = line.trim();
                if naming && !line.is_empty() {
                    naming = false;
                    handle.send(GameCommand::NameCharacter(line.to_owned()))?;
                    continue;
                }
                match (input, line) {
                    (Input::AfterResult, "q" | "quit") => {
                        handle.send(GameCommand::Shutdown)?;
                        break;
                    }
                    (Input::AfterResult, "" | "again") => {
                        input = Input::Waiting;
                        handle.send(GameCommand::SelectStage(stage.clone()))?;
                    }
                    (Input::Answer, "q" | "quit") => handle.send(GameCommand::Finish)?,
                    (Input::Answer, "ok") => handle.send(GameCommand::Confirm)?,
                    (Input::Answer, label) => match parse_option_label(label) {
                        Some(index) => handle.send(GameCommand::SelectOption(index))?,
                        None => println!("  type an option letter"),
                    },
                    (Input::Waiting, "q" | "quit") => {
                        handle.send(GameCommand::Abandon)?;
                        handle.send(GameCommand::Shutdown)?;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    task.await??;
    Ok(())
}

fn print_stages(stages: &[StageInfo]) {
    println!("Stages:");
    for stage in stages {
        let note = if stage.coming_soon {
            " (coming soon)"
        } else if stage.locked {
            " (locked)"
        } else {
            ""
        };
        println!("  {:<10} {} {}{note}", stage.id, stage.icon, stage.name);
    }
}

fn render_question(descriptor: &RenderDescriptor, snapshot: &SessionSnapshot) {
    println!(
        "\nQ{} [{}] score {} combo {} | {}s",
        snapshot.question_number,
        descriptor.category,
        snapshot.score,
        snapshot.combo,
        snapshot.time_remaining
    );
    println!("{}", descriptor.prompt);
    render_slots(descriptor);
    if descriptor.mode == SelectionMode::Toggle {
        println!("  (toggle letters, then `ok`)");
    }
}

fn render_slots(descriptor: &RenderDescriptor) {
    for slot in &descriptor.slots {
        let tick = match (descriptor.mode, slot.selected) {
            (SelectionMode::Toggle, true) => "[x] ",
            (SelectionMode::Toggle, false) => "[ ] ",
            (SelectionMode::Exclusive, _) => "",
        };
        println!("  {tick}{}) {}", slot.label, slot.text);
    }
}

fn render_outcome(descriptor: &RenderDescriptor, outcome: &OutcomeDescriptor) {
    for slot in &descriptor.slots {
        let mark = match outcome.mark(slot.index) {
            Some(OptionMark::CorrectSelected) => "ok",
            Some(OptionMark::IncorrectSelected) => "xx",
            Some(OptionMark::CorrectMissed) => "missed",
            Some(OptionMark::CorrectRevealed) => "answer",
            Some(OptionMark::Neutral) | None => continue,
        };
        println!("  {}) {} <- {mark}", option_label(slot.index), slot.text);
    }
}

fn render_answer(is_correct: bool, score_gained: u32, exp: &ExpGrant, snapshot: &SessionSnapshot) {
    if is_correct {
        println!("Correct! +{score_gained} (combo {})", snapshot.combo);
    } else {
        println!("Incorrect.");
    }
    for event in &exp.events {
        match event {
            ProgressionEvent::LevelUp { stage, level, .. } => {
                println!("  {stage} reached level {level}!");
            }
            ProgressionEvent::EquipmentUnlocked { id } => println!("  unlocked {id}"),
            ProgressionEvent::MilestoneReached { .. } => {}
        }
    }
}

fn render_result(result: &SessionResult, snapshot: &SessionSnapshot) {
    println!("\n=== Result ===");
    println!("score        {}", result.final_score);
    println!(
        "correct      {}/{}",
        result.session_correct_count, result.questions_answered
    );
    println!("max combo    {}", result.max_combo);
    println!("exp          +{}", result.exp_gained);
    if result.leveled_up {
        println!("level up!    stage level {}", snapshot.stage_level);
    }
    println!("overall lvl  {}", result.aggregate_level);
}

pub fn render_status(status: &ProfileStatus) {
    let name = if status.player_name.is_empty() {
        "(no name)"
    } else {
        status.player_name.as_str()
    };
    println!("Player       {name}");
    if let Some(character) = &status.character {
        println!("Companion    {character} ({:?})", status.evolution);
    }
    println!("Overall lvl  {}", status.aggregate_level);
    println!(
        "Accuracy     {}% ({}/{})",
        status.accuracy_percent, status.total_correct, status.total_answers
    );
    println!("Max combo    {}", status.max_combo_ever);
    println!("Stages:");
    for stage in &status.stages {
        println!(
            "  {:<10} lvl {:<3} {}/{} exp",
            stage.id, stage.level, stage.exp, stage.max_exp
        );
    }
    if !status.equipment.is_empty() {
        println!("Equipment (+{}):", status.equipment_bonus);
        for item in &status.equipment {
            println!("  {} {} +{}", item.icon, item.name, item.bonus);
        }
    }
    if !status.recent.is_empty() {
        println!("Recent sessions:");
        for result in &status.recent {
            println!(
                "  {} {:<10} score {:<5} {}/{} correct",
                result.ended_at.format("%Y-%m-%d %H:%M"),
                result.stage,
                result.final_score,
                result.session_correct_count,
                result.questions_answered
            );
        }
    }
}
