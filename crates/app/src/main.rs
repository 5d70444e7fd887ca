mod config;
mod telemetry;
mod terminal;

use std::sync::Arc;

use services::{AppServices, Clock};
use storage::assets::{JsonAssetSource, QuestionSource};

use crate::config::{Args, Command, load_rules, prepare_sqlite_file, print_usage};

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1), |key| std::env::var(key).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let rules = load_rules(args.rules_path.as_deref())?;

    // Open + migrate SQLite at startup; core and services never see URLs.
    prepare_sqlite_file(&args.db_url)?;
    let app = AppServices::new_sqlite(&args.db_url, rules, Clock::default()).await?;
    let profiles = app.profiles();

    match args.command {
        Command::Play => {
            let source: Arc<dyn QuestionSource> = Arc::new(JsonAssetSource::new(&args.assets_dir));
            terminal::play(&app, source, args.stage, args.seed).await
        }
        Command::Status => {
            let status = profiles.status().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                terminal::render_status(&status);
            }
            Ok(())
        }
        Command::Name(name) => {
            let profile = profiles.set_player_name(&name).await?;
            println!("Player name set to {}", profile.player_name());
            Ok(())
        }
        Command::Character(id) => {
            let profile = profiles.select_character(id).await?;
            if let Some(name) = profile.display_character_name() {
                println!("Companion set to {name}");
            }
            Ok(())
        }
        Command::Reset => {
            profiles.reset().await?;
            println!("Profile and history deleted.");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
