use std::fmt;
use std::path::{Path, PathBuf};

use quiz_core::GameRules;
use quiz_core::model::{CharacterId, StageId};
use tracing::info;

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidSeed { raw: String },
    InvalidStage { raw: String },
    InvalidCharacter { raw: String },
    MissingName,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
            ArgsError::InvalidStage { raw } => write!(f, "invalid --stage value: {raw}"),
            ArgsError::InvalidCharacter { raw } => {
                write!(f, "invalid character: {raw} (expected fire, water or leaf)")
            }
            ArgsError::MissingName => write!(f, "name requires a player name"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quiz [play] [--stage <id>] [--seed <n>] [options]");
    eprintln!("  quiz status [--json] [options]");
    eprintln!("  quiz name <player name> [options]");
    eprintln!("  quiz character <fire|water|leaf> [options]");
    eprintln!("  quiz reset [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     default sqlite://quiz.sqlite3");
    eprintln!("  --assets <dir>        default ./data");
    eprintln!("  --rules <file.toml>   game rules overrides");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_ASSETS_DIR, QUIZ_RULES_PATH, LOG_LEVEL, LOG_FORMAT");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play,
    Status,
    Name(String),
    Character(CharacterId),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub command: Command,
    pub db_url: String,
    pub assets_dir: PathBuf,
    pub rules_path: Option<PathBuf>,
    pub stage: Option<StageId>,
    pub seed: Option<u64>,
    pub json: bool,
}

impl Args {
    /// Flags win over environment variables, which win over defaults.
    pub fn parse(
        argv: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut args = Self {
            command: Command::Play,
            db_url: env("QUIZ_DB_URL").map_or_else(|| "sqlite://quiz.sqlite3".into(), normalize_sqlite_url),
            assets_dir: env("QUIZ_ASSETS_DIR").map_or_else(|| PathBuf::from("./data"), PathBuf::from),
            rules_path: env("QUIZ_RULES_PATH").map(PathBuf::from),
            stage: None,
            seed: None,
            json: false,
        };

        let mut iter = argv.into_iter().peekable();
        let subcommand = match iter.peek().map(String::as_str) {
            Some("play" | "status" | "name" | "character" | "reset") => iter.next(),
            _ => None,
        };

        let mut positional = Vec::new();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut iter, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    args.db_url = normalize_sqlite_url(value);
                }
                "--assets" => args.assets_dir = PathBuf::from(require_value(&mut iter, "--assets")?),
                "--rules" => args.rules_path = Some(PathBuf::from(require_value(&mut iter, "--rules")?)),
                "--stage" => {
                    let value = require_value(&mut iter, "--stage")?;
                    let stage = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidStage { raw: value.clone() })?;
                    args.stage = Some(stage);
                }
                "--seed" => {
                    let value = require_value(&mut iter, "--seed")?;
                    let seed = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSeed { raw: value.clone() })?;
                    args.seed = Some(seed);
                }
                "--json" => args.json = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        args.command = match subcommand.as_deref() {
            None | Some("play") => Command::Play,
            Some("status") => Command::Status,
            Some("reset") => Command::Reset,
            Some("name") => {
                let name = positional.join(" ");
                if name.trim().is_empty() {
                    return Err(ArgsError::MissingName);
                }
                positional.clear();
                Command::Name(name)
            }
            Some("character") => {
                if positional.is_empty() {
                    return Err(ArgsError::MissingValue { flag: "character" });
                }
                let raw = positional.remove(0);
                let id: CharacterId = raw
                    .parse()
                    .map_err(|_| ArgsError::InvalidCharacter { raw: raw.clone() })?;
                Command::Character(id)
            }
            Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
        };
        if let Some(extra) = positional.into_iter().next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        Ok(args)
    }
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its directory so `SQLite` can open it.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Rules from an optional TOML file; missing keys keep their defaults.
pub fn load_rules(path: Option<&Path>) -> Result<GameRules, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(GameRules::default());
    };
    let text = std::fs::read_to_string(path)?;
    let rules = parse_rules(&text)?;
    info!(target: "quiz::app", path = %path.display(), "game rules loaded");
    Ok(rules)
}

fn parse_rules(text: &str) -> Result<GameRules, toml::de::Error> {
    toml::from_str(text)
}
