//! Stage catalog and question bank loading.
//!
//! Assets live under a root directory: `stages.json` lists the stages and
//! each stage's questions sit in `quizzes/<quizFile>`.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quiz_core::model::{
    CorrectAnswer, MULTIPLE_CHOICE_TAG, QuestionSpec, SINGLE_CHOICE_TAG, StageId, StageInfo,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

/// Raw type tag for ordering questions, which are not playable.
const SORT_TAG: &str = "sort";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssetLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown stage: {0}")]
    UnknownStage(StageId),
}

/// Where stages and their question banks come from.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `AssetLoadError` if the catalog cannot be read or parsed.
    async fn stages(&self) -> Result<Vec<StageInfo>, AssetLoadError>;

    /// Playable questions of one stage, already normalized.
    ///
    /// # Errors
    ///
    /// Returns `AssetLoadError` if the question file cannot be read or parsed.
    async fn questions(&self, stage: &StageInfo) -> Result<Vec<QuestionSpec>, AssetLoadError>;
}

//
// ─── RAW FORMAT ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    One(String),
    Many(Vec<String>),
}

impl RawAnswer {
    fn texts(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    question: String,
    options: Vec<String>,
    #[serde(rename = "type")]
    kind: String,
    answer: RawAnswer,
    #[serde(default)]
    min_level: Option<u32>,
}

fn normalize_tag(kind: &str) -> &str {
    match kind {
        "single" => SINGLE_CHOICE_TAG,
        "multiple" => MULTIPLE_CHOICE_TAG,
        other => other,
    }
}

fn resolve_answer(raw: &RawQuestion, tag: &str) -> Option<CorrectAnswer> {
    let mut indices = BTreeSet::new();
    for text in raw.answer.texts() {
        let index = raw.options.iter().position(|o| o == text)?;
        indices.insert(index);
    }
    let multi = if tag == SINGLE_CHOICE_TAG {
        false
    } else if tag == MULTIPLE_CHOICE_TAG {
        true
    } else {
        matches!(raw.answer, RawAnswer::Many(_))
    };
    if multi {
        return Some(CorrectAnswer::Multiple(indices));
    }
    match indices.len() {
        1 => indices.first().copied().map(CorrectAnswer::Single),
        _ => None,
    }
}

/// Converts a stage's raw question file into playable questions.
///
/// Ordering entries are filtered out. Entries whose answers cannot be
/// resolved against their options are dropped and logged.
///
/// # Errors
///
/// Returns the JSON error if `json` is not an array of raw questions.
pub fn parse_questions(stage: &StageInfo, json: &str) -> Result<Vec<QuestionSpec>, serde_json::Error> {
    let raw: Vec<RawQuestion> = serde_json::from_str(json)?;
    let total = raw.len();

    let mut out = Vec::with_capacity(total);
    let mut sorted_out = 0_usize;
    for (n, entry) in raw.into_iter().enumerate() {
        if entry.kind == SORT_TAG {
            sorted_out += 1;
            continue;
        }
        let tag = normalize_tag(&entry.kind).to_owned();
        let Some(correct) = resolve_answer(&entry, &tag) else {
            error!(
                target: "quiz::storage",
                stage = %stage.id,
                entry = n,
                "answer not found among options; question dropped"
            );
            continue;
        };
        let min_level = entry.min_level.filter(|l| *l > 0).unwrap_or(1);
        match QuestionSpec::new(
            entry.question,
            entry.options,
            tag,
            correct,
            stage.name.clone(),
            min_level,
        ) {
            Ok(q) => out.push(q),
            Err(err) => error!(
                target: "quiz::storage",
                stage = %stage.id,
                entry = n,
                error = %err,
                "invalid question dropped"
            ),
        }
    }

    if sorted_out > 0 {
        debug!(
            target: "quiz::storage",
            stage = %stage.id,
            before = total,
            after = total - sorted_out,
            "ordering questions filtered"
        );
    }
    Ok(out)
}

//
// ─── JSON DIRECTORY SOURCE ─────────────────────────────────────────────────────
//

/// Reads assets from a directory on disk.
#[derive(Debug, Clone)]
pub struct JsonAssetSource {
    root: PathBuf,
}

impl JsonAssetSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read(&self, path: PathBuf) -> Result<(PathBuf, String), AssetLoadError> {
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok((path, text)),
            Err(source) => Err(AssetLoadError::Io { path, source }),
        }
    }
}

#[async_trait]
impl QuestionSource for JsonAssetSource {
    async fn stages(&self) -> Result<Vec<StageInfo>, AssetLoadError> {
        let (path, text) = self.read(self.root.join("stages.json")).await?;
        serde_json::from_str(&text).map_err(|source| AssetLoadError::Json { path, source })
    }

    async fn questions(&self, stage: &StageInfo) -> Result<Vec<QuestionSpec>, AssetLoadError> {
        let (path, text) = self
            .read(self.root.join("quizzes").join(&stage.quiz_file))
            .await?;
        let questions =
            parse_questions(stage, &text).map_err(|source| AssetLoadError::Json { path, source })?;
        info!(
            target: "quiz::storage",
            stage = %stage.id,
            count = questions.len(),
            "questions loaded"
        );
        Ok(questions)
    }
}

//
// ─── STATIC SOURCE ─────────────────────────────────────────────────────────────
//

/// Fixed in-memory catalog for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionSource {
    stages: Vec<StageInfo>,
    questions: HashMap<StageId, Vec<QuestionSpec>>,
}

impl StaticQuestionSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stage(mut self, stage: StageInfo, questions: Vec<QuestionSpec>) -> Self {
        self.questions.insert(stage.id.clone(), questions);
        self.stages.push(stage);
        self
    }
}

#[async_trait]
impl QuestionSource for StaticQuestionSource {
    async fn stages(&self) -> Result<Vec<StageInfo>, AssetLoadError> {
        Ok(self.stages.clone())
    }

    async fn questions(&self, stage: &StageInfo) -> Result<Vec<QuestionSpec>, AssetLoadError> {
        self.questions
            .get(&stage.id)
            .cloned()
            .ok_or_else(|| AssetLoadError::UnknownStage(stage.id.clone()))
    }
}
