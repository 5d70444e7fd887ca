use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type tag of the exclusive (single answer) question variant.
pub const SINGLE_CHOICE_TAG: &str = "single-choice";
/// Type tag of the multi-select question variant.
pub const MULTIPLE_CHOICE_TAG: &str = "multiple-choice";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("question must have at least one option")]
    EmptyOptions,

    #[error("correct answer index {index} is outside {len} options")]
    AnswerOutOfRange { index: usize, len: usize },

    #[error("multi-choice answer set cannot be empty")]
    EmptyAnswerSet,

    #[error("minimum level must be >= 1")]
    InvalidMinLevel,

    #[error("selected option {index} is outside {len} options")]
    OptionOutOfRange { index: usize, len: usize },

    #[error("nothing selected")]
    EmptySelection,

    #[error("question type `{0}` has no confirm step")]
    ConfirmNotSupported(&'static str),
}

//
// ─── CORRECT ANSWER ────────────────────────────────────────────────────────────
//

/// The answer key of a question.
///
/// Exclusive-choice questions carry a single option index, multi-choice
/// questions an unordered set of indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Single(usize),
    Multiple(BTreeSet<usize>),
}

impl CorrectAnswer {
    /// Builds a multi-choice answer key from any iterator of indices.
    pub fn multiple(indices: impl IntoIterator<Item = usize>) -> Self {
        Self::Multiple(indices.into_iter().collect())
    }

    /// Returns true if `index` belongs to the answer key.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        match self {
            Self::Single(i) => *i == index,
            Self::Multiple(set) => set.contains(&index),
        }
    }

    /// All answer indices as a set.
    #[must_use]
    pub fn indices(&self) -> BTreeSet<usize> {
        match self {
            Self::Single(i) => BTreeSet::from([*i]),
            Self::Multiple(set) => set.clone(),
        }
    }

    fn max_index(&self) -> Option<usize> {
        match self {
            Self::Single(i) => Some(*i),
            Self::Multiple(set) => set.last().copied(),
        }
    }
}

//
// ─── QUESTION SPEC ─────────────────────────────────────────────────────────────
//

/// Immutable description of one quiz question.
///
/// Construction validates that every answer index points into `options`, so
/// question variants can index without bounds checks failing at play time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSpec {
    text: String,
    options: Vec<String>,
    type_tag: String,
    correct: CorrectAnswer,
    category: String,
    min_level: u32,
}

impl QuestionSpec {
    /// Create a validated question.
    ///
    /// # Errors
    ///
    /// - `EmptyText` / `EmptyOptions` for missing content
    /// - `AnswerOutOfRange` if an answer index does not point into `options`
    /// - `EmptyAnswerSet` for a multi-choice key with no members
    /// - `InvalidMinLevel` if `min_level` is zero
    pub fn new(
        text: impl Into<String>,
        options: Vec<String>,
        type_tag: impl Into<String>,
        correct: CorrectAnswer,
        category: impl Into<String>,
        min_level: u32,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if options.is_empty() {
            return Err(QuestionError::EmptyOptions);
        }
        if let CorrectAnswer::Multiple(set) = &correct {
            if set.is_empty() {
                return Err(QuestionError::EmptyAnswerSet);
            }
        }
        if let Some(max) = correct.max_index() {
            if max >= options.len() {
                return Err(QuestionError::AnswerOutOfRange {
                    index: max,
                    len: options.len(),
                });
            }
        }
        if min_level == 0 {
            return Err(QuestionError::InvalidMinLevel);
        }

        Ok(Self {
            text,
            options,
            type_tag: type_tag.into(),
            correct,
            category: category.into(),
            min_level,
        })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    #[must_use]
    pub fn correct(&self) -> &CorrectAnswer {
        &self.correct
    }

    /// Display name of the stage this question belongs to.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    /// Returns true if a player at `stage_level` may be asked this question.
    #[must_use]
    pub fn is_eligible(&self, stage_level: u32) -> bool {
        self.min_level <= stage_level
    }
}
