//! Question variants and the registry that builds them from type tags.

mod exclusive;
mod multi;
mod registry;

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::model::{QuestionError, QuestionSpec};

pub use exclusive::ExclusiveChoice;
pub use multi::MultiChoice;
pub use registry::{CreatedQuestion, QuestionConstructor, QuestionRegistry, QuestionWarning};

//
// ─── CANDIDATE ─────────────────────────────────────────────────────────────────
//

/// An answer submitted by the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Candidate {
    Single(usize),
    Multiple(BTreeSet<usize>),
}

impl Candidate {
    pub fn multiple(indices: impl IntoIterator<Item = usize>) -> Self {
        Self::Multiple(indices.into_iter().collect())
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        match self {
            Self::Single(i) => *i == index,
            Self::Multiple(set) => set.contains(&index),
        }
    }

    #[must_use]
    pub fn indices(&self) -> BTreeSet<usize> {
        match self {
            Self::Single(i) => BTreeSet::from([*i]),
            Self::Multiple(set) => set.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Multiple(set) if set.is_empty())
    }
}

//
// ─── DESCRIPTORS ───────────────────────────────────────────────────────────────
//

/// How option slots react to a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// First click answers.
    Exclusive,
    /// Clicks toggle; a separate confirm submits.
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSlot {
    pub index: usize,
    pub label: String,
    pub text: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmAction {
    pub label: String,
    pub enabled: bool,
}

/// Declarative description of a question for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderDescriptor {
    pub prompt: String,
    pub category: String,
    pub type_tag: String,
    pub mode: SelectionMode,
    pub slots: Vec<OptionSlot>,
    pub confirm: Option<ConfirmAction>,
}

/// Per-option classification after an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionMark {
    CorrectSelected,
    IncorrectSelected,
    /// Correct option the player did not pick (multi-choice).
    CorrectMissed,
    /// Correct option shown after a wrong exclusive pick.
    CorrectRevealed,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeDescriptor {
    pub is_correct: bool,
    pub marks: Vec<OptionMark>,
}

impl OutcomeDescriptor {
    #[must_use]
    pub fn mark(&self, index: usize) -> Option<OptionMark> {
        self.marks.get(index).copied()
    }
}

/// Result of routing one click into a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStep {
    /// The click is the answer.
    Submitted(Candidate),
    /// The click toggled an option; current selection attached.
    Pending(BTreeSet<usize>),
}

/// Letter label for an option slot: `A`, `B`, ... then numbers past `Z`.
#[must_use]
pub fn option_label(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => (index + 1).to_string(),
    }
}

/// Inverse of [`option_label`], case-insensitive.
#[must_use]
pub fn parse_option_label(label: &str) -> Option<usize> {
    let label = label.trim();
    let mut chars = label.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Some(usize::from(c.to_ascii_uppercase() as u8 - b'A'))
        }
        _ => label.parse::<usize>().ok().and_then(|n| n.checked_sub(1)),
    }
}

//
// ─── CAPABILITY ────────────────────────────────────────────────────────────────
//

/// Capability set every question variant implements.
///
/// One instance serves one render/answer cycle of one question.
pub trait QuestionType: Send + fmt::Debug {
    fn spec(&self) -> &QuestionSpec;

    /// Tag of the variant that actually handles the question. Differs from
    /// `spec().type_tag()` when the registry fell back.
    fn variant_tag(&self) -> &'static str;

    fn present(&self) -> RenderDescriptor;

    /// Route one click on option `index`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::OptionOutOfRange` for an index past the options.
    fn record_selection(&mut self, index: usize) -> Result<SelectionStep, QuestionError>;

    /// Submit the accumulated selection.
    ///
    /// # Errors
    ///
    /// `EmptySelection` when nothing is selected, `ConfirmNotSupported` for
    /// variants that answer on the first click.
    fn confirm(&mut self) -> Result<Candidate, QuestionError> {
        Err(QuestionError::ConfirmNotSupported(self.variant_tag()))
    }

    fn validate(&self, candidate: &Candidate) -> bool;

    fn describe_outcome(&self, is_correct: bool, candidate: &Candidate) -> OutcomeDescriptor;
}

fn check_index(spec: &QuestionSpec, index: usize) -> Result<(), QuestionError> {
    let len = spec.options().len();
    if index >= len {
        return Err(QuestionError::OptionOutOfRange { index, len });
    }
    Ok(())
}
