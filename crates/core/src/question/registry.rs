use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::model::{MULTIPLE_CHOICE_TAG, QuestionSpec, SINGLE_CHOICE_TAG};
use crate::question::{ExclusiveChoice, MultiChoice, QuestionType};

/// Builds a question variant for one spec.
pub type QuestionConstructor = fn(Arc<QuestionSpec>) -> Box<dyn QuestionType>;

/// Non-fatal problem noticed while building a question.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionWarning {
    #[error("unknown question type `{tag}`, using `{fallback}`")]
    UnknownQuestionType { tag: String, fallback: &'static str },
}

/// A built question plus any warning raised while building it.
#[derive(Debug)]
pub struct CreatedQuestion {
    pub question: Box<dyn QuestionType>,
    pub warning: Option<QuestionWarning>,
}

/// Maps type tags to question constructors.
///
/// `create` never fails: tags without a constructor use the fallback
/// (exclusive choice unless replaced).
#[derive(Clone)]
pub struct QuestionRegistry {
    constructors: HashMap<String, QuestionConstructor>,
    fallback: QuestionConstructor,
    fallback_tag: &'static str,
}

impl fmt::Debug for QuestionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("QuestionRegistry")
            .field("tags", &tags)
            .field("fallback", &self.fallback_tag)
            .finish()
    }
}

impl Default for QuestionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SINGLE_CHOICE_TAG, ExclusiveChoice::boxed);
        registry.register(MULTIPLE_CHOICE_TAG, MultiChoice::boxed);
        registry
    }
}

impl QuestionRegistry {
    /// A registry with no tags; everything goes to the exclusive fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            fallback: ExclusiveChoice::boxed,
            fallback_tag: SINGLE_CHOICE_TAG,
        }
    }

    /// Add or replace the constructor for `tag`. Returns the replaced one.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        constructor: QuestionConstructor,
    ) -> Option<QuestionConstructor> {
        self.constructors.insert(tag.into(), constructor)
    }

    #[must_use]
    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build the variant for `spec.type_tag()`.
    #[must_use]
    pub fn create(&self, spec: Arc<QuestionSpec>) -> CreatedQuestion {
        if let Some(constructor) = self.constructors.get(spec.type_tag()) {
            return CreatedQuestion {
                question: constructor(spec),
                warning: None,
            };
        }

        let warning = QuestionWarning::UnknownQuestionType {
            tag: spec.type_tag().to_owned(),
            fallback: self.fallback_tag,
        };
        warn!(
            target: "quiz::question",
            tag = spec.type_tag(),
            fallback = self.fallback_tag,
            "unknown question type; falling back"
        );
        CreatedQuestion {
            question: (self.fallback)(spec),
            warning: Some(warning),
        }
    }
}
