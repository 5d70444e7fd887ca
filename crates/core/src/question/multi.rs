use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{MULTIPLE_CHOICE_TAG, QuestionError, QuestionSpec};
use crate::question::{
    Candidate, ConfirmAction, OptionMark, OptionSlot, OutcomeDescriptor, QuestionType,
    RenderDescriptor, SelectionMode, SelectionStep, check_index, option_label,
};

/// Multi-select question: clicks toggle options, `confirm` submits.
///
/// Scoring is all or nothing; the submitted set must equal the answer key.
#[derive(Debug, Clone)]
pub struct MultiChoice {
    spec: Arc<QuestionSpec>,
    selected: BTreeSet<usize>,
}

impl MultiChoice {
    #[must_use]
    pub fn new(spec: Arc<QuestionSpec>) -> Self {
        Self {
            spec,
            selected: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn boxed(spec: Arc<QuestionSpec>) -> Box<dyn QuestionType> {
        Box::new(Self::new(spec))
    }

    #[must_use]
    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }
}

impl QuestionType for MultiChoice {
    fn spec(&self) -> &QuestionSpec {
        &self.spec
    }

    fn variant_tag(&self) -> &'static str {
        MULTIPLE_CHOICE_TAG
    }

    fn present(&self) -> RenderDescriptor {
        RenderDescriptor {
            prompt: self.spec.text().to_owned(),
            category: self.spec.category().to_owned(),
            type_tag: MULTIPLE_CHOICE_TAG.to_owned(),
            mode: SelectionMode::Toggle,
            slots: self
                .spec
                .options()
                .iter()
                .enumerate()
                .map(|(index, text)| OptionSlot {
                    index,
                    label: option_label(index),
                    text: text.clone(),
                    selected: self.selected.contains(&index),
                })
                .collect(),
            confirm: Some(ConfirmAction {
                label: "Confirm".to_owned(),
                enabled: !self.selected.is_empty(),
            }),
        }
    }

    fn record_selection(&mut self, index: usize) -> Result<SelectionStep, QuestionError> {
        check_index(&self.spec, index)?;
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
        Ok(SelectionStep::Pending(self.selected.clone()))
    }

    fn confirm(&mut self) -> Result<Candidate, QuestionError> {
        if self.selected.is_empty() {
            return Err(QuestionError::EmptySelection);
        }
        Ok(Candidate::Multiple(self.selected.clone()))
    }

    fn validate(&self, candidate: &Candidate) -> bool {
        candidate.indices() == self.spec.correct().indices()
    }

    fn describe_outcome(&self, is_correct: bool, candidate: &Candidate) -> OutcomeDescriptor {
        let correct = self.spec.correct();
        let marks = (0..self.spec.options().len())
            .map(|i| match (candidate.contains(i), correct.contains(i)) {
                (true, true) => OptionMark::CorrectSelected,
                (true, false) => OptionMark::IncorrectSelected,
                (false, true) => OptionMark::CorrectMissed,
                (false, false) => OptionMark::Neutral,
            })
            .collect();
        OutcomeDescriptor { is_correct, marks }
    }
}
