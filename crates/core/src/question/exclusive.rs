use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{QuestionError, QuestionSpec, SINGLE_CHOICE_TAG};
use crate::question::{
    Candidate, OptionMark, OptionSlot, OutcomeDescriptor, QuestionType, RenderDescriptor,
    SelectionMode, SelectionStep, check_index, option_label,
};

/// Single answer question: the first click is the answer.
#[derive(Debug, Clone)]
pub struct ExclusiveChoice {
    spec: Arc<QuestionSpec>,
}

impl ExclusiveChoice {
    #[must_use]
    pub fn new(spec: Arc<QuestionSpec>) -> Self {
        Self { spec }
    }

    /// Registry constructor.
    #[must_use]
    pub fn boxed(spec: Arc<QuestionSpec>) -> Box<dyn QuestionType> {
        Box::new(Self::new(spec))
    }
}

impl QuestionType for ExclusiveChoice {
    fn spec(&self) -> &QuestionSpec {
        &self.spec
    }

    fn variant_tag(&self) -> &'static str {
        SINGLE_CHOICE_TAG
    }

    fn present(&self) -> RenderDescriptor {
        RenderDescriptor {
            prompt: self.spec.text().to_owned(),
            category: self.spec.category().to_owned(),
            type_tag: SINGLE_CHOICE_TAG.to_owned(),
            mode: SelectionMode::Exclusive,
            slots: self
                .spec
                .options()
                .iter()
                .enumerate()
                .map(|(index, text)| OptionSlot {
                    index,
                    label: option_label(index),
                    text: text.clone(),
                    selected: false,
                })
                .collect(),
            confirm: None,
        }
    }

    fn record_selection(&mut self, index: usize) -> Result<SelectionStep, QuestionError> {
        check_index(&self.spec, index)?;
        Ok(SelectionStep::Submitted(Candidate::Single(index)))
    }

    fn validate(&self, candidate: &Candidate) -> bool {
        match candidate {
            Candidate::Single(i) => self.spec.correct().indices() == BTreeSet::from([*i]),
            Candidate::Multiple(_) => false,
        }
    }

    fn describe_outcome(&self, is_correct: bool, candidate: &Candidate) -> OutcomeDescriptor {
        let correct = self.spec.correct();
        let marks = (0..self.spec.options().len())
            .map(|i| match (candidate.contains(i), correct.contains(i)) {
                (true, true) => OptionMark::CorrectSelected,
                (true, false) => OptionMark::IncorrectSelected,
                (false, true) if !is_correct => OptionMark::CorrectRevealed,
                _ => OptionMark::Neutral,
            })
            .collect();
        OutcomeDescriptor { is_correct, marks }
    }
}
