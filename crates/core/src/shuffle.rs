use std::borrow::Borrow;

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

use crate::model::QuestionSpec;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no questions are eligible at stage level {stage_level}")]
pub struct NoEligibleQuestions {
    pub stage_level: u32,
}

/// Indices of the questions a player at `stage_level` may be asked.
#[must_use]
pub fn eligible_indices<Q: Borrow<QuestionSpec>>(questions: &[Q], stage_level: u32) -> Vec<usize> {
    questions
        .iter()
        .enumerate()
        .filter(|(_, q)| Borrow::<QuestionSpec>::borrow(*q).is_eligible(stage_level))
        .map(|(i, _)| i)
        .collect()
}

/// Shuffled traversal over the eligible questions of one stage.
///
/// Each pass visits every eligible index exactly once. When a pass is used
/// up the eligible set is recomputed for the current stage level and
/// shuffled again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOrder {
    order: Vec<usize>,
    cursor: usize,
    passes: u32,
}

impl QuestionOrder {
    /// First pass over the eligible questions.
    ///
    /// # Errors
    ///
    /// Returns `NoEligibleQuestions` if no question passes the level filter.
    pub fn shuffled<Q: Borrow<QuestionSpec>, R: Rng + ?Sized>(
        questions: &[Q],
        stage_level: u32,
        rng: &mut R,
    ) -> Result<Self, NoEligibleQuestions> {
        let order = shuffled_pass(questions, stage_level, rng)?;
        Ok(Self {
            order,
            cursor: 0,
            passes: 1,
        })
    }

    /// Draw the next question index, reshuffling when the pass is used up.
    ///
    /// # Errors
    ///
    /// Returns `NoEligibleQuestions` if a reshuffle finds nothing eligible.
    pub fn next_index<Q: Borrow<QuestionSpec>, R: Rng + ?Sized>(
        &mut self,
        questions: &[Q],
        stage_level: u32,
        rng: &mut R,
    ) -> Result<usize, NoEligibleQuestions> {
        if self.cursor >= self.order.len() {
            self.order = shuffled_pass(questions, stage_level, rng)?;
            self.cursor = 0;
            self.passes = self.passes.saturating_add(1);
            debug!(
                target: "quiz::session",
                pass = self.passes,
                eligible = self.order.len(),
                stage_level,
                "question order reshuffled"
            );
        }
        let index = self.order[self.cursor];
        self.cursor += 1;
        Ok(index)
    }

    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Indices left before the next reshuffle.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.order.len().saturating_sub(self.cursor)
    }

    #[must_use]
    pub fn passes(&self) -> u32 {
        self.passes
    }
}

fn shuffled_pass<Q: Borrow<QuestionSpec>, R: Rng + ?Sized>(
    questions: &[Q],
    stage_level: u32,
    rng: &mut R,
) -> Result<Vec<usize>, NoEligibleQuestions> {
    let mut order = eligible_indices(questions, stage_level);
    if order.is_empty() {
        return Err(NoEligibleQuestions { stage_level });
    }
    order.shuffle(rng);
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CorrectAnswer, SINGLE_CHOICE_TAG};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn questions(min_levels: &[u32]) -> Vec<QuestionSpec> {
        min_levels
            .iter()
            .enumerate()
            .map(|(i, &min_level)| {
                QuestionSpec::new(
                    format!("question {i}"),
                    vec!["yes".into(), "no".into()],
                    SINGLE_CHOICE_TAG,
                    CorrectAnswer::Single(0),
                    "AI",
                    min_level,
                )
                .unwrap()
            })
            .collect()
    }

    fn draw(order: &mut QuestionOrder, qs: &[QuestionSpec], level: u32, rng: &mut StdRng, n: usize) -> Vec<usize> {
        (0..n).map(|_| order.next_index(qs, level, rng).unwrap()).collect()
    }

    #[test]
    fn each_pass_visits_every_eligible_index_once() {
        let qs = questions(&[1; 10]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut order = QuestionOrder::shuffled(&qs, 1, &mut rng).unwrap();

        for pass in 1..=3 {
            let mut seen = draw(&mut order, &qs, 1, &mut rng, 10);
            assert_eq!(order.passes(), pass);
            seen.sort_unstable();
            assert_eq!(seen, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn filter_respects_min_level() {
        let qs = questions(&[1, 3, 1, 2]);
        assert_eq!(eligible_indices(&qs, 1), vec![0, 2]);
        assert_eq!(eligible_indices(&qs, 2), vec![0, 2, 3]);
        assert_eq!(eligible_indices(&qs, 9), vec![0, 1, 2, 3]);
    }

    #[test]
    fn reshuffle_picks_up_a_raised_level() {
        let qs = questions(&[1, 1, 2, 2]);
        let mut rng = StdRng::seed_from_u64(11);
        let mut order = QuestionOrder::shuffled(&qs, 1, &mut rng).unwrap();

        let mut first = draw(&mut order, &qs, 1, &mut rng, 2);
        first.sort_unstable();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(order.remaining(), 0);

        let mut second = draw(&mut order, &qs, 2, &mut rng, 4);
        second.sort_unstable();
        assert_eq!(second, vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_eligible_set_is_an_error() {
        let qs = questions(&[4, 5]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            QuestionOrder::shuffled(&qs, 1, &mut rng),
            Err(NoEligibleQuestions { stage_level: 1 })
        );
        let none: Vec<QuestionSpec> = Vec::new();
        assert!(QuestionOrder::shuffled(&none, 1, &mut rng).is_err());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let qs = questions(&[1; 8]);
        let a = QuestionOrder::shuffled(&qs, 1, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = QuestionOrder::shuffled(&qs, 1, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a.order(), b.order());
    }
}
