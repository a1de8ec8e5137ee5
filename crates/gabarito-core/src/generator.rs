//! Permutation generation.
//!
//! Each variant is an independent, unbiased shuffle of the exam's canonical
//! question list. The position→letter key of a variant is derived from the
//! correct letter of whichever question lands at that position.

use rand::rngs::{StdRng, ThreadRng};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::model::Question;
use crate::variant::Permutation;

/// Default number of variants generated per set.
pub const DEFAULT_VARIANT_COUNT: u32 = 5;

/// Builds K shuffled permutations with an injected random source.
pub struct PermutationGenerator<R: Rng> {
    rng: R,
}

impl PermutationGenerator<ThreadRng> {
    /// Generator backed by the thread-local RNG.
    pub fn new() -> Self {
        Self { rng: rand::rng() }
    }
}

impl Default for PermutationGenerator<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl PermutationGenerator<StdRng> {
    /// Reproducible generator for tests and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> PermutationGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Generate `k` independent permutations of `questions`.
    ///
    /// An empty question list yields `k` empty permutations. Upper bounds on
    /// the question count are the caller's concern.
    pub fn generate(&mut self, questions: &[Question], k: u32) -> Vec<Permutation> {
        (1..=k)
            .map(|variant| {
                let mut order: Vec<&Question> = questions.iter().collect();
                order.shuffle(&mut self.rng);
                Permutation::from_order(variant, &order)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::model::fixtures::question;
    use crate::model::{Difficulty, Letter, QuestionId};

    fn bank(n: u64) -> Vec<Question> {
        (1..=n)
            .map(|id| {
                let letter = Letter::ALL[(id % 5) as usize];
                question(id, "math", Difficulty::Medium, letter)
            })
            .collect()
    }

    #[test]
    fn every_permutation_is_a_bijection() {
        let questions = bank(30);
        let expected: HashSet<QuestionId> = questions.iter().map(|q| q.id).collect();
        let perms = PermutationGenerator::seeded(7).generate(&questions, 5);

        assert_eq!(perms.len(), 5);
        for (p, variant) in perms.iter().zip(1u32..) {
            assert_eq!(p.variant, variant);
            assert_eq!(p.len(), 30);
            let seen: HashSet<QuestionId> = p.sequence.iter().copied().collect();
            assert_eq!(seen, expected, "variant {variant} is not a bijection");
        }
    }

    #[test]
    fn key_follows_the_question_at_each_position() {
        let questions = bank(12);
        let perms = PermutationGenerator::seeded(1).generate(&questions, 3);
        for p in &perms {
            for (id, position) in p.sequence.iter().zip(1u32..) {
                let q = questions.iter().find(|q| q.id == *id).unwrap();
                assert_eq!(p.key_letter(position), Some(q.correct));
            }
            assert_eq!(p.key.len(), 12);
        }
    }

    #[test]
    fn empty_input_yields_empty_permutations() {
        let perms = PermutationGenerator::seeded(3).generate(&[], 5);
        assert_eq!(perms.len(), 5);
        assert!(perms.iter().all(|p| p.is_empty() && p.key.is_empty()));
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let questions = bank(20);
        let a = PermutationGenerator::seeded(42).generate(&questions, 5);
        let b = PermutationGenerator::seeded(42).generate(&questions, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn variants_are_shuffled_independently() {
        let questions = bank(20);
        let perms = PermutationGenerator::seeded(9).generate(&questions, 5);
        let distinct: HashSet<&Vec<QuestionId>> = perms.iter().map(|p| &p.sequence).collect();
        assert!(distinct.len() > 1);
    }
}
