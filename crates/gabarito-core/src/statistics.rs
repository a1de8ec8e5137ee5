//! Reducers over many graded results.
//!
//! None of these mutate a `GradedResult`; "best attempt" in particular is a
//! reporting choice made here, never inside the grading engine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::grading::{percentage, round2, GradedResult};
use crate::model::{ExamId, LearnerId, Letter, QuestionId};

/// Best result per (exam, learner): highest score, earliest `graded_at` on ties.
pub fn best_attempts(results: &[GradedResult]) -> Vec<&GradedResult> {
    let mut best: BTreeMap<(ExamId, LearnerId), &GradedResult> = BTreeMap::new();
    for r in results {
        best.entry((r.exam_id, r.learner_id))
            .and_modify(|current| {
                let better = r.score > current.score
                    || (r.score == current.score && r.graded_at < current.graded_at);
                if better {
                    *current = r;
                }
            })
            .or_insert(r);
    }
    best.into_values().collect()
}

/// How one question performed across a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStats {
    pub question_id: QuestionId,
    pub subject: String,
    pub answered: usize,
    pub correct: usize,
    pub percent_correct: f64,
    /// Count per letter A..E; unrecognized marks are not counted here.
    pub option_counts: BTreeMap<Letter, usize>,
    pub most_chosen: Option<Letter>,
}

/// Per-question analysis, ordered by question id.
pub fn item_analysis<'a>(results: impl IntoIterator<Item = &'a GradedResult>) -> Vec<ItemStats> {
    let mut items: BTreeMap<QuestionId, ItemStats> = BTreeMap::new();
    for detail in results.into_iter().flat_map(|r| &r.details) {
        let item = items.entry(detail.question_id).or_insert_with(|| ItemStats {
            question_id: detail.question_id,
            subject: detail.subject.clone(),
            answered: 0,
            correct: 0,
            percent_correct: 0.0,
            option_counts: Letter::ALL.iter().map(|l| (*l, 0)).collect(),
            most_chosen: None,
        });
        item.answered += 1;
        if detail.is_correct {
            item.correct += 1;
        }
        if let Ok(letter) = detail.chosen.parse::<Letter>() {
            *item.option_counts.entry(letter).or_insert(0) += 1;
        }
    }

    items
        .into_values()
        .map(|mut item| {
            item.percent_correct = percentage(item.correct, item.answered);
            item.most_chosen = item
                .option_counts
                .iter()
                .filter(|&(_, &count)| count > 0)
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(letter, _)| *letter);
            item
        })
        .collect()
}

/// Headline numbers for a set of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub participants: usize,
    pub results: usize,
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
    pub most_correct: Option<QuestionId>,
    pub least_correct: Option<QuestionId>,
}

/// Summarize results; pass [`best_attempts`] output to count each learner once.
pub fn class_summary(results: &[&GradedResult]) -> ClassSummary {
    let participants: BTreeSet<LearnerId> = results.iter().map(|r| r.learner_id).collect();
    let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
    let average_score = if scores.is_empty() {
        0.0
    } else {
        round2(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    let items = item_analysis(results.iter().copied());
    // Ties go to the lowest question id.
    let most_correct = items
        .iter()
        .max_by(|a, b| {
            a.percent_correct
                .total_cmp(&b.percent_correct)
                .then(b.question_id.cmp(&a.question_id))
        })
        .map(|i| i.question_id);
    let least_correct = items
        .iter()
        .min_by(|a, b| {
            a.percent_correct
                .total_cmp(&b.percent_correct)
                .then(a.question_id.cmp(&b.question_id))
        })
        .map(|i| i.question_id);

    ClassSummary {
        participants: participants.len(),
        results: results.len(),
        average_score,
        highest_score: scores.iter().copied().fold(0.0, f64::max),
        lowest_score: scores.iter().copied().reduce(f64::min).unwrap_or(0.0),
        most_correct,
        least_correct,
    }
}
