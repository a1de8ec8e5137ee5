//! Grading engine.
//!
//! Maps a learner's per-position answers back to real questions through a
//! single three-tier key selection, scores them, and builds rollups. Entries
//! that cannot be resolved become anomalies and are excluded from the
//! denominator; they never abort an otherwise gradable submission.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, CoreResult};
use crate::index::{Position, VariantIndex};
use crate::model::{Difficulty, Exam, ExamId, LearnerId, Letter, Question, QuestionId};
use crate::resolver::resolve_slot;
use crate::variant::VariantSet;

/// Which answer key a result was graded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyTier {
    /// A set explicitly tied to the submission.
    Explicit,
    /// The exam's official set.
    Official,
    /// The canonical question order with each question's own letter.
    Canonical,
}

impl fmt::Display for KeyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTier::Explicit => write!(f, "explicit"),
            KeyTier::Official => write!(f, "official"),
            KeyTier::Canonical => write!(f, "canonical"),
        }
    }
}

/// An explicitly referenced set, or the id of one that could not be loaded.
#[derive(Debug, Clone, Copy)]
pub enum ExplicitKey<'a> {
    Loaded(&'a VariantSet),
    Unavailable(Uuid),
}

/// Candidate answer keys, in priority order.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCandidates<'a> {
    pub explicit: Option<ExplicitKey<'a>>,
    pub official: Option<&'a VariantSet>,
}

/// The key a submission is graded against.
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    Variant(&'a VariantSet, KeyTier),
    Canonical,
}

impl KeySource<'_> {
    pub fn tier(&self) -> KeyTier {
        match self {
            KeySource::Variant(_, tier) => *tier,
            KeySource::Canonical => KeyTier::Canonical,
        }
    }

    pub fn variant_set_id(&self) -> Option<Uuid> {
        match self {
            KeySource::Variant(set, _) => Some(set.id),
            KeySource::Canonical => None,
        }
    }
}

/// A submitted entry or key candidate that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// No question sits at this position in the selected key.
    PositionNotFound { position: u32 },
    /// The key names a question that is not part of the exam.
    QuestionNotInExam { position: u32, question_id: QuestionId },
    /// The key has no letter for this position.
    KeyLetterMissing { position: u32, question_id: QuestionId },
    /// A higher-priority key candidate was skipped.
    KeySourceFallback { variant_set: Uuid, reason: String },
    /// The set graded against was deleted before its use could be counted.
    UsageNotRecorded { variant_set: Uuid },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::PositionNotFound { position } => {
                write!(f, "position {position}: no question at this position")
            }
            Anomaly::QuestionNotInExam {
                position,
                question_id,
            } => write!(f, "position {position}: question {question_id} is not in the exam"),
            Anomaly::KeyLetterMissing {
                position,
                question_id,
            } => write!(f, "position {position}: no key letter for question {question_id}"),
            Anomaly::KeySourceFallback {
                variant_set,
                reason,
            } => write!(f, "variant set {variant_set} skipped: {reason}"),
            Anomaly::UsageNotRecorded { variant_set } => {
                write!(f, "variant set {variant_set} was deleted before this grade was counted")
            }
        }
    }
}

/// One graded question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDetail {
    pub position: u32,
    pub question_id: QuestionId,
    pub subject: String,
    pub topic: String,
    pub difficulty: Difficulty,
    /// Chosen mark, trimmed and upper-cased.
    pub chosen: String,
    pub correct_letter: Letter,
    pub is_correct: bool,
}

/// Correct / total / percentage for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub correct: usize,
    pub total: usize,
    pub percentage: f64,
}

impl Tally {
    fn add(&mut self, is_correct: bool) {
        self.total += 1;
        if is_correct {
            self.correct += 1;
        }
    }

    fn finish(&mut self) {
        self.percentage = percentage(self.correct, self.total);
    }
}

/// Grouped performance of one submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rollups {
    pub by_subject: BTreeMap<String, Tally>,
    pub by_topic: BTreeMap<String, Tally>,
    pub by_subject_difficulty: BTreeMap<String, BTreeMap<Difficulty, Tally>>,
}

impl Rollups {
    pub fn from_details(details: &[AnswerDetail]) -> Self {
        let mut rollups = Rollups::default();
        for d in details {
            rollups
                .by_subject
                .entry(d.subject.clone())
                .or_default()
                .add(d.is_correct);
            rollups
                .by_topic
                .entry(d.topic.clone())
                .or_default()
                .add(d.is_correct);
            rollups
                .by_subject_difficulty
                .entry(d.subject.clone())
                .or_default()
                .entry(d.difficulty)
                .or_default()
                .add(d.is_correct);
        }
        rollups.by_subject.values_mut().for_each(Tally::finish);
        rollups.by_topic.values_mut().for_each(Tally::finish);
        rollups
            .by_subject_difficulty
            .values_mut()
            .flat_map(|m| m.values_mut())
            .for_each(Tally::finish);
        rollups
    }
}

/// The outcome of one grading call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResult {
    pub learner_id: LearnerId,
    pub exam_id: ExamId,
    /// `None` when graded against the canonical order.
    pub variant_set_id: Option<Uuid>,
    pub variant: VariantIndex,
    pub key_tier: KeyTier,
    pub score: f64,
    pub correct_count: usize,
    pub total_graded: usize,
    pub total_points: u32,
    pub graded_at: DateTime<Utc>,
    pub details: Vec<AnswerDetail>,
    pub rollups: Rollups,
}

impl GradedResult {
    /// Percentage of graded answers that were correct.
    pub fn percentage(&self) -> f64 {
        percentage(self.correct_count, self.total_graded)
    }
}

/// A result together with everything that could not be graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub result: GradedResult,
    pub anomalies: Vec<Anomaly>,
}

impl GradeOutcome {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }
}

/// Everything one grading call consumes.
#[derive(Debug, Clone, Copy)]
pub struct GradeRequest<'a> {
    pub exam: &'a Exam,
    pub learner_id: LearnerId,
    pub keys: KeyCandidates<'a>,
    pub variant: VariantIndex,
    pub answers: &'a BTreeMap<Position, String>,
}

/// Pick the answer key: explicit set, then official set, then the
/// canonical order. Skipped candidates are reported as anomalies.
pub fn select_key_source<'a>(
    exam: &Exam,
    keys: KeyCandidates<'a>,
    anomalies: &mut Vec<Anomaly>,
) -> KeySource<'a> {
    match keys.explicit {
        Some(ExplicitKey::Loaded(set)) if set.exam_id == exam.id => {
            return KeySource::Variant(set, KeyTier::Explicit);
        }
        Some(ExplicitKey::Loaded(set)) => anomalies.push(Anomaly::KeySourceFallback {
            variant_set: set.id,
            reason: format!("belongs to exam {}, not exam {}", set.exam_id, exam.id),
        }),
        Some(ExplicitKey::Unavailable(id)) => anomalies.push(Anomaly::KeySourceFallback {
            variant_set: id,
            reason: "not found in the variant store".into(),
        }),
        None => {}
    }

    match keys.official {
        Some(set) if set.exam_id == exam.id => KeySource::Variant(set, KeyTier::Official),
        Some(set) => {
            anomalies.push(Anomaly::KeySourceFallback {
                variant_set: set.id,
                reason: format!("official set belongs to exam {}", set.exam_id),
            });
            KeySource::Canonical
        }
        None => KeySource::Canonical,
    }
}

/// Grades submissions. Holds no mutable state; safe to share across threads.
pub struct GradingEngine {
    clock: Arc<dyn Clock>,
}

impl Default for GradingEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl GradingEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Grade one submission.
    ///
    /// Fails only when the variant index does not exist in the selected set;
    /// every other problem is reported as an anomaly.
    pub fn grade(&self, request: GradeRequest<'_>) -> CoreResult<GradeOutcome> {
        let exam = request.exam;
        let mut anomalies = Vec::new();
        let source = select_key_source(exam, request.keys, &mut anomalies);

        if let KeySource::Variant(set, _) = source {
            if request.variant.get() as usize > set.variant_count() {
                return Err(CoreError::validation(format!(
                    "variant index {} is outside 1..={} for variant set {}",
                    request.variant,
                    set.variant_count(),
                    set.short_code()
                )));
            }
        }
        for anomaly in &anomalies {
            tracing::warn!(exam = exam.id, learner = request.learner_id, "{anomaly}");
        }

        let mut details = Vec::with_capacity(request.answers.len());
        for (position, chosen) in request.answers {
            match lookup(exam, source, request.variant, *position) {
                Ok((question, correct_letter)) => {
                    let chosen = chosen.trim().to_uppercase();
                    let is_correct = chosen == correct_letter.as_str();
                    details.push(AnswerDetail {
                        position: position.get(),
                        question_id: question.id,
                        subject: question.subject.clone(),
                        topic: question.topic.clone(),
                        difficulty: question.difficulty,
                        chosen,
                        correct_letter,
                        is_correct,
                    });
                }
                Err(anomaly) => {
                    tracing::debug!(exam = exam.id, learner = request.learner_id, "{anomaly}");
                    anomalies.push(anomaly);
                }
            }
        }

        let correct_count = details.iter().filter(|d| d.is_correct).count();
        let total_graded = details.len();
        let result = GradedResult {
            learner_id: request.learner_id,
            exam_id: exam.id,
            variant_set_id: source.variant_set_id(),
            variant: request.variant,
            key_tier: source.tier(),
            score: score(correct_count, total_graded, exam.total_points),
            correct_count,
            total_graded,
            total_points: exam.total_points,
            graded_at: self.clock.now(),
            rollups: Rollups::from_details(&details),
            details,
        };

        tracing::info!(
            exam = exam.id,
            learner = request.learner_id,
            tier = %result.key_tier,
            score = result.score,
            anomalies = anomalies.len(),
            "submission graded"
        );
        Ok(GradeOutcome { result, anomalies })
    }
}

/// Resolve one position to its question and correct letter.
fn lookup<'e>(
    exam: &'e Exam,
    source: KeySource<'_>,
    variant: VariantIndex,
    position: Position,
) -> Result<(&'e Question, Letter), Anomaly> {
    let position_number = position.get();
    match source {
        KeySource::Canonical => exam
            .question_at(position_number)
            .map(|q| (q, q.correct))
            .ok_or(Anomaly::PositionNotFound {
                position: position_number,
            }),
        KeySource::Variant(set, _) => {
            let slot = resolve_slot(set, variant.get(), position_number).ok_or(
                Anomaly::PositionNotFound {
                    position: position_number,
                },
            )?;
            let question = exam
                .question(slot.question_id)
                .ok_or(Anomaly::QuestionNotInExam {
                    position: position_number,
                    question_id: slot.question_id,
                })?;
            let letter = slot.correct.ok_or(Anomaly::KeyLetterMissing {
                position: position_number,
                question_id: slot.question_id,
            })?;
            Ok((question, letter))
        }
    }
}

/// `round(correct / total * points, 2)`, or 0 when nothing was graded.
pub fn score(correct: usize, total: usize, points: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(correct as f64 / total as f64 * f64::from(points))
}

/// Percentage rounded to 2 decimals, 0 when `total` is 0.
pub fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(correct as f64 / total as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
