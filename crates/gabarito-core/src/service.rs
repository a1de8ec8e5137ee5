//! The operations exposed to callers.
//!
//! Every entry point (CLI, batch grader, external adapters) goes through
//! [`GabaritoService`]; none of them resolve positions or pick answer keys on
//! their own.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::GabaritoConfig;
use crate::error::{CoreError, CoreResult};
use crate::generator::PermutationGenerator;
use crate::grading::{Anomaly, ExplicitKey, GradeOutcome, GradeRequest, GradingEngine, KeyCandidates};
use crate::index::{normalize_variant_index, Position, RawVariant};
use crate::model::{active_exams, Exam, ExamId, Letter, QuestionId};
use crate::resolver::resolve_slot;
use crate::submission::RawSubmission;
use crate::traits::{ArtifactCache, MemoryArtifactCache, QuestionSource};
use crate::variant::VariantSet;
use crate::store::VariantStore;

/// A position resolved to its question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuestion {
    pub variant_set: Uuid,
    pub variant: u32,
    pub position: u32,
    pub question_id: QuestionId,
    pub correct: Option<Letter>,
}

/// Facade over the generator, store, resolver and grading engine.
pub struct GabaritoService {
    questions: Arc<dyn QuestionSource>,
    store: Arc<dyn VariantStore>,
    cache: Arc<dyn ArtifactCache>,
    engine: GradingEngine,
    generator: Mutex<PermutationGenerator<StdRng>>,
    config: GabaritoConfig,
    /// Exams whose cached artifacts could not be invalidated.
    stale: Mutex<HashSet<ExamId>>,
}

impl GabaritoService {
    pub fn new(
        questions: Arc<dyn QuestionSource>,
        store: Arc<dyn VariantStore>,
        config: GabaritoConfig,
    ) -> Self {
        Self {
            questions,
            store,
            cache: Arc::new(MemoryArtifactCache::new()),
            engine: GradingEngine::new(Arc::new(SystemClock)),
            generator: Mutex::new(PermutationGenerator::with_rng(StdRng::from_os_rng())),
            config,
            stale: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.engine = GradingEngine::new(clock);
        self
    }

    /// Make generation reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.generator = Mutex::new(PermutationGenerator::seeded(seed));
        self
    }

    pub fn config(&self) -> &GabaritoConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn VariantStore {
        self.store.as_ref()
    }

    pub fn exam(&self, exam_id: ExamId) -> CoreResult<Exam> {
        self.questions.exam(exam_id)
    }

    /// Exams that are not archived.
    pub fn active_exams(&self) -> CoreResult<Vec<Exam>> {
        let exams = self.questions.exams()?;
        let archived = self.config.archived();
        Ok(active_exams(&exams, &archived).into_iter().cloned().collect())
    }

    /// Shuffle the exam into a new variant set and append it to history.
    #[tracing::instrument(skip(self))]
    pub fn generate_variant_set(
        &self,
        exam_id: ExamId,
        actor: Option<&str>,
    ) -> CoreResult<VariantSet> {
        self.ensure_fresh(exam_id)?;
        let exam = self.questions.exam(exam_id)?;
        if exam.question_count() > self.config.max_questions {
            return Err(CoreError::validation(format!(
                "exam {exam_id} has {} questions, the limit is {}",
                exam.question_count(),
                self.config.max_questions
            )));
        }
        if !exam.has_unique_questions() {
            return Err(CoreError::validation(format!(
                "exam {exam_id} lists a question more than once"
            )));
        }

        let permutations = {
            let mut generator = self
                .generator
                .lock()
                .map_err(|_| CoreError::Storage("generator lock poisoned".into()))?;
            generator.generate(&exam.questions, self.config.variant_count)
        };
        let set = self
            .store
            .append(exam_id, actor.map(str::to_string), permutations)?;
        tracing::info!(
            variant_set = %set.id,
            code = %set.short_code(),
            questions = set.question_count,
            variants = set.variant_count(),
            "variant set generated"
        );
        Ok(set)
    }

    /// Designate the official set of an exam.
    #[tracing::instrument(skip(self))]
    pub fn set_official_variant_set(&self, exam_id: ExamId, variant_set: Uuid) -> CoreResult<()> {
        self.ensure_fresh(exam_id)?;
        self.store.set_official(exam_id, variant_set)?;
        tracing::info!("official variant set updated");
        Ok(())
    }

    /// Pure lookup of the question at a slot.
    pub fn resolve_question(
        &self,
        set: &VariantSet,
        variant_index: u32,
        position: u32,
    ) -> Option<QuestionId> {
        crate::resolver::resolve(set, variant_index, position)
    }

    /// Resolve a slot of an exam, validating the raw inputs first.
    ///
    /// `selector` picks a set by uuid or short code; the official set is used
    /// when absent. `Ok(None)` means the slot does not exist.
    pub fn resolve_in_exam(
        &self,
        exam_id: ExamId,
        selector: Option<&str>,
        variant: &RawVariant,
        position: &str,
    ) -> CoreResult<Option<ResolvedQuestion>> {
        let variant = normalize_variant_index(Some(variant), self.config.variant_count)?;
        let position = Position::parse(position)?;
        let set = match selector {
            Some(selector) => self.store.find(exam_id, selector)?,
            None => self.store.official(exam_id)?.ok_or_else(|| {
                CoreError::not_found(format!("exam {exam_id} has no variant sets"))
            })?,
        };
        Ok(
            resolve_slot(&set, variant.get(), position.get()).map(|slot| ResolvedQuestion {
                variant_set: set.id,
                variant: variant.get(),
                position: position.get(),
                question_id: slot.question_id,
                correct: slot.correct,
            }),
        )
    }

    /// Normalize and grade one submission.
    ///
    /// A graded result produced against a variant set is counted against
    /// that set so it can no longer be deleted.
    #[tracing::instrument(skip(self, raw), fields(exam = raw.exam_id, learner = raw.learner_id))]
    pub fn grade_submission(&self, raw: &RawSubmission) -> CoreResult<GradeOutcome> {
        let submission = raw.normalize(self.config.variant_count)?;
        let exam = self.questions.exam(submission.exam_id)?;

        let explicit_set = match submission.variant_set {
            Some(id) => match self.store.get(id) {
                Ok(set) => Some(set),
                Err(CoreError::NotFound(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        let explicit = match (&explicit_set, submission.variant_set) {
            (Some(set), _) => Some(ExplicitKey::Loaded(set)),
            (None, Some(id)) => Some(ExplicitKey::Unavailable(id)),
            (None, None) => None,
        };
        let official = self.store.official(exam.id)?;

        let mut outcome = self.engine.grade(GradeRequest {
            exam: &exam,
            learner_id: submission.learner_id,
            keys: KeyCandidates {
                explicit,
                official: official.as_ref(),
            },
            variant: submission.variant,
            answers: &submission.answers,
        })?;

        if let Some(id) = outcome.result.variant_set_id {
            match self.store.record_graded(id) {
                Ok(()) => {}
                Err(CoreError::NotFound(_)) => {
                    tracing::warn!(variant_set = %id, "graded set deleted before its use was counted");
                    outcome
                        .anomalies
                        .push(Anomaly::UsageNotRecorded { variant_set: id });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    /// Delete a set by uuid or short code, subject to the delete-safety rules.
    #[tracing::instrument(skip(self))]
    pub fn delete_variant_set(&self, exam_id: ExamId, selector: &str) -> CoreResult<VariantSet> {
        let set = self.store.find(exam_id, selector)?;
        let removed = self.store.delete_if_unreferenced(set.id)?;
        tracing::info!(variant_set = %removed.id, "variant set deleted");
        Ok(removed)
    }

    /// Invalidate cached artifacts after the exam's question list changed.
    ///
    /// Until this succeeds, no set of the exam can be generated or made
    /// official.
    #[tracing::instrument(skip(self))]
    pub fn exam_structure_changed(&self, exam_id: ExamId) -> CoreResult<usize> {
        self.mark_stale(exam_id, true)?;
        let attempts = self.config.cache_invalidation_retries.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.cache.invalidate_exam(exam_id) {
                Ok(removed) => {
                    self.mark_stale(exam_id, false)?;
                    tracing::info!(removed, attempt, "cached artifacts invalidated");
                    return Ok(removed);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "artifact invalidation failed");
                    last_error = Some(e);
                }
            }
        }
        Err(CoreError::CacheInvalidation {
            exam: exam_id,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "invalidation did not run".into()),
        })
    }

    fn mark_stale(&self, exam_id: ExamId, stale: bool) -> CoreResult<()> {
        let mut set = self
            .stale
            .lock()
            .map_err(|_| CoreError::Storage("stale-exam lock poisoned".into()))?;
        if stale {
            set.insert(exam_id);
        } else {
            set.remove(&exam_id);
        }
        Ok(())
    }

    fn ensure_fresh(&self, exam_id: ExamId) -> CoreResult<()> {
        let stale = self
            .stale
            .lock()
            .map_err(|_| CoreError::Storage("stale-exam lock poisoned".into()))?;
        if stale.contains(&exam_id) {
            return Err(CoreError::CacheInvalidation {
                exam: exam_id,
                message: "exam was edited and its cached artifacts are not invalidated yet".into(),
            });
        }
        Ok(())
    }
}
