//! Batch grading orchestrator.
//!
//! Grades many submissions concurrently through [`GabaritoService`] and hands
//! every outcome to a [`ResultRecorder`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::grading::GradeOutcome;
use crate::model::{ExamId, LearnerId};
use crate::service::GabaritoService;
use crate::submission::RawSubmission;
use crate::traits::ResultRecorder;

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_submission_start(&self, learner_id: LearnerId, exam_id: ExamId);
    fn on_submission_graded(&self, outcome: &GradeOutcome);
    fn on_submission_error(&self, learner_id: LearnerId, exam_id: ExamId, error: &str);
    fn on_batch_complete(&self, total: usize, graded: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_submission_start(&self, _: LearnerId, _: ExamId) {}
    fn on_submission_graded(&self, _: &GradeOutcome) {}
    fn on_submission_error(&self, _: LearnerId, _: ExamId, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// A submission that could not be graded or recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position of the submission in the input batch.
    pub index: usize,
    pub learner_id: LearnerId,
    pub exam_id: ExamId,
    pub error: String,
}

/// Everything a batch run produced, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<GradeOutcome>,
    pub failures: Vec<BatchFailure>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn anomaly_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.anomalies.len()).sum()
    }
}

/// Concurrent grader for submission batches.
pub struct BatchGrader {
    service: Arc<GabaritoService>,
    recorder: Option<Arc<dyn ResultRecorder>>,
    parallelism: usize,
}

impl BatchGrader {
    pub fn new(service: Arc<GabaritoService>) -> Self {
        let parallelism = service.config().parallelism.max(1);
        Self {
            service,
            recorder: None,
            parallelism,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ResultRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Grade every submission; one failing submission never aborts the rest.
    pub async fn grade_all(
        &self,
        submissions: Vec<RawSubmission>,
        progress: &dyn ProgressReporter,
    ) -> BatchReport {
        let start = Instant::now();
        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));

        let mut futures = FuturesUnordered::new();

        for (index, submission) in submissions.into_iter().enumerate() {
            let service = Arc::clone(&self.service);
            let recorder = self.recorder.clone();
            let semaphore = Arc::clone(&semaphore);

            futures.push(async move {
                let learner_id = submission.learner_id;
                let exam_id = submission.exam_id;
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    progress.on_submission_start(learner_id, exam_id);

                    // The file store does blocking I/O.
                    let outcome = tokio::task::spawn_blocking(move || {
                        service.grade_submission(&submission)
                    })
                    .await??;

                    if let Some(recorder) = recorder {
                        recorder
                            .record(&outcome.result, &outcome.anomalies)
                            .await?;
                    }
                    anyhow::Ok(outcome)
                };
                (index, learner_id, exam_id, inner.await)
            });
        }

        let total = futures.len();
        let mut graded = Vec::with_capacity(total);
        let mut failures = Vec::new();

        while let Some((index, learner_id, exam_id, result)) = futures.next().await {
            match result {
                Ok(outcome) => {
                    for anomaly in &outcome.anomalies {
                        tracing::warn!(learner = learner_id, exam = exam_id, "{anomaly}");
                    }
                    progress.on_submission_graded(&outcome);
                    graded.push((index, outcome));
                }
                Err(e) => {
                    tracing::error!("grading failed for learner {learner_id} on exam {exam_id}: {e:#}");
                    progress.on_submission_error(learner_id, exam_id, &e.to_string());
                    failures.push(BatchFailure {
                        index,
                        learner_id,
                        exam_id,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_batch_complete(total, graded.len(), failures.len(), elapsed);

        graded.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|f| f.index);

        BatchReport {
            id: Uuid::new_v4(),
            started_at,
            outcomes: graded.into_iter().map(|(_, outcome)| outcome).collect(),
            failures,
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::GabaritoConfig;
    use crate::model::fixtures::three_question_exam;
    use crate::store::{InMemoryVariantStore, VariantStore};
    use crate::traits::{MemoryRecorder, StaticQuestionSource};

    #[derive(Default)]
    struct CountingReporter {
        graded: AtomicUsize,
        errors: AtomicUsize,
        completed: AtomicUsize,
    }

    impl ProgressReporter for CountingReporter {
        fn on_submission_start(&self, _: LearnerId, _: ExamId) {}
        fn on_submission_graded(&self, _: &GradeOutcome) {
            self.graded.fetch_add(1, Ordering::SeqCst);
        }
        fn on_submission_error(&self, _: LearnerId, _: ExamId, _: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_batch_complete(&self, total: usize, _: usize, _: usize, _: Duration) {
            self.completed.store(total, Ordering::SeqCst);
        }
    }

    fn submission(learner_id: LearnerId, versao: &str) -> RawSubmission {
        RawSubmission {
            learner_id,
            exam_id: 1,
            variant_set: None,
            versao: Some(versao.into()),
            tipo_prova: None,
            answers: BTreeMap::from([("1".to_string(), "a".to_string())]),
        }
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_isolates_failures() {
        let store = Arc::new(InMemoryVariantStore::new());
        let service = Arc::new(
            GabaritoService::new(
                Arc::new(StaticQuestionSource::new([three_question_exam()])),
                store.clone(),
                GabaritoConfig::default(),
            )
            .with_seed(11),
        );
        let set = service.generate_variant_set(1, None).unwrap();
        let recorder = Arc::new(MemoryRecorder::new());
        let grader = BatchGrader::new(service)
            .with_recorder(recorder.clone())
            .with_parallelism(3);

        let mut batch: Vec<RawSubmission> = (1..=8).map(|l| submission(l, "versao2")).collect();
        batch.insert(4, submission(99, "versao7"));

        let reporter = CountingReporter::default();
        let report = grader.grade_all(batch, &reporter).await;

        assert_eq!(report.outcomes.len(), 8);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 4);
        assert_eq!(report.failures[0].learner_id, 99);
        let learners: Vec<LearnerId> = report.outcomes.iter().map(|o| o.result.learner_id).collect();
        assert_eq!(learners, (1..=8).collect::<Vec<_>>());

        assert_eq!(recorder.len(), 8);
        assert_eq!(store.graded_count(set.id).unwrap(), 8);
        assert_eq!(reporter.graded.load(Ordering::SeqCst), 8);
        assert_eq!(reporter.errors.load(Ordering::SeqCst), 1);
        assert_eq!(reporter.completed.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn empty_batch() {
        let service = Arc::new(GabaritoService::new(
            Arc::new(StaticQuestionSource::default()),
            Arc::new(InMemoryVariantStore::new()),
            GabaritoConfig::default(),
        ));
        let report = BatchGrader::new(service).grade_all(vec![], &NoopReporter).await;
        assert!(report.outcomes.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(report.anomaly_count(), 0);
    }
}
