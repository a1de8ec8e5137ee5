//! Seams to external collaborators.
//!
//! Question banks, result persistence and rendered-document caches live
//! outside the core; these traits are what they must implement.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};
use crate::grading::{Anomaly, GradedResult};
use crate::model::{Exam, ExamId};

// ---------------------------------------------------------------------------
// Question source
// ---------------------------------------------------------------------------

/// Supplies exams with their questions in canonical order.
pub trait QuestionSource: Send + Sync {
    fn exam(&self, exam_id: ExamId) -> CoreResult<Exam>;

    /// Every exam this source knows about.
    fn exams(&self) -> CoreResult<Vec<Exam>>;
}

/// Question source over a fixed list of exams.
#[derive(Debug, Default, Clone)]
pub struct StaticQuestionSource {
    exams: BTreeMap<ExamId, Exam>,
}

impl StaticQuestionSource {
    pub fn new(exams: impl IntoIterator<Item = Exam>) -> Self {
        Self {
            exams: exams.into_iter().map(|e| (e.id, e)).collect(),
        }
    }
}

impl QuestionSource for StaticQuestionSource {
    fn exam(&self, exam_id: ExamId) -> CoreResult<Exam> {
        self.exams
            .get(&exam_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("exam {exam_id}")))
    }

    fn exams(&self) -> CoreResult<Vec<Exam>> {
        Ok(self.exams.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Result recorder
// ---------------------------------------------------------------------------

/// Append-only sink for graded results.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record(&self, result: &GradedResult, anomalies: &[Anomaly]) -> anyhow::Result<()>;
}

/// Recorder that keeps results in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<(GradedResult, Vec<Anomaly>)>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<GradedResult> {
        self.records
            .lock()
            .map(|r| r.iter().map(|(result, _)| result.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultRecorder for MemoryRecorder {
    async fn record(&self, result: &GradedResult, anomalies: &[Anomaly]) -> anyhow::Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("recorder lock poisoned"))?
            .push((result.clone(), anomalies.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Artifact cache
// ---------------------------------------------------------------------------

/// Cache of rendered documents (answer sheets, exported PDFs) keyed by exam.
pub trait ArtifactCache: Send + Sync {
    /// Drop every artifact of `exam_id`, returning how many were removed.
    fn invalidate_exam(&self, exam_id: ExamId) -> CoreResult<usize>;
}

/// In-memory artifact cache keyed by (exam id, artifact name).
#[derive(Debug, Default)]
pub struct MemoryArtifactCache {
    entries: Mutex<HashMap<(ExamId, String), Vec<u8>>>,
}

impl MemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, exam_id: ExamId, name: impl Into<String>, bytes: Vec<u8>) -> CoreResult<()> {
        self.lock()?.insert((exam_id, name.into()), bytes);
        Ok(())
    }

    pub fn get(&self, exam_id: ExamId, name: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(&(exam_id, name.to_string())).cloned())
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, HashMap<(ExamId, String), Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| CoreError::Storage("artifact cache lock poisoned".into()))
    }
}

impl ArtifactCache for MemoryArtifactCache {
    fn invalidate_exam(&self, exam_id: ExamId) -> CoreResult<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|(exam, _), _| *exam != exam_id);
        Ok(before - entries.len())
    }
}
