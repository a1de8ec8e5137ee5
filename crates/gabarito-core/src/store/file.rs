//! File-backed variant store: one JSON document per exam.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Duration;
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::{build_set, foreign_or_missing, lock, ExamLedger, VariantStore, DEFAULT_COOLDOWN_HOURS};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, CoreResult};
use crate::model::ExamId;
use crate::variant::{Permutation, VariantSet};

const LEDGER_PREFIX: &str = "exam-";

/// Variant store persisted under a state directory.
///
/// Each write replaces `exam-<id>.json` atomically (temp file + rename).
/// Read-modify-write cycles hold an exclusive advisory lock on
/// `exam-<id>.lock`, so processes sharing the directory serialize.
pub struct FileVariantStore {
    dir: PathBuf,
    guard: Mutex<()>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl FileVariantStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::open_with_clock(
            dir,
            Arc::new(SystemClock),
            Duration::hours(DEFAULT_COOLDOWN_HOURS),
        )
    }

    pub fn open_with_clock(
        dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> CoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| CoreError::Storage(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            guard: Mutex::new(()),
            clock,
            cooldown,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ledger_path(&self, exam_id: ExamId) -> PathBuf {
        self.dir.join(format!("{LEDGER_PREFIX}{exam_id}.json"))
    }

    fn load(&self, exam_id: ExamId) -> CoreResult<ExamLedger> {
        let path = self.ledger_path(exam_id);
        if !path.exists() {
            return Ok(ExamLedger::new(exam_id));
        }
        read_ledger(&path)
    }

    fn save(&self, ledger: &ExamLedger) -> CoreResult<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        let json = serde_json::to_string_pretty(ledger)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.ledger_path(ledger.exam_id))
            .map_err(|e| CoreError::Storage(format!("cannot replace ledger: {e}")))?;
        Ok(())
    }

    fn all(&self) -> CoreResult<Vec<ExamLedger>> {
        let mut ledgers = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_ledger = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LEDGER_PREFIX) && n.ends_with(".json"));
            if is_ledger {
                ledgers.push(read_ledger(&path)?);
            }
        }
        Ok(ledgers)
    }

    fn owner_of(&self, id: Uuid) -> CoreResult<ExamLedger> {
        self.all()?
            .into_iter()
            .find(|l| l.contains(id))
            .ok_or_else(|| CoreError::not_found(format!("variant set {id}")))
    }

    /// Load the ledger of `exam_id`, apply `f`, and save, all while holding
    /// the exam's lock file.
    fn update<T>(
        &self,
        exam_id: ExamId,
        f: impl FnOnce(&mut ExamLedger) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let _guard = lock(&self.guard)?;
        let path = self.dir.join(format!("{LEDGER_PREFIX}{exam_id}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| CoreError::Storage(format!("cannot open {}: {e}", path.display())))?;
        let mut file_lock = RwLock::new(file);
        let _held = file_lock
            .write()
            .map_err(|e| CoreError::Storage(format!("cannot lock {}: {e}", path.display())))?;

        let mut ledger = self.load(exam_id)?;
        let out = f(&mut ledger)?;
        self.save(&ledger)?;
        Ok(out)
    }

    /// Like [`update`](Self::update), but only if the ledger still holds `id`.
    fn update_owned<T>(
        &self,
        exam_id: ExamId,
        id: Uuid,
        f: impl FnOnce(&mut ExamLedger) -> CoreResult<T>,
    ) -> CoreResult<T> {
        self.update(exam_id, |ledger| {
            if !ledger.contains(id) {
                return Err(foreign_or_missing(&self.all()?, exam_id, id));
            }
            f(ledger)
        })
    }

    /// The exam whose ledger currently holds `id`.
    fn owner_id(&self, id: Uuid) -> CoreResult<ExamId> {
        Ok(self.owner_of(id)?.exam_id)
    }
}

fn read_ledger(path: &Path) -> CoreResult<ExamLedger> {
    let content = fs::read_to_string(path)
        .map_err(|e| CoreError::Storage(format!("cannot read {}: {e}", path.display())))?;
    let mut ledger: ExamLedger = serde_json::from_str(&content)
        .map_err(|e| CoreError::Storage(format!("cannot decode {}: {e}", path.display())))?;
    ledger.repair();
    Ok(ledger)
}

impl VariantStore for FileVariantStore {
    fn append(
        &self,
        exam_id: ExamId,
        created_by: Option<String>,
        permutations: Vec<Permutation>,
    ) -> CoreResult<VariantSet> {
        let set = build_set(exam_id, created_by, permutations, self.clock.now())?;
        self.update(exam_id, |ledger| {
            ledger.push(set.clone());
            Ok(())
        })?;
        tracing::debug!(exam = exam_id, variant_set = %set.id, "variant set appended");
        Ok(set)
    }

    fn get(&self, id: Uuid) -> CoreResult<VariantSet> {
        let ledger = self.owner_of(id)?;
        ledger
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("variant set {id}")))
    }

    fn history(&self, exam_id: ExamId) -> CoreResult<Vec<VariantSet>> {
        Ok(self.load(exam_id)?.history())
    }

    fn official(&self, exam_id: ExamId) -> CoreResult<Option<VariantSet>> {
        Ok(self.load(exam_id)?.official_set().cloned())
    }

    fn set_official(&self, exam_id: ExamId, id: Uuid) -> CoreResult<()> {
        self.update_owned(exam_id, id, |ledger| ledger.set_official(id))
    }

    fn compare_and_set_official(
        &self,
        exam_id: ExamId,
        expected: Option<Uuid>,
        id: Uuid,
    ) -> CoreResult<()> {
        self.update_owned(exam_id, id, |ledger| {
            ledger.compare_and_set_official(expected, id)
        })
    }

    fn delete_if_unreferenced(&self, id: Uuid) -> CoreResult<VariantSet> {
        let now = self.clock.now();
        let exam_id = self.owner_id(id)?;
        self.update_owned(exam_id, id, |ledger| ledger.delete(id, now, self.cooldown))
    }

    fn record_graded(&self, id: Uuid) -> CoreResult<()> {
        let exam_id = self.owner_id(id)?;
        self.update_owned(exam_id, id, |ledger| ledger.record_graded(id))
    }

    fn graded_count(&self, id: Uuid) -> CoreResult<usize> {
        let ledger = self.owner_of(id)?;
        Ok(ledger.graded.get(&id).copied().unwrap_or(0))
    }
}
