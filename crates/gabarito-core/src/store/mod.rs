//! Variant-set persistence.
//!
//! Each exam owns an append-only history of variant sets and one mutable
//! official pointer. The rules (official reassignment, delete safety,
//! membership checks) live in [`ExamLedger`] so every backend enforces them
//! the same way; backends only decide where a ledger is kept.

mod file;
mod memory;

pub use file::FileVariantStore;
pub use memory::InMemoryVariantStore;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Conflict, CoreError, CoreResult, DeleteRefusal};
use crate::model::ExamId;
use crate::variant::{Permutation, VariantSet};

/// Default window during which a fresh variant set may still be in classroom use.
pub const DEFAULT_COOLDOWN_HOURS: i64 = 24;

/// Durable history of variant sets with an official pointer per exam.
///
/// Pointer updates are atomic per store: two concurrent `set_official` calls
/// for one exam leave exactly one of the requested ids in place.
pub trait VariantStore: Send + Sync {
    /// Persist a new set built from `permutations`.
    ///
    /// The first set of an exam becomes its official set.
    fn append(
        &self,
        exam_id: ExamId,
        created_by: Option<String>,
        permutations: Vec<Permutation>,
    ) -> CoreResult<VariantSet>;

    fn get(&self, id: Uuid) -> CoreResult<VariantSet>;

    /// All sets of an exam, newest first.
    fn history(&self, exam_id: ExamId) -> CoreResult<Vec<VariantSet>>;

    fn official(&self, exam_id: ExamId) -> CoreResult<Option<VariantSet>>;

    /// Point the exam at `id`. Idempotent.
    fn set_official(&self, exam_id: ExamId, id: Uuid) -> CoreResult<()>;

    /// Point the exam at `id` only if the pointer still equals `expected`.
    fn compare_and_set_official(
        &self,
        exam_id: ExamId,
        expected: Option<Uuid>,
        id: Uuid,
    ) -> CoreResult<()>;

    /// Delete a set that has no graded results, is not the exam's last set
    /// and is older than the cool-down window.
    fn delete_if_unreferenced(&self, id: Uuid) -> CoreResult<VariantSet>;

    /// Note that a graded result was produced with `id`.
    fn record_graded(&self, id: Uuid) -> CoreResult<()>;

    fn graded_count(&self, id: Uuid) -> CoreResult<usize>;

    /// Find a set of `exam_id` by full uuid or unambiguous short-code prefix.
    fn find(&self, exam_id: ExamId, selector: &str) -> CoreResult<VariantSet> {
        let history = self.history(exam_id)?;
        if let Ok(id) = Uuid::parse_str(selector.trim()) {
            return history
                .into_iter()
                .find(|s| s.id == id)
                .ok_or_else(|| CoreError::not_found(format!("variant set {id} of exam {exam_id}")));
        }

        let prefix = selector.trim().to_uppercase();
        if prefix.is_empty() {
            return Err(CoreError::validation("empty variant set selector"));
        }
        let mut matches: Vec<VariantSet> = history
            .into_iter()
            .filter(|s| s.short_code().starts_with(&prefix))
            .collect();
        match matches.len() {
            0 => Err(CoreError::not_found(format!(
                "no variant set of exam {exam_id} matches '{selector}'"
            ))),
            1 => Ok(matches.remove(0)),
            n => Err(CoreError::validation(format!(
                "'{selector}' matches {n} variant sets of exam {exam_id}"
            ))),
        }
    }
}

/// Everything stored for one exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamLedger {
    pub exam_id: ExamId,
    /// Sets in append order.
    #[serde(default)]
    pub sets: Vec<VariantSet>,
    #[serde(default)]
    pub official: Option<Uuid>,
    /// Graded-result count per set.
    #[serde(default)]
    pub graded: BTreeMap<Uuid, usize>,
}

impl ExamLedger {
    pub fn new(exam_id: ExamId) -> Self {
        Self {
            exam_id,
            sets: Vec::new(),
            official: None,
            graded: BTreeMap::new(),
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sets.iter().any(|s| s.id == id)
    }

    pub fn get(&self, id: Uuid) -> Option<&VariantSet> {
        self.sets.iter().find(|s| s.id == id)
    }

    /// Newest by creation time; later appends win ties.
    pub fn newest(&self) -> Option<&VariantSet> {
        self.sets
            .iter()
            .enumerate()
            .max_by_key(|(i, s)| (s.created_at, *i))
            .map(|(_, s)| s)
    }

    pub fn history(&self) -> Vec<VariantSet> {
        let mut history: Vec<VariantSet> = self.sets.iter().rev().cloned().collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history
    }

    pub fn official_set(&self) -> Option<&VariantSet> {
        self.official.and_then(|id| self.get(id))
    }

    pub fn push(&mut self, set: VariantSet) {
        let id = set.id;
        self.sets.push(set);
        if self.official.is_none() {
            tracing::info!(exam = self.exam_id, variant_set = %id, "first variant set becomes official");
            self.official = Some(id);
        }
    }

    pub fn set_official(&mut self, id: Uuid) -> CoreResult<()> {
        if !self.contains(id) {
            return Err(CoreError::not_found(format!(
                "variant set {id} of exam {}",
                self.exam_id
            )));
        }
        self.official = Some(id);
        Ok(())
    }

    pub fn compare_and_set_official(&mut self, expected: Option<Uuid>, id: Uuid) -> CoreResult<()> {
        if self.official != expected {
            return Err(CoreError::Conflict(Conflict::OfficialChanged {
                exam: self.exam_id,
                expected,
                actual: self.official,
            }));
        }
        self.set_official(id)
    }

    /// Check the delete-safety rules and remove `id`.
    pub fn delete(
        &mut self,
        id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> CoreResult<VariantSet> {
        let Some(index) = self.sets.iter().position(|s| s.id == id) else {
            return Err(CoreError::not_found(format!("variant set {id}")));
        };
        let refuse = |reason: DeleteRefusal| -> CoreResult<VariantSet> {
            Err(CoreError::Conflict(Conflict::Delete {
                variant_set: id,
                reason,
            }))
        };

        if self.graded.get(&id).copied().unwrap_or(0) > 0 {
            return refuse(DeleteRefusal::HasGradedResults);
        }
        if self.sets.len() <= 1 {
            return refuse(DeleteRefusal::OnlyRemainingVersion);
        }
        if now - self.sets[index].created_at < cooldown {
            return refuse(DeleteRefusal::WithinCooldown);
        }

        let removed = self.sets.remove(index);
        self.graded.remove(&id);
        if self.official == Some(id) {
            self.official = self.newest().map(|s| s.id);
            tracing::info!(
                exam = self.exam_id,
                deleted = %id,
                official = ?self.official,
                "official variant set deleted, pointer reassigned to newest"
            );
        }
        Ok(removed)
    }

    pub fn record_graded(&mut self, id: Uuid) -> CoreResult<()> {
        if !self.contains(id) {
            return Err(CoreError::not_found(format!("variant set {id}")));
        }
        *self.graded.entry(id).or_insert(0) += 1;
        Ok(())
    }

    /// Fix up a ledger decoded from storage: number legacy permutations and
    /// never leave the official pointer dangling.
    pub fn repair(&mut self) {
        for set in &mut self.sets {
            set.fill_missing_variant_numbers();
        }
        let dangling = match self.official {
            Some(id) => !self.contains(id),
            None => !self.sets.is_empty(),
        };
        if dangling {
            self.official = self.newest().map(|s| s.id);
            tracing::warn!(exam = self.exam_id, official = ?self.official, "repaired official pointer");
        }
    }
}

/// Build a new set and reject structurally inconsistent permutations.
pub(crate) fn build_set(
    exam_id: ExamId,
    created_by: Option<String>,
    permutations: Vec<Permutation>,
    now: DateTime<Utc>,
) -> CoreResult<VariantSet> {
    let set = VariantSet {
        id: Uuid::new_v4(),
        exam_id,
        created_at: now,
        created_by,
        question_count: permutations.first().map(Permutation::len).unwrap_or(0),
        permutations,
        notes: String::new(),
    };
    let issues = set.consistency_issues();
    if !issues.is_empty() {
        return Err(CoreError::validation(format!(
            "inconsistent permutations: {}",
            issues.join("; ")
        )));
    }
    Ok(set)
}

/// Error for an id that is not in the requested exam's ledger.
pub(crate) fn foreign_or_missing<'a>(
    ledgers: impl IntoIterator<Item = &'a ExamLedger>,
    exam_id: ExamId,
    id: Uuid,
) -> CoreError {
    match ledgers.into_iter().find(|l| l.contains(id)) {
        Some(owner) => CoreError::Conflict(Conflict::ForeignVariantSet {
            variant_set: id,
            owner: owner.exam_id,
            requested: exam_id,
        }),
        None => CoreError::not_found(format!("variant set {id}")),
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> CoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| CoreError::Storage("variant store lock poisoned".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::three_question_exam;
    use crate::variant::fixtures::set_with_orders;

    fn ledger_with(n: usize) -> (ExamLedger, Vec<Uuid>) {
        let exam = three_question_exam();
        let mut ledger = ExamLedger::new(exam.id);
        let mut ids = Vec::new();
        for i in 0..n {
            let mut set = set_with_orders(&exam, &[&[1, 2, 3]]);
            set.created_at = DateTime::<Utc>::UNIX_EPOCH + Duration::hours(i as i64);
            ids.push(set.id);
            ledger.push(set);
        }
        (ledger, ids)
    }

    fn far_future() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(30)
    }

    #[test]
    fn first_set_becomes_official() {
        let (ledger, ids) = ledger_with(2);
        assert_eq!(ledger.official, Some(ids[0]));
    }

    #[test]
    fn history_is_newest_first() {
        let (ledger, ids) = ledger_with(3);
        let order: Vec<Uuid> = ledger.history().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn deleting_other_set_keeps_official() {
        let (mut ledger, ids) = ledger_with(3);
        ledger.set_official(ids[1]).unwrap();
        ledger.delete(ids[0], far_future(), Duration::hours(24)).unwrap();
        assert_eq!(ledger.official, Some(ids[1]));
    }

    #[test]
    fn deleting_official_reassigns_to_newest() {
        let (mut ledger, ids) = ledger_with(3);
        ledger.set_official(ids[2]).unwrap();
        ledger.delete(ids[2], far_future(), Duration::hours(24)).unwrap();
        assert_eq!(ledger.official, Some(ids[1]));
    }

    #[test]
    fn refusals_in_order() {
        let (mut ledger, ids) = ledger_with(1);
        let err = ledger.delete(ids[0], far_future(), Duration::hours(24)).unwrap_err();
        assert_eq!(err.delete_refusal(), Some(DeleteRefusal::OnlyRemainingVersion));

        let (mut ledger, ids) = ledger_with(2);
        ledger.record_graded(ids[0]).unwrap();
        let err = ledger.delete(ids[0], far_future(), Duration::hours(24)).unwrap_err();
        assert_eq!(err.delete_refusal(), Some(DeleteRefusal::HasGradedResults));

        let recent = DateTime::<Utc>::UNIX_EPOCH + Duration::hours(2);
        let err = ledger.delete(ids[1], recent, Duration::hours(24)).unwrap_err();
        assert_eq!(err.delete_refusal(), Some(DeleteRefusal::WithinCooldown));
        assert_eq!(ledger.sets.len(), 2);
    }

    #[test]
    fn compare_and_set_detects_lost_race() {
        let (mut ledger, ids) = ledger_with(2);
        ledger.compare_and_set_official(Some(ids[0]), ids[1]).unwrap();
        let err = ledger.compare_and_set_official(Some(ids[0]), ids[0]).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(ledger.official, Some(ids[1]));
    }

    #[test]
    fn repair_fixes_dangling_pointer() {
        let (mut ledger, ids) = ledger_with(2);
        ledger.official = Some(Uuid::new_v4());
        ledger.repair();
        assert_eq!(ledger.official, Some(ids[1]));

        ledger.official = None;
        ledger.repair();
        assert_eq!(ledger.official, Some(ids[1]));
    }

    #[test]
    fn build_set_rejects_inconsistent_permutations() {
        let exam = three_question_exam();
        let mut perms = set_with_orders(&exam, &[&[1, 2, 3], &[3, 2, 1]]).permutations;
        perms[1].sequence.pop();
        let err = build_set(1, None, perms, Utc::now()).unwrap_err();
        assert!(err.is_validation());
    }
}
