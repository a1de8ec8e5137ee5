//! In-memory variant store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use uuid::Uuid;

use super::{build_set, foreign_or_missing, lock, ExamLedger, VariantStore, DEFAULT_COOLDOWN_HOURS};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, CoreResult};
use crate::model::ExamId;
use crate::variant::{Permutation, VariantSet};

/// Variant store kept in process memory. All ledgers share one lock.
pub struct InMemoryVariantStore {
    ledgers: Mutex<HashMap<ExamId, ExamLedger>>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl InMemoryVariantStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), Duration::hours(DEFAULT_COOLDOWN_HOURS))
    }

    pub fn with_clock(clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            clock,
            cooldown,
        }
    }
}

impl Default for InMemoryVariantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariantStore for InMemoryVariantStore {
    fn append(
        &self,
        exam_id: ExamId,
        created_by: Option<String>,
        permutations: Vec<Permutation>,
    ) -> CoreResult<VariantSet> {
        let set = build_set(exam_id, created_by, permutations, self.clock.now())?;
        let mut ledgers = lock(&self.ledgers)?;
        ledgers
            .entry(exam_id)
            .or_insert_with(|| ExamLedger::new(exam_id))
            .push(set.clone());
        Ok(set)
    }

    fn get(&self, id: Uuid) -> CoreResult<VariantSet> {
        let ledgers = lock(&self.ledgers)?;
        ledgers
            .values()
            .find_map(|l| l.get(id))
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("variant set {id}")))
    }

    fn history(&self, exam_id: ExamId) -> CoreResult<Vec<VariantSet>> {
        let ledgers = lock(&self.ledgers)?;
        Ok(ledgers.get(&exam_id).map(ExamLedger::history).unwrap_or_default())
    }

    fn official(&self, exam_id: ExamId) -> CoreResult<Option<VariantSet>> {
        let ledgers = lock(&self.ledgers)?;
        Ok(ledgers
            .get(&exam_id)
            .and_then(ExamLedger::official_set)
            .cloned())
    }

    fn set_official(&self, exam_id: ExamId, id: Uuid) -> CoreResult<()> {
        let mut ledgers = lock(&self.ledgers)?;
        owning_ledger(&mut ledgers, exam_id, id)?.set_official(id)
    }

    fn compare_and_set_official(
        &self,
        exam_id: ExamId,
        expected: Option<Uuid>,
        id: Uuid,
    ) -> CoreResult<()> {
        let mut ledgers = lock(&self.ledgers)?;
        owning_ledger(&mut ledgers, exam_id, id)?.compare_and_set_official(expected, id)
    }

    fn delete_if_unreferenced(&self, id: Uuid) -> CoreResult<VariantSet> {
        let now = self.clock.now();
        let mut ledgers = lock(&self.ledgers)?;
        let ledger = ledgers
            .values_mut()
            .find(|l| l.contains(id))
            .ok_or_else(|| CoreError::not_found(format!("variant set {id}")))?;
        ledger.delete(id, now, self.cooldown)
    }

    fn record_graded(&self, id: Uuid) -> CoreResult<()> {
        let mut ledgers = lock(&self.ledgers)?;
        let ledger = ledgers
            .values_mut()
            .find(|l| l.contains(id))
            .ok_or_else(|| CoreError::not_found(format!("variant set {id}")))?;
        ledger.record_graded(id)
    }

    fn graded_count(&self, id: Uuid) -> CoreResult<usize> {
        let ledgers = lock(&self.ledgers)?;
        Ok(ledgers
            .values()
            .find_map(|l| l.graded.get(&id).copied())
            .unwrap_or(0))
    }
}

/// The ledger of `exam_id`, provided it holds `id`.
fn owning_ledger(
    ledgers: &mut HashMap<ExamId, ExamLedger>,
    exam_id: ExamId,
    id: Uuid,
) -> CoreResult<&mut ExamLedger> {
    if !ledgers.get(&exam_id).is_some_and(|l| l.contains(id)) {
        return Err(foreign_or_missing(ledgers.values(), exam_id, id));
    }
    ledgers
        .get_mut(&exam_id)
        .ok_or_else(|| CoreError::not_found(format!("exam {exam_id}")))
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::clock::FixedClock;
    use crate::error::DeleteRefusal;
    use crate::generator::PermutationGenerator;
    use crate::model::fixtures::three_question_exam;

    fn store() -> (InMemoryVariantStore, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let store = InMemoryVariantStore::with_clock(clock.clone(), Duration::hours(24));
        (store, clock)
    }

    fn perms(seed: u64) -> Vec<Permutation> {
        PermutationGenerator::seeded(seed).generate(&three_question_exam().questions, 5)
    }

    #[test]
    fn append_and_read_back() {
        let (store, _) = store();
        let set = store.append(1, Some("prof".into()), perms(1)).unwrap();
        assert_eq!(set.question_count, 3);
        assert_eq!(set.variant_count(), 5);
        assert_eq!(store.get(set.id).unwrap(), set);
        assert_eq!(store.official(1).unwrap().unwrap().id, set.id);
        assert!(store.official(2).unwrap().is_none());
        assert!(store.history(2).unwrap().is_empty());
    }

    #[test]
    fn set_official_from_another_exam_is_a_conflict() {
        let (store, _) = store();
        let a = store.append(1, None, perms(1)).unwrap();
        let b = store.append(2, None, perms(2)).unwrap();

        let err = store.set_official(1, b.id).unwrap_err();
        assert!(err.is_conflict());
        let err = store.set_official(1, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        store.set_official(1, a.id).unwrap();
        store.set_official(1, a.id).unwrap();
        assert_eq!(store.official(1).unwrap().unwrap().id, a.id);
    }

    #[test]
    fn delete_rules_follow_the_clock() {
        let (store, clock) = store();
        let a = store.append(1, None, perms(1)).unwrap();
        let err = store.delete_if_unreferenced(a.id).unwrap_err();
        assert_eq!(err.delete_refusal(), Some(DeleteRefusal::OnlyRemainingVersion));

        clock.advance(Duration::hours(1));
        let b = store.append(1, None, perms(2)).unwrap();
        store.set_official(1, b.id).unwrap();

        let err = store.delete_if_unreferenced(a.id).unwrap_err();
        assert_eq!(err.delete_refusal(), Some(DeleteRefusal::WithinCooldown));

        clock.advance(Duration::hours(24));
        store.delete_if_unreferenced(a.id).unwrap();
        assert_eq!(store.official(1).unwrap().unwrap().id, b.id);
        assert_eq!(store.history(1).unwrap().len(), 1);
    }

    #[test]
    fn graded_sets_cannot_be_deleted() {
        let (store, clock) = store();
        let a = store.append(1, None, perms(1)).unwrap();
        store.append(1, None, perms(2)).unwrap();
        store.record_graded(a.id).unwrap();
        assert_eq!(store.graded_count(a.id).unwrap(), 1);

        clock.advance(Duration::days(3));
        let err = store.delete_if_unreferenced(a.id).unwrap_err();
        assert_eq!(err.delete_refusal(), Some(DeleteRefusal::HasGradedResults));
    }

    #[test]
    fn find_by_short_code_prefix() {
        let (store, _) = store();
        let a = store.append(1, None, perms(1)).unwrap();
        let found = store.find(1, &a.short_code().to_lowercase()).unwrap();
        assert_eq!(found.id, a.id);
        assert_eq!(store.find(1, &a.id.to_string()).unwrap().id, a.id);
        assert!(store.find(2, &a.id.to_string()).is_err());
    }

    #[test]
    fn concurrent_set_official_lands_on_one_requested_value() {
        let (store, _) = store();
        let store = Arc::new(store);
        let a = store.append(1, None, perms(1)).unwrap();
        let b = store.append(1, None, perms(2)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = if i % 2 == 0 { a.id } else { b.id };
                thread::spawn(move || store.set_official(1, id).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let official = store.official(1).unwrap().unwrap().id;
        assert!(official == a.id || official == b.id);
    }
}
