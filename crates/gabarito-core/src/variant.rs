//! Variant sets: the K shuffled orderings generated together for one exam.
//!
//! A `VariantSet` is the unit of persistence and audit. Apart from the
//! store's official pointer it is never mutated after creation.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::index::to_offset;
use crate::model::{ExamId, Letter, Question, QuestionId};

/// The key type graded today. Types 2..=5 are carried but reserved.
pub const PRIMARY_KEY_TYPE: u8 = 1;

/// One position of an answer key.
///
/// Stored keys come in three historical shapes: a bare letter, a legacy
/// object keyed `tipo1..tipo5`, and the canonical `{"by_type": {...}}`. All of
/// them decode into this struct here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawAnswerKeyEntry")]
pub struct AnswerKeyEntry {
    pub by_type: BTreeMap<u8, Letter>,
}

impl AnswerKeyEntry {
    pub fn new(letter: Letter) -> Self {
        Self {
            by_type: BTreeMap::from([(PRIMARY_KEY_TYPE, letter)]),
        }
    }

    /// The letter graded against.
    pub fn letter(&self) -> Option<Letter> {
        self.by_type.get(&PRIMARY_KEY_TYPE).copied()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnswerKeyEntry {
    Plain(String),
    // Map keys arrive as strings inside an untagged enum.
    Typed { by_type: BTreeMap<String, String> },
    Legacy(BTreeMap<String, String>),
}

impl From<RawAnswerKeyEntry> for AnswerKeyEntry {
    fn from(raw: RawAnswerKeyEntry) -> Self {
        let mut by_type = BTreeMap::new();
        match raw {
            RawAnswerKeyEntry::Plain(s) => {
                if let Ok(letter) = s.parse() {
                    by_type.insert(PRIMARY_KEY_TYPE, letter);
                }
            }
            RawAnswerKeyEntry::Typed { by_type: typed } => {
                for (t, s) in typed {
                    if let (Ok(t), Ok(letter)) = (t.parse::<u8>(), s.parse()) {
                        by_type.insert(t, letter);
                    }
                }
            }
            RawAnswerKeyEntry::Legacy(map) => {
                for (name, s) in &map {
                    let Ok(letter) = s.parse::<Letter>() else {
                        continue;
                    };
                    if let Some(t) = name.strip_prefix("tipo").and_then(|n| n.parse::<u8>().ok()) {
                        by_type.insert(t, letter);
                    }
                }
                if !by_type.contains_key(&PRIMARY_KEY_TYPE) {
                    if let Some(letter) = map.get("resposta").and_then(|s| s.parse().ok()) {
                        by_type.insert(PRIMARY_KEY_TYPE, letter);
                    }
                }
            }
        }
        AnswerKeyEntry { by_type }
    }
}

/// One shuffled ordering of an exam's questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permutation {
    /// 1-based variant index.
    #[serde(default)]
    pub variant: u32,
    /// `sequence[i]` is the question printed at position `i + 1`.
    #[serde(alias = "questoes")]
    pub sequence: Vec<QuestionId>,
    /// Position → correct letter for this ordering.
    #[serde(alias = "gabarito", default)]
    pub key: BTreeMap<u32, AnswerKeyEntry>,
}

impl Permutation {
    /// Build a permutation from questions already in their shuffled order.
    pub fn from_order(variant: u32, ordered: &[&Question]) -> Self {
        let sequence = ordered.iter().map(|q| q.id).collect();
        let key = ordered
            .iter()
            .zip(1u32..)
            .map(|(q, position)| (position, AnswerKeyEntry::new(q.correct)))
            .collect();
        Self {
            variant,
            sequence,
            key,
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Correct letter at a 1-based position, read from this variant's key.
    pub fn key_letter(&self, position: u32) -> Option<Letter> {
        self.key.get(&position).and_then(AnswerKeyEntry::letter)
    }
}

/// The K permutations generated together for an exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSet {
    /// Opaque globally-unique id; its leading hex digits are printed on sheets.
    pub id: Uuid,
    pub exam_id: ExamId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub question_count: usize,
    #[serde(default)]
    pub permutations: Vec<Permutation>,
    #[serde(default)]
    pub notes: String,
}

impl VariantSet {
    /// Short human code printed on answer sheets (first 8 hex digits).
    pub fn short_code(&self) -> String {
        short_code(&self.id)
    }

    pub fn variant_count(&self) -> usize {
        self.permutations.len()
    }

    /// The permutation for a 1-based variant index, if present and well-formed.
    pub fn permutation(&self, variant: u32) -> Option<&Permutation> {
        let offset = to_offset(variant, self.permutations.len())?;
        let permutation = &self.permutations[offset];
        (permutation.variant == variant).then_some(permutation)
    }

    /// Renumber permutations decoded from storage that predate explicit
    /// variant numbers.
    pub fn fill_missing_variant_numbers(&mut self) {
        for (permutation, variant) in self.permutations.iter_mut().zip(1u32..) {
            if permutation.variant == 0 {
                permutation.variant = variant;
            }
        }
    }

    /// `"1:A | 2:B | ..."` for one variant, truncated after `limit` positions.
    pub fn key_summary(&self, variant: u32, limit: usize) -> String {
        let Some(permutation) = self.permutation(variant) else {
            return String::new();
        };
        let mut parts: Vec<String> = permutation
            .key
            .iter()
            .take(limit)
            .map(|(position, entry)| {
                let letter = entry.letter().map(|l| l.to_string()).unwrap_or_else(|| "N/A".into());
                format!("{position}:{letter}")
            })
            .collect();
        if permutation.key.len() > limit {
            if let Some(last) = parts.last_mut() {
                last.push_str("...");
            }
        }
        parts.join(" | ")
    }

    /// Structural problems that would make positions unresolvable.
    pub fn consistency_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let reference = self.permutations.first().map(|p| multiset(&p.sequence));

        for (permutation, expected_variant) in self.permutations.iter().zip(1u32..) {
            let v = expected_variant;
            if permutation.variant != expected_variant {
                issues.push(format!(
                    "variant {v}: stored variant number is {}",
                    permutation.variant
                ));
            }
            if permutation.len() != self.question_count {
                issues.push(format!(
                    "variant {v}: {} questions, expected {}",
                    permutation.len(),
                    self.question_count
                ));
            }
            let counts = multiset(&permutation.sequence);
            if counts.values().any(|&c| c > 1) {
                issues.push(format!("variant {v}: duplicate question ids"));
            }
            if reference.as_ref().is_some_and(|r| *r != counts) {
                issues.push(format!("variant {v}: not a permutation of variant 1"));
            }
            for position in 1..=permutation.len() as u32 {
                if permutation.key_letter(position).is_none() {
                    issues.push(format!("variant {v}: no key letter at position {position}"));
                }
            }
        }

        issues
    }
}

/// First 8 hex digits of a uuid, upper-case.
pub fn short_code(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}

fn multiset(ids: &[QuestionId]) -> HashMap<QuestionId, usize> {
    let mut counts = HashMap::new();
    for id in ids {
        *counts.entry(*id).or_insert(0) += 1;
    }
    counts
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::three_question_exam;

    #[test]
    fn key_entry_decodes_every_stored_shape() {
        let plain: AnswerKeyEntry = serde_json::from_str(r#""c""#).unwrap();
        assert_eq!(plain.letter(), Some(Letter::C));

        let legacy: AnswerKeyEntry =
            serde_json::from_str(r#"{"tipo1": "B", "tipo2": "B", "tipo5": "B"}"#).unwrap();
        assert_eq!(legacy.letter(), Some(Letter::B));
        assert_eq!(legacy.by_type.len(), 3);

        let resposta: AnswerKeyEntry = serde_json::from_str(r#"{"resposta": "E"}"#).unwrap();
        assert_eq!(resposta.letter(), Some(Letter::E));

        let typed: AnswerKeyEntry = serde_json::from_str(r#"{"by_type": {"1": "A"}}"#).unwrap();
        assert_eq!(typed.letter(), Some(Letter::A));

        let broken: AnswerKeyEntry = serde_json::from_str(r#""N/A""#).unwrap();
        assert_eq!(broken.letter(), None);
    }

    #[test]
    fn canonical_entry_roundtrips() {
        let entry = AnswerKeyEntry::new(Letter::D);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"by_type":{"1":"D"}}"#);
        let back: AnswerKeyEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn stored_set_decodes_back() {
        let exam = three_question_exam();
        let set = fixtures::set_with_orders(&exam, &[&[1, 2, 3], &[3, 1, 2]]);
        let json = serde_json::to_string_pretty(&set).unwrap();
        let back: VariantSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
        assert_eq!(back.permutation(2).unwrap().key_letter(1), set.permutations[1].key_letter(1));
    }

    #[test]
    fn legacy_permutation_fields_decode() {
        let json = r#"{"questoes": [3, 1], "gabarito": {"1": {"tipo1": "C"}, "2": "A"}}"#;
        let p: Permutation = serde_json::from_str(json).unwrap();
        assert_eq!(p.variant, 0);
        assert_eq!(p.sequence, vec![3, 1]);
        assert_eq!(p.key_letter(1), Some(Letter::C));
        assert_eq!(p.key_letter(2), Some(Letter::A));
    }

    #[test]
    fn short_code_is_eight_uppercase_hex_digits() {
        let id = Uuid::parse_str("0a1b2c3d-4e5f-6789-abcd-ef0123456789").unwrap();
        assert_eq!(short_code(&id), "0A1B2C3D");
    }

    #[test]
    fn permutation_lookup_checks_numbering() {
        let exam = three_question_exam();
        let mut set = fixtures::set_with_orders(&exam, &[&[1, 2, 3], &[3, 1, 2]]);
        assert_eq!(set.permutation(2).unwrap().sequence, vec![3, 1, 2]);
        assert!(set.permutation(0).is_none());
        assert!(set.permutation(3).is_none());

        set.permutations[1].variant = 7;
        assert!(set.permutation(2).is_none());
    }

    #[test]
    fn fills_missing_variant_numbers() {
        let exam = three_question_exam();
        let mut set = fixtures::set_with_orders(&exam, &[&[1, 2, 3], &[2, 3, 1]]);
        for p in &mut set.permutations {
            p.variant = 0;
        }
        set.fill_missing_variant_numbers();
        assert_eq!(set.permutations[1].variant, 2);
        assert!(set.consistency_issues().is_empty());
    }

    #[test]
    fn key_summary_truncates() {
        let exam = three_question_exam();
        let set = fixtures::set_with_orders(&exam, &[&[3, 1, 2]]);
        assert_eq!(set.key_summary(1, 10), "1:C | 2:A | 3:B");
        assert_eq!(set.key_summary(1, 2), "1:C | 2:A...");
        assert_eq!(set.key_summary(4, 10), "");
    }

    #[test]
    fn consistency_issues_detect_broken_permutations() {
        let exam = three_question_exam();
        let mut set = fixtures::set_with_orders(&exam, &[&[1, 2, 3], &[3, 1, 2]]);
        assert!(set.consistency_issues().is_empty());

        set.permutations[1].sequence = vec![3, 3, 2];
        set.permutations[1].key.remove(&2);
        let issues = set.consistency_issues();
        assert!(issues.iter().any(|i| i.contains("duplicate")));
        assert!(issues.iter().any(|i| i.contains("not a permutation")));
        assert!(issues.iter().any(|i| i.contains("position 2")));
    }
}
