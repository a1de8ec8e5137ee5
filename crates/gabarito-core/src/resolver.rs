//! Key resolution: (variant set, variant, position) → question.
//!
//! Pure and total. Out-of-range or malformed input yields `None`, never a
//! panic or an error.

use crate::index::to_offset;
use crate::model::{Letter, QuestionId};
use crate::variant::VariantSet;

/// One resolved answer-sheet slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub question_id: QuestionId,
    /// Correct letter taken from the variant's own key.
    pub correct: Option<Letter>,
}

/// Real question id printed at `position` of variant `variant_index`.
pub fn resolve(set: &VariantSet, variant_index: u32, position: u32) -> Option<QuestionId> {
    let permutation = set.permutation(variant_index)?;
    let offset = to_offset(position, permutation.len())?;
    Some(permutation.sequence[offset])
}

/// Like [`resolve`], also returning the correct letter from the variant key.
pub fn resolve_slot(set: &VariantSet, variant_index: u32, position: u32) -> Option<ResolvedSlot> {
    let question_id = resolve(set, variant_index, position)?;
    let correct = set
        .permutation(variant_index)
        .and_then(|p| p.key_letter(position));
    Some(ResolvedSlot {
        question_id,
        correct,
    })
}
