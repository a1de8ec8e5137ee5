//! Submission ingestion.
//!
//! Clients send one of two shapes for the variant selector (`"versaoN"` or a
//! bare `tipo_prova` integer) and position keys as strings. Everything is
//! normalized here, once, into a [`Submission`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::index::{normalize_variant_index, Position, RawVariant, VariantIndex};
use crate::model::{ExamId, LearnerId};

/// A submission exactly as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSubmission {
    pub learner_id: LearnerId,
    pub exam_id: ExamId,
    /// Variant set recorded against this learner, if any.
    #[serde(default)]
    pub variant_set: Option<Uuid>,
    /// Mobile form: `"versao3"`.
    #[serde(default)]
    pub versao: Option<RawVariant>,
    /// Scanner form: `3` or `"3"`.
    #[serde(default)]
    pub tipo_prova: Option<RawVariant>,
    /// Position (as a string key) → chosen mark.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

/// A validated submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub learner_id: LearnerId,
    pub exam_id: ExamId,
    pub variant_set: Option<Uuid>,
    pub variant: VariantIndex,
    /// Chosen marks, trimmed and upper-cased.
    pub answers: BTreeMap<Position, String>,
}

impl RawSubmission {
    /// Validate against `variant_count` variants.
    pub fn normalize(&self, variant_count: u32) -> CoreResult<Submission> {
        let variant = match (&self.versao, &self.tipo_prova) {
            (Some(versao), Some(tipo)) => {
                let a = normalize_variant_index(Some(versao), variant_count)?;
                let b = normalize_variant_index(Some(tipo), variant_count)?;
                if a != b {
                    return Err(CoreError::validation(format!(
                        "versao selects variant {a} but tipo_prova selects variant {b}"
                    )));
                }
                a
            }
            (Some(raw), None) | (None, Some(raw)) => {
                normalize_variant_index(Some(raw), variant_count)?
            }
            (None, None) => normalize_variant_index(None, variant_count)?,
        };

        let answers = self
            .answers
            .iter()
            .map(|(position, chosen)| {
                Ok((Position::parse(position)?, chosen.trim().to_uppercase()))
            })
            .collect::<CoreResult<BTreeMap<_, _>>>()?;

        Ok(Submission {
            learner_id: self.learner_id,
            exam_id: self.exam_id,
            variant_set: self.variant_set,
            variant,
            answers,
        })
    }
}

/// Parse a JSON document holding one submission or an array of them.
pub fn parse_submissions(json: &str) -> CoreResult<Vec<RawSubmission>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<RawSubmission>),
        One(RawSubmission),
    }

    let parsed: OneOrMany = serde_json::from_str(json)
        .map_err(|e| CoreError::validation(format!("malformed submission: {e}")))?;
    Ok(match parsed {
        OneOrMany::Many(all) => all,
        OneOrMany::One(one) => vec![one],
    })
}
