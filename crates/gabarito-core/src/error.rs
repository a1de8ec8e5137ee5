//! Core error types.
//!
//! Only operations that must not half-apply raise hard errors: input
//! validation at the ingestion boundary and variant-store conflicts. Lookups
//! that can miss (the resolver, per-answer grading) return `Option`s or
//! anomalies instead.

use thiserror::Error;
use uuid::Uuid;

use crate::model::ExamId;

/// Why a variant set could not be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeleteRefusal {
    /// At least one graded result was produced with this set.
    #[error("has graded results")]
    HasGradedResults,
    /// Deleting would leave the exam without any variant set.
    #[error("is the only remaining version")]
    OnlyRemainingVersion,
    /// The set may still be in classroom use.
    #[error("created within the cool-down window")]
    WithinCooldown,
}

/// A store operation that conflicts with the current state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("variant set {variant_set} cannot be deleted: it {reason}")]
    Delete {
        variant_set: Uuid,
        reason: DeleteRefusal,
    },
    #[error("variant set {variant_set} belongs to exam {owner}, not exam {requested}")]
    ForeignVariantSet {
        variant_set: Uuid,
        owner: ExamId,
        requested: ExamId,
    },
    /// `compare_and_set_official` lost the race.
    #[error(
        "official variant set of exam {exam} is {}, expected {}",
        display_opt(.actual),
        display_opt(.expected)
    )]
    OfficialChanged {
        exam: ExamId,
        expected: Option<Uuid>,
        actual: Option<Uuid>,
    },
}

fn display_opt(id: &Option<Uuid>) -> String {
    id.map(|u| u.to_string()).unwrap_or_else(|| "none".into())
}

/// Errors raised by the gabarito core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller-fixable input problem, rejected before any work is done.
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced exam, variant set or question does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with stored state.
    #[error("conflict: {0}")]
    Conflict(Conflict),

    /// Rendered artifacts of an exam could not be invalidated.
    #[error("cached artifacts of exam {exam} are stale: {message}")]
    CacheInvalidation { exam: ExamId, message: String },

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    /// Returns `true` for caller-fixable input errors.
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::Validation(_))
    }

    /// Returns `true` if the operation was refused because of stored state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }

    /// The delete refusal reason, if this is one.
    pub fn delete_refusal(&self) -> Option<DeleteRefusal> {
        match self {
            CoreError::Conflict(Conflict::Delete { reason, .. }) => Some(*reason),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
