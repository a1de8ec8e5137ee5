//! gabarito-core: variant generation, answer-key resolution, and grading.
//!
//! An exam is a canonical ordered list of questions. For each exam this crate
//! generates *variant sets* (K shuffled orderings with their answer keys),
//! keeps an append-only history of them with one designated official set,
//! resolves (variant, position) pairs back to questions, and grades learner
//! submissions against the right key with per-subject and per-topic rollups.
//!
//! All 1-based variant and position numbers cross into 0-based storage
//! offsets in [`index`] and nowhere else.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod grading;
pub mod index;
pub mod model;
pub mod parser;
pub mod recorder;
pub mod report;
pub mod resolver;
pub mod service;
pub mod statistics;
pub mod store;
pub mod submission;
pub mod traits;
pub mod variant;

pub use error::{CoreError, CoreResult};
pub use grading::{GradeOutcome, GradedResult, GradingEngine, KeyTier};
pub use service::GabaritoService;
pub use store::{FileVariantStore, InMemoryVariantStore, VariantStore};
pub use variant::{Permutation, VariantSet};
