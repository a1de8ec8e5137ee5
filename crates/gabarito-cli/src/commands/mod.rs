//! One module per subcommand, plus the plumbing they share.

pub mod compare;
pub mod delete;
pub mod generate;
pub mod grade;
pub mod history;
pub mod init;
pub mod official;
pub mod report;
pub mod resolve;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use gabarito_core::clock::SystemClock;
use gabarito_core::config::{load_config_from, GabaritoConfig};
use gabarito_core::model::Exam;
use gabarito_core::parser;
use gabarito_core::traits::StaticQuestionSource;
use gabarito_core::{FileVariantStore, GabaritoService};

/// Load one exam file, or every exam under a directory.
pub fn load_exams(path: &Path) -> Result<Vec<Exam>> {
    if path.is_dir() {
        parser::load_exam_directory(path)
    } else {
        Ok(vec![parser::parse_exam(path)?])
    }
}

pub fn open_store(config: &GabaritoConfig) -> Result<FileVariantStore> {
    FileVariantStore::open_with_clock(&config.state_dir, Arc::new(SystemClock), config.cooldown())
        .with_context(|| format!("failed to open state dir {}", config.state_dir.display()))
}

/// Build the service over the state dir; `exams` is only needed by commands
/// that read questions.
pub fn open_service(config_path: Option<&Path>, exams: Option<&Path>) -> Result<GabaritoService> {
    let config = load_config_from(config_path)?;
    let store = open_store(&config)?;
    let exams = match exams {
        Some(path) => load_exams(path)?,
        None => Vec::new(),
    };
    Ok(GabaritoService::new(
        Arc::new(StaticQuestionSource::new(exams)),
        Arc::new(store),
        config,
    ))
}
