//! The `gabarito resolve` command.

use std::path::PathBuf;

use anyhow::Result;

use gabarito_core::index::RawVariant;

pub fn execute(
    exam_id: u64,
    selector: Option<String>,
    variant: String,
    position: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let service = super::open_service(config_path.as_deref(), None)?;

    let raw = RawVariant::from(variant.as_str());
    match service.resolve_in_exam(exam_id, selector.as_deref(), &raw, &position)? {
        Some(slot) => {
            let correct = slot.correct.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
            println!(
                "versao{} position {} -> question {} (correct: {correct})",
                slot.variant, slot.position, slot.question_id
            );
            Ok(())
        }
        None => anyhow::bail!(
            "no question at position {position} of variant {variant} for exam {exam_id}"
        ),
    }
}
