//! The `gabarito generate` command.

use std::path::PathBuf;

use anyhow::Result;

pub fn execute(
    exams_path: PathBuf,
    exam_id: u64,
    by: Option<String>,
    official: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let service = super::open_service(config_path.as_deref(), Some(&exams_path))?;

    let set = service.generate_variant_set(exam_id, by.as_deref())?;
    if official {
        service.set_official_variant_set(exam_id, set.id)?;
    }
    let is_official = service
        .store()
        .official(exam_id)?
        .is_some_and(|o| o.id == set.id);

    println!(
        "Variant set {} ({}) for exam {}: {} questions x {} variants{}",
        set.short_code(),
        set.id,
        exam_id,
        set.question_count,
        set.variant_count(),
        if is_official { " [official]" } else { "" }
    );
    for p in &set.permutations {
        println!("  versao{}: {}", p.variant, set.key_summary(p.variant, set.question_count));
    }

    Ok(())
}
