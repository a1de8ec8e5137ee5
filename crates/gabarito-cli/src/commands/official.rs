//! The `gabarito set-official` command.

use std::path::PathBuf;

use anyhow::Result;

pub fn execute(exam_id: u64, selector: String, config_path: Option<PathBuf>) -> Result<()> {
    let service = super::open_service(config_path.as_deref(), None)?;

    let set = service.store().find(exam_id, &selector)?;
    service.set_official_variant_set(exam_id, set.id)?;

    println!("Variant set {} is now official for exam {exam_id}.", set.short_code());
    Ok(())
}
