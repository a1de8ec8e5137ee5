//! The `gabarito delete` command.

use std::path::PathBuf;

use anyhow::Result;

pub fn execute(exam_id: u64, selector: String, config_path: Option<PathBuf>) -> Result<()> {
    let service = super::open_service(config_path.as_deref(), None)?;

    let removed = service.delete_variant_set(exam_id, &selector)?;
    println!("Deleted variant set {} ({}).", removed.short_code(), removed.id);

    if let Some(official) = service.store().official(exam_id)? {
        println!("Official variant set: {}", official.short_code());
    }
    Ok(())
}
