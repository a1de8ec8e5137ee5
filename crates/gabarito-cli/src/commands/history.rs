//! The `gabarito history` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use gabarito_core::config::load_config_from;
use gabarito_core::VariantStore;

pub fn execute(exam_id: u64, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = super::open_store(&config)?;

    let history = store.history(exam_id)?;
    if history.is_empty() {
        println!("Exam {exam_id} has no variant sets. Run `gabarito generate --exam {exam_id}`.");
        return Ok(());
    }
    let official = store.official(exam_id)?.map(|s| s.id);

    let mut table = Table::new();
    table.set_header(vec![
        "Code", "Created", "By", "Questions", "Variants", "Graded", "Official", "Key (versao1)",
    ]);

    for set in &history {
        table.add_row(vec![
            Cell::new(set.short_code()),
            Cell::new(set.created_at.format("%Y-%m-%d %H:%M")),
            Cell::new(set.created_by.as_deref().unwrap_or("-")),
            Cell::new(set.question_count),
            Cell::new(set.variant_count()),
            Cell::new(store.graded_count(set.id)?),
            Cell::new(if official == Some(set.id) { "yes" } else { "" }),
            Cell::new(set.key_summary(1, 10)),
        ]);
    }

    println!("{table}");
    Ok(())
}
