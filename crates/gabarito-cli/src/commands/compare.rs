//! The `gabarito compare` command.

use std::path::PathBuf;

use anyhow::Result;

use gabarito_core::config::load_config_from;
use gabarito_core::report::{compare_variant_sets, KeyDiff};
use gabarito_core::VariantStore;

pub fn execute(
    exam_id: u64,
    a: String,
    b: String,
    variant: Option<u32>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = super::open_store(&config)?;

    let set_a = store.find(exam_id, &a)?;
    let set_b = store.find(exam_id, &b)?;

    let variants: Vec<u32> = match variant {
        Some(v) => vec![v],
        None => {
            let k = set_a.variant_count().max(set_b.variant_count()) as u32;
            (1..=k).collect()
        }
    };
    let diffs: Vec<KeyDiff> = variants
        .iter()
        .map(|&v| compare_variant_sets(&set_a, &set_b, v))
        .collect();

    match format.as_str() {
        "markdown" | "md" => {
            println!(
                "## Answer keys: {} vs {}\n",
                set_a.short_code(),
                set_b.short_code()
            );
            for diff in &diffs {
                println!("{}", diff.to_markdown());
            }
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&diffs)?);
        }
        _ => {
            // text format
            println!(
                "Comparing {} with {} (exam {exam_id})",
                set_a.short_code(),
                set_b.short_code()
            );
            for diff in &diffs {
                if diff.is_identical() {
                    println!("  versao{}: identical", diff.variant);
                    continue;
                }
                println!(
                    "  versao{}: {} differences ({:.2}%)",
                    diff.variant, diff.total_differences, diff.percent
                );
                for c in &diff.changed {
                    println!(
                        "    position {}: {} -> {}",
                        c.position,
                        c.before.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
                        c.after.map(|l| l.to_string()).unwrap_or_else(|| "-".into())
                    );
                }
                if !diff.added.is_empty() {
                    println!("    added positions: {:?}", diff.added);
                }
                if !diff.removed.is_empty() {
                    println!("    removed positions: {:?}", diff.removed);
                }
            }
        }
    }

    Ok(())
}
