//! The `gabarito report` command.

use std::path::PathBuf;

use anyhow::Result;

use gabarito_core::report::{load_results, ClassReport};

pub fn execute(results_path: PathBuf, format: String) -> Result<()> {
    let results = load_results(&results_path)?;
    if results.is_empty() {
        anyhow::bail!("no results in {}", results_path.display());
    }
    let report = ClassReport::from_results(&results);

    match format.as_str() {
        "markdown" | "md" => println!("{}", report.to_markdown()),
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &ClassReport) {
    use comfy_table::{Cell, Table};

    let s = &report.summary;
    println!(
        "{} learners ({} results): average {:.2}, highest {:.2}, lowest {:.2}",
        s.participants, s.results, s.average_score, s.highest_score, s.lowest_score
    );

    let mut table = Table::new();
    table.set_header(vec!["Question", "Subject", "Answered", "Correct %", "Most chosen"]);
    for item in &report.items {
        table.add_row(vec![
            Cell::new(item.question_id),
            Cell::new(&item.subject),
            Cell::new(item.answered),
            Cell::new(format!("{:.1}%", item.percent_correct)),
            Cell::new(item.most_chosen.map(|l| l.to_string()).unwrap_or_else(|| "-".into())),
        ]);
    }
    println!("{table}");
}
