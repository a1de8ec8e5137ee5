//! The `gabarito validate` command.

use std::path::PathBuf;

use anyhow::Result;

use gabarito_core::config::load_config_from;
use gabarito_core::parser::validate_exam;

pub fn execute(exams_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let exams = super::load_exams(&exams_path)?;

    let mut total_warnings = 0;

    for exam in &exams {
        println!(
            "Exam {}: {} ({} questions)",
            exam.id,
            exam.title,
            exam.question_count()
        );

        let warnings = validate_exam(exam, config.max_questions);
        for w in &warnings {
            let prefix = w
                .question_id
                .map(|id| format!("  [q{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All exams valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
