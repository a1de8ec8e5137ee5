//! The `gabarito grade` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use gabarito_core::engine::{BatchGrader, BatchReport, ProgressReporter};
use gabarito_core::model::{ExamId, LearnerId};
use gabarito_core::recorder::JsonlRecorder;
use gabarito_core::submission::parse_submissions;
use gabarito_core::GradeOutcome;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_submission_start(&self, _: LearnerId, _: ExamId) {}

    fn on_submission_graded(&self, outcome: &GradeOutcome) {
        let r = &outcome.result;
        eprintln!(
            "  Graded: learner {} exam {} versao{} [{}] {}/{}",
            r.learner_id, r.exam_id, r.variant, r.key_tier, r.correct_count, r.total_graded
        );
    }

    fn on_submission_error(&self, learner_id: LearnerId, exam_id: ExamId, error: &str) {
        eprintln!("  ERROR: learner {learner_id} exam {exam_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, graded: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {graded}/{total} graded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    exams_path: PathBuf,
    submissions_path: PathBuf,
    record: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let service = super::open_service(config_path.as_deref(), Some(&exams_path))?;

    let content = std::fs::read_to_string(&submissions_path)
        .with_context(|| format!("failed to read {}", submissions_path.display()))?;
    let submissions = parse_submissions(&content)
        .with_context(|| format!("invalid submissions in {}", submissions_path.display()))?;

    let mut grader = BatchGrader::new(Arc::new(service));
    if let Some(path) = &record {
        grader = grader.with_recorder(Arc::new(JsonlRecorder::new(path)));
    }

    let report = grader.grade_all(submissions, &ConsoleReporter).await;

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_summary(&report),
    }
    if let Some(path) = &record {
        eprintln!("Results appended to: {}", path.display());
    }

    if !report.failures.is_empty() {
        anyhow::bail!("{} submission(s) could not be graded", report.failures.len());
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Learner", "Exam", "Variant", "Key", "Correct", "Score", "Anomalies",
    ]);

    for outcome in &report.outcomes {
        let r = &outcome.result;
        table.add_row(vec![
            Cell::new(r.learner_id),
            Cell::new(r.exam_id),
            Cell::new(format!("versao{}", r.variant)),
            Cell::new(r.key_tier),
            Cell::new(format!("{}/{}", r.correct_count, r.total_graded)),
            Cell::new(format!("{:.2}", r.score)),
            Cell::new(outcome.anomalies.len()),
        ]);
    }
    println!("{table}");

    for outcome in report.outcomes.iter().filter(|o| !o.is_clean()) {
        println!("\nLearner {} anomalies:", outcome.result.learner_id);
        for anomaly in &outcome.anomalies {
            println!("  - {anomaly}");
        }
    }
}
