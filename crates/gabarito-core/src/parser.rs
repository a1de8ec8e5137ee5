//! TOML exam definition parser.
//!
//! Loads exams from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Difficulty, Exam, ExamId, Letter, Question, QuestionId};

/// Intermediate TOML structure for parsing exam files.
#[derive(Debug, Deserialize)]
struct TomlExamFile {
    exam: TomlExamHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlExamHeader {
    id: ExamId,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_total_points")]
    total_points: u32,
}

fn default_total_points() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: QuestionId,
    subject: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    difficulty: Option<String>,
    correct: String,
    #[serde(default)]
    position: Option<u32>,
}

/// Parse a single TOML file into an `Exam`.
pub fn parse_exam(path: &Path) -> Result<Exam> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam file: {}", path.display()))?;

    parse_exam_str(&content, path)
}

/// Parse a TOML string into an `Exam` (useful for testing).
pub fn parse_exam_str(content: &str, source_path: &Path) -> Result<Exam> {
    let parsed: TomlExamFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut placed = Vec::with_capacity(parsed.questions.len());
    for q in parsed.questions {
        let difficulty = match &q.difficulty {
            Some(d) => d
                .parse::<Difficulty>()
                .map_err(|e| anyhow::anyhow!("question {}: {}", q.id, e))?,
            None => Difficulty::default(),
        };
        let correct: Letter = q
            .correct
            .parse()
            .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;
        let question = Question {
            id: q.id,
            subject: q.subject,
            topic: q.topic,
            difficulty,
            correct,
        };
        placed.push((q.position, question));
    }

    let explicit = placed.iter().filter(|(p, _)| p.is_some()).count();
    if explicit > 0 {
        if explicit != placed.len() {
            anyhow::bail!(
                "{}: either every question or none must declare a position",
                source_path.display()
            );
        }
        placed.sort_by_key(|(p, _)| *p);
        for ((position, question), expected) in placed.iter().zip(1u32..) {
            if *position != Some(expected) {
                anyhow::bail!(
                    "{}: question {} has position {}, positions must be dense 1..N",
                    source_path.display(),
                    question.id,
                    position.unwrap_or(0)
                );
            }
        }
    }

    let mut exam = Exam::new(
        parsed.exam.id,
        parsed.exam.title,
        parsed.exam.total_points,
        placed.into_iter().map(|(_, q)| q).collect(),
    );
    exam.description = parsed.exam.description;
    Ok(exam)
}

/// Recursively load all `.toml` exam files from a directory.
pub fn load_exam_directory(dir: &Path) -> Result<Vec<Exam>> {
    let mut exams = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            exams.extend(load_exam_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_exam(&path) {
                Ok(exam) => exams.push(exam),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    exams.sort_by_key(|e| e.id);
    Ok(exams)
}

/// A warning from exam validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<QuestionId>,
    /// Warning message.
    pub message: String,
}

/// Validate an exam for common issues.
pub fn validate_exam(exam: &Exam, max_questions: usize) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen = HashSet::new();
    for q in &exam.questions {
        if !seen.insert(q.id) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: format!("duplicate question ID: {}", q.id),
            });
        }
    }

    if exam.question_count() > max_questions {
        warnings.push(ValidationWarning {
            question_id: None,
            message: format!(
                "{} questions exceeds the limit of {max_questions}",
                exam.question_count()
            ),
        });
    }

    if exam.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "exam has no questions".into(),
        });
    }

    for q in &exam.questions {
        if q.subject.trim().is_empty() {
            warnings.push(ValidationWarning {
                question_id: Some(q.id),
                message: "subject is empty".into(),
            });
        }
    }

    if exam.total_points == 0 {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "total_points must be positive".into(),
        });
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[exam]
id = 12
title = "Biologia 3o ano"
description = "Bimestral"
total_points = 10

[[questions]]
id = 101
subject = "biology"
topic = "genetics"
difficulty = "F"
correct = "a"

[[questions]]
id = 102
subject = "biology"
topic = "ecology"
difficulty = "dificil"
correct = "D"

[[questions]]
id = 103
subject = "chemistry"
correct = "E"
"#;

    #[test]
    fn parse_valid_toml() {
        let exam = parse_exam_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(exam.id, 12);
        assert_eq!(exam.total_points, 10);
        assert_eq!(exam.question_ids(), vec![101, 102, 103]);
        assert_eq!(exam.questions[0].difficulty, Difficulty::Easy);
        assert_eq!(exam.questions[0].correct, Letter::A);
        assert_eq!(exam.questions[1].difficulty, Difficulty::Hard);
        assert_eq!(exam.questions[2].difficulty, Difficulty::Medium);
    }

    #[test]
    fn total_points_defaults_to_five() {
        let toml = r#"
[exam]
id = 1
title = "Minimal"
"#;
        let exam = parse_exam_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(exam.total_points, 5);
        assert!(exam.questions.is_empty());
    }

    #[test]
    fn explicit_positions_reorder() {
        let toml = r#"
[exam]
id = 1
title = "Ordered"

[[questions]]
id = 7
subject = "math"
correct = "B"
position = 2

[[questions]]
id = 8
subject = "math"
correct = "C"
position = 1
"#;
        let exam = parse_exam_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(exam.question_ids(), vec![8, 7]);
    }

    #[test]
    fn sparse_positions_are_rejected() {
        let toml = r#"
[exam]
id = 1
title = "Gaps"

[[questions]]
id = 7
subject = "math"
correct = "B"
position = 1

[[questions]]
id = 8
subject = "math"
correct = "C"
position = 3
"#;
        let err = parse_exam_str(toml, &PathBuf::from("gaps.toml")).unwrap_err();
        assert!(err.to_string().contains("dense"));
    }

    #[test]
    fn bad_letter_is_rejected() {
        let toml = r#"
[exam]
id = 1
title = "Bad"

[[questions]]
id = 1
subject = "math"
correct = "Z"
"#;
        let err = parse_exam_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("question 1"));
    }

    #[test]
    fn validate_duplicates_and_limits() {
        let toml = r#"
[exam]
id = 1
title = "Dupes"
total_points = 0

[[questions]]
id = 5
subject = "math"
correct = "A"

[[questions]]
id = 5
subject = " "
correct = "B"
"#;
        let exam = parse_exam_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_exam(&exam, 1);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate")));
        assert!(warnings.iter().any(|w| w.message.contains("exceeds the limit")));
        assert!(warnings.iter().any(|w| w.message.contains("subject is empty")));
        assert!(warnings.iter().any(|w| w.message.contains("total_points")));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_exam_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bio.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not toml [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let exams = load_exam_directory(dir.path()).unwrap();
        assert_eq!(exams.len(), 1);
        assert_eq!(exams[0].id, 12);
    }
}
