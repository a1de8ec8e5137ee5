//! The `gabarito init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create gabarito.toml
    if std::path::Path::new("gabarito.toml").exists() {
        println!("gabarito.toml already exists, skipping.");
    } else {
        std::fs::write("gabarito.toml", SAMPLE_CONFIG)?;
        println!("Created gabarito.toml");
    }

    // Create example exam
    std::fs::create_dir_all("exams")?;
    let example_path = std::path::Path::new("exams/example.toml");
    if example_path.exists() {
        println!("exams/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_EXAM)?;
        println!("Created exams/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: gabarito validate --exams exams");
    println!("  2. Run: gabarito generate --exams exams --exam 1");
    println!("  3. Run: gabarito grade --exams exams --submissions answers.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# gabarito configuration

# Shuffled variants per generated set
variant_count = 5
# Largest exam a set may be generated for
max_questions = 45
# Hours during which a new set cannot be deleted
cooldown_hours = 24
# Concurrent gradings per batch
parallelism = 4
# Variant-set history lives here
state_dir = "./.gabarito"
cache_invalidation_retries = 3
archived_exams = []
"#;

const EXAMPLE_EXAM: &str = r#"[exam]
id = 1
title = "Example exam"
description = "A short exam to get started"
total_points = 10

[[questions]]
id = 1
subject = "math"
topic = "fractions"
difficulty = "easy"
correct = "A"

[[questions]]
id = 2
subject = "math"
topic = "equations"
difficulty = "medium"
correct = "C"

[[questions]]
id = 3
subject = "history"
topic = "colonial period"
difficulty = "hard"
correct = "E"

[[questions]]
id = 4
subject = "portuguese"
topic = "grammar"
difficulty = "medium"
correct = "B"
"#;
