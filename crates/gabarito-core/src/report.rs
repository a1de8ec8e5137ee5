//! Result persistence, answer-key comparison and markdown reports.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grading::{round2, GradeOutcome, GradedResult};
use crate::model::Letter;
use crate::statistics::{best_attempts, class_summary, item_analysis, ClassSummary, ItemStats};
use crate::variant::{AnswerKeyEntry, VariantSet};

impl GradedResult {
    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let result: GradedResult =
            serde_json::from_str(&content).context("failed to parse result JSON")?;
        Ok(result)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultLine {
    Outcome(GradeOutcome),
    Result(GradedResult),
}

impl From<ResultLine> for GradedResult {
    fn from(line: ResultLine) -> Self {
        match line {
            ResultLine::Outcome(o) => o.result,
            ResultLine::Result(r) => r,
        }
    }
}

/// Load results from a JSON array, a single result, or a JSON-lines file
/// written by the recorder.
pub fn load_results(path: &Path) -> Result<Vec<GradedResult>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read results from {}", path.display()))?;
    let trimmed = content.trim_start();

    if trimmed.starts_with('[') {
        let lines: Vec<ResultLine> =
            serde_json::from_str(trimmed).context("failed to parse results JSON array")?;
        return Ok(lines.into_iter().map(Into::into).collect());
    }
    if let Ok(single) = serde_json::from_str::<ResultLine>(trimmed) {
        return Ok(vec![single.into()]);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<ResultLine>(line)
                .map(Into::into)
                .with_context(|| format!("{}:{}: invalid result", path.display(), n + 1))
        })
        .collect()
}

/// One position whose key letter differs between two sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChange {
    pub position: u32,
    pub before: Option<Letter>,
    pub after: Option<Letter>,
}

/// Per-position key differences of one variant between two sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDiff {
    pub a: Uuid,
    pub b: Uuid,
    pub variant: u32,
    pub changed: Vec<KeyChange>,
    /// Positions only in `b`.
    pub added: Vec<u32>,
    /// Positions only in `a`.
    pub removed: Vec<u32>,
    pub total_differences: usize,
    /// Share of `max(question_count)` that differs.
    pub percent: f64,
}

/// Compare the answer keys of `variant` in two sets.
pub fn compare_variant_sets(a: &VariantSet, b: &VariantSet, variant: u32) -> KeyDiff {
    let empty: BTreeMap<u32, AnswerKeyEntry> = BTreeMap::new();
    let key_a = a.permutation(variant).map(|p| &p.key).unwrap_or(&empty);
    let key_b = b.permutation(variant).map(|p| &p.key).unwrap_or(&empty);

    let mut changed = Vec::new();
    let mut removed = Vec::new();
    for (position, entry) in key_a {
        match key_b.get(position) {
            Some(other) if other.letter() != entry.letter() => changed.push(KeyChange {
                position: *position,
                before: entry.letter(),
                after: other.letter(),
            }),
            Some(_) => {}
            None => removed.push(*position),
        }
    }
    let added: Vec<u32> = key_b
        .keys()
        .filter(|p| !key_a.contains_key(p))
        .copied()
        .collect();

    let total_differences = changed.len() + added.len() + removed.len();
    let base = a.question_count.max(b.question_count);
    let percent = if base == 0 {
        0.0
    } else {
        round2(total_differences as f64 / base as f64 * 100.0)
    };

    KeyDiff {
        a: a.id,
        b: b.id,
        variant,
        changed,
        added,
        removed,
        total_differences,
        percent,
    }
}

fn letter_or_dash(letter: Option<Letter>) -> &'static str {
    letter.map(|l| l.as_str()).unwrap_or("-")
}

impl KeyDiff {
    pub fn is_identical(&self) -> bool {
        self.total_differences == 0
    }

    /// Format the diff as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Variant {}:** {} differences ({:.2}%)\n\n",
            self.variant, self.total_differences, self.percent
        ));

        if !self.changed.is_empty() {
            md.push_str("| Position | Before | After |\n");
            md.push_str("|----------|--------|-------|\n");
            for c in &self.changed {
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    c.position,
                    letter_or_dash(c.before),
                    letter_or_dash(c.after)
                ));
            }
            md.push('\n');
        }
        if !self.added.is_empty() {
            md.push_str(&format!("Added positions: {:?}\n", self.added));
        }
        if !self.removed.is_empty() {
            md.push_str(&format!("Removed positions: {:?}\n", self.removed));
        }

        md
    }
}

/// Class-level report built from the best attempt of each learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub summary: ClassSummary,
    pub items: Vec<ItemStats>,
}

impl ClassReport {
    pub fn from_results(results: &[GradedResult]) -> Self {
        let best = best_attempts(results);
        Self {
            summary: class_summary(&best),
            items: item_analysis(best.iter().copied()),
        }
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let s = &self.summary;
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} learners, average {:.2}, highest {:.2}, lowest {:.2}\n\n",
            s.participants, s.average_score, s.highest_score, s.lowest_score
        ));

        if !self.items.is_empty() {
            md.push_str("| Question | Subject | Correct | A | B | C | D | E | Most chosen |\n");
            md.push_str("|----------|---------|---------|---|---|---|---|---|-------------|\n");
            for item in &self.items {
                let counts: Vec<String> = Letter::ALL
                    .iter()
                    .map(|l| item.option_counts.get(l).copied().unwrap_or(0).to_string())
                    .collect();
                md.push_str(&format!(
                    "| {} | {} | {:.1}% | {} | {} |\n",
                    item.question_id,
                    item.subject,
                    item.percent_correct,
                    counts.join(" | "),
                    letter_or_dash(item.most_chosen)
                ));
            }
        }

        md
    }
}
