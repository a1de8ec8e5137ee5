//! JSON-lines result recorder.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::grading::{Anomaly, GradedResult};
use crate::traits::ResultRecorder;

/// Appends one JSON object per graded result to a file.
pub struct JsonlRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize)]
struct Line<'a> {
    result: &'a GradedResult,
    anomalies: &'a [Anomaly],
}

impl JsonlRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultRecorder for JsonlRecorder {
    async fn record(&self, result: &GradedResult, anomalies: &[Anomaly]) -> Result<()> {
        let mut line = serde_json::to_string(&Line { result, anomalies })
            .context("failed to serialize result")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
