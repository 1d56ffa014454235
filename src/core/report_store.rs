//! Append-only report store with file-based persistence.
//!
//! Reports are stored as newline-delimited JSON (JSONL) so they can be
//! inspected with ordinary tools and replayed for trend history.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::domain::{AnalysisReport, MergedReport};

/// File-based report store using JSONL format
pub struct ReportStore {
    /// Path to the reports.jsonl file
    reports_path: PathBuf,
}

impl ReportStore {
    /// Create or open a store in `dir`
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create reports directory: {}", dir.display()))?;

        Ok(Self {
            reports_path: dir.join("reports.jsonl"),
        })
    }

    /// Open the store under the configured home ($COHORTLENS_HOME/reports)
    pub async fn open_default() -> Result<Self> {
        Self::open(crate::config::reports_dir()?).await
    }

    /// Get the path to the reports file
    pub fn reports_path(&self) -> &Path {
        &self.reports_path
    }

    /// Append a report to the log
    pub async fn save(&self, report: &AnalysisReport) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.reports_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open reports file: {}",
                    self.reports_path.display()
                )
            })?;

        let json = serde_json::to_string(report).context("Failed to serialize report")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write report")?;
        file.flush().await.context("Failed to flush report")?;

        info!(session_id = %report.session_id, "Saved report");
        Ok(())
    }

    /// Replay all reports in order
    pub async fn all(&self) -> Result<Vec<AnalysisReport>> {
        if !self.reports_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.reports_path)
            .await
            .with_context(|| format!("Failed to open reports file: {}", self.reports_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut reports = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let report: AnalysisReport = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse report: {}", line))?;
            reports.push(report);
        }

        Ok(reports)
    }

    /// Latest report saved for a session
    pub async fn find_by_session(&self, session_id: &str) -> Result<Option<AnalysisReport>> {
        let reports = self.all().await?;
        Ok(reports.into_iter().rev().find(|r| r.session_id == session_id))
    }

    /// All reports for a module, oldest first
    pub async fn find_by_module(&self, module_id: &str) -> Result<Vec<AnalysisReport>> {
        let reports = self.all().await?;
        Ok(reports
            .into_iter()
            .filter(|r| r.module_id == module_id)
            .collect())
    }

    /// The last `limit` merged reports for a module, oldest first
    pub async fn history_for_module(&self, module_id: &str, limit: usize) -> Result<Vec<MergedReport>> {
        let reports = self.find_by_module(module_id).await?;
        let skip = reports.len().saturating_sub(limit);
        Ok(reports.into_iter().skip(skip).map(|r| r.metrics).collect())
    }
}
