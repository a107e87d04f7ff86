// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per training epoch, next to the weights:
//
//   epoch,train_loss,train_acc,val_acc,truncated
//   1,1.412300,0.381000,0.402000,0.118000
//   2,1.201800,0.473000,0.455000,0.118000
//
// `val_acc` is empty when no validation split was carved out.
// `truncated` is the fraction of training documents that lost
// sentences or words to the max_sents / max_words limits.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "epoch,train_loss,train_acc,val_acc,truncated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub train_loss: f64,
    pub train_acc:  f64,
    pub val_acc:    Option<f64>,
    pub truncated:  f64,
}

impl EpochMetrics {
    fn csv_row(&self) -> String {
        let val = self.val_acc.map(|v| format!("{v:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{:.6},{},{:.6}",
            self.epoch, self.train_loss, self.train_acc, val, self.truncated
        )
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header if the file does not exist yet, so resumed runs append.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!("Logged epoch {} metrics: train_loss={:.4}", m.epoch, m.train_loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize, val_acc: Option<f64>) -> EpochMetrics {
        EpochMetrics { epoch, train_loss: 0.5, train_acc: 0.75, val_acc, truncated: 0.25 }
    }

    #[test]
    fn test_rows_append_under_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = MetricsLogger::new(dir.path()).unwrap();
        log.log(&metrics(1, None)).unwrap();

        // A second logger on the same directory keeps the existing rows
        let log = MetricsLogger::new(dir.path()).unwrap();
        log.log(&metrics(2, Some(0.5))).unwrap();

        let text = std::fs::read_to_string(log.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            HEADER,
            "1,0.500000,0.750000,,0.250000",
            "2,0.500000,0.750000,0.500000,0.250000",
        ]);
    }
}
