// ============================================================
// Layer 4 — Review Loader
// ============================================================
// Loads labelled reviews from a JSON-lines file:
//
//   {"text": "Great phone.", "label": 5, "user": "u1", "item": "p9", "fold": 0}
//   {"text": "Broke in a week.", "label": 1}
//
// `user`, `item` and `fold` are optional. Blank lines are
// ignored. A malformed line is logged and skipped rather than
// failing the whole corpus, the same way one unreadable file
// should not stop a training run.

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::domain::document::RawReview;
use crate::domain::traits::ReviewSource;

pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReviewSource for JsonlLoader {
    fn load_all(&self) -> Result<Vec<RawReview>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open dataset '{}'", self.path.display()))?;

        let mut reviews = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| {
                format!("Cannot read line {} of '{}'", line_no + 1, self.path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawReview>(&line) {
                Ok(review) => reviews.push(review),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping line {} of '{}': {}", line_no + 1, self.path.display(), e);
                }
            }
        }

        tracing::info!(
            "Loaded {} reviews from '{}' ({} malformed lines skipped)",
            reviews.len(),
            self.path.display(),
            skipped
        );
        Ok(reviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loads_valid_lines_and_skips_bad_ones() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"text":"good","label":5,"user":"u1","item":"i1","fold":2}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(f, r#"{{"text":"bad","label":1}}"#).unwrap();

        let reviews = JsonlLoader::new(f.path()).load_all().unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0], RawReview::new("good", 5).with_context("u1", "i1").with_fold(2));
        assert_eq!(reviews[1].label, 1);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = JsonlLoader::new("/definitely/not/here.jsonl").load_all();
        assert!(err.is_err());
    }
}
