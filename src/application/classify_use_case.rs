// ============================================================
// Layer 2 — ClassifyUseCase
// ============================================================
// Loads a checkpoint directory once and classifies review
// texts with it. Texts come from the command line or from a
// JSON-lines file in the training format (labels, if present,
// are ignored; user / item names are used as context).

use anyhow::Result;
use std::path::Path;

use crate::data::loader::JsonlLoader;
use crate::domain::traits::ReviewSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::{ClassifyRequest, Inferencer, Prediction};

type InferBackend = burn::backend::Wgpu;

pub struct ClassifyUseCase {
    inferencer: Inferencer<InferBackend>,
}

impl ClassifyUseCase {
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        let device     = burn::backend::wgpu::WgpuDevice::default();
        let ckpt       = CheckpointManager::open(checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt, &device)?;
        Ok(Self { inferencer })
    }

    pub fn classify_texts(&self, texts: &[String]) -> Result<Vec<Prediction>> {
        let requests: Vec<ClassifyRequest> = texts.iter().map(ClassifyRequest::new).collect();
        self.inferencer.classify(&requests)
    }

    pub fn classify_file(&self, path: &Path) -> Result<Vec<Prediction>> {
        let requests = requests_from_file(path)?;
        self.inferencer.classify(&requests)
    }
}

fn requests_from_file(path: &Path) -> Result<Vec<ClassifyRequest>> {
    let reviews = JsonlLoader::new(path).load_all()?;
    Ok(reviews
        .into_iter()
        .map(|r| ClassifyRequest { text: r.text, user: r.user, item: r.item })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_requests_keep_context_names() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.jsonl");
        std::fs::write(&path, "{\"text\":\"ok\",\"label\":0,\"user\":\"u7\"}\n\n{\"text\":\"meh\",\"label\":0}\n").unwrap();

        let reqs = requests_from_file(&path).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].user.as_deref(), Some("u7"));
        assert_eq!(reqs[1].text, "meh");
    }
}
