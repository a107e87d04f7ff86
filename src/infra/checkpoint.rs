// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores a trained classifier using Burn's
// CompactRecorder, together with everything needed to use it:
//
//   checkpoints/
//     model.mpk              ← final weights
//     model_snapshot.mpk     ← weights after the latest epoch (--snapshot)
//     model_config.json      ← HierarchicalClassifierConfig
//     train_config.json      ← the TrainConfig of the run
//     tokenizer.json         ← vocabulary (TokenizerStore)
//     maps.json              ← label / user / item id maps
//     manifest.json          ← which weights are current, and how good
//     metrics.csv            ← per-epoch metrics (MetricsLogger)
//
// Token ids, class ids and context ids are meaningless without
// the matching maps, so they are always written to the same
// directory as the weights.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::TrainConfig;
use crate::data::mappings::ModelMaps;
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::model::{HierarchicalClassifier, HierarchicalClassifierConfig};

pub const FINAL_MODEL:    &str = "model";
pub const SNAPSHOT_MODEL: &str = "model_snapshot";

const MANIFEST_FILE:     &str = "manifest.json";
const MODEL_CONFIG_FILE: &str = "model_config.json";
const TRAIN_CONFIG_FILE: &str = "train_config.json";
const MAPS_FILE:         &str = "maps.json";

/// Bumped whenever the directory layout changes.
const FORMAT_VERSION: u32 = 1;

/// Which weights in the directory are current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub model_file:     String,
    pub epochs:         usize,
    pub num_classes:    usize,
    pub vocab_size:     usize,
    pub test_accuracy:  Option<f64>,
}

impl Manifest {
    pub fn new(model_file: &str, epochs: usize, model_cfg: &HierarchicalClassifierConfig) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_file:     model_file.to_string(),
            epochs,
            num_classes:    model_cfg.num_classes,
            vocab_size:     model_cfg.vocab_size,
            test_accuracy:  None,
        }
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Open (and create if needed) a checkpoint directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing directory written by a previous run.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.join(MANIFEST_FILE).exists() {
            anyhow::bail!(
                "'{}' is not a checkpoint directory (no {}). Have you run 'train' first?",
                dir.display(),
                MANIFEST_FILE
            );
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tokenizer_store(&self) -> TokenizerStore {
        TokenizerStore::new(&self.dir)
    }

    // ─── Weights ──────────────────────────────────────────────────────────────
    pub fn save_model<B: Backend>(&self, model: &HierarchicalClassifier<B>, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;
        tracing::debug!("Saved weights '{}'", path.display());
        Ok(())
    }

    pub fn load_model<B: Backend>(
        &self,
        model:  HierarchicalClassifier<B>,
        name:   &str,
        device: &B::Device,
    ) -> Result<HierarchicalClassifier<B>> {
        let path   = self.dir.join(name);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    /// Rebuild the model described by this directory and load its current weights.
    pub fn restore_model<B: Backend>(&self, device: &B::Device) -> Result<HierarchicalClassifier<B>> {
        let manifest  = self.load_manifest()?;
        let model_cfg = self.load_model_config()?;
        let model     = model_cfg.init::<B>(device)?;
        tracing::info!(
            "Restoring '{}' ({} epochs) from '{}'",
            manifest.model_file,
            manifest.epochs,
            self.dir.display()
        );
        self.load_model(model, &manifest.model_file, device)
    }

    // ─── JSON side files ──────────────────────────────────────────────────────
    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.write_json(MANIFEST_FILE, manifest)
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        let manifest: Manifest = self.read_json(MANIFEST_FILE)?;
        if manifest.format_version != FORMAT_VERSION {
            anyhow::bail!(
                "Checkpoint format {} is not supported (expected {})",
                manifest.format_version,
                FORMAT_VERSION
            );
        }
        Ok(manifest)
    }

    pub fn save_model_config(&self, cfg: &HierarchicalClassifierConfig) -> Result<()> {
        self.write_json(MODEL_CONFIG_FILE, cfg)
    }

    pub fn load_model_config(&self) -> Result<HierarchicalClassifierConfig> {
        self.read_json(MODEL_CONFIG_FILE)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(TRAIN_CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(TRAIN_CONFIG_FILE)
    }

    pub fn save_maps(&self, maps: &ModelMaps) -> Result<()> {
        self.write_json(MAPS_FILE, maps)
    }

    pub fn load_maps(&self) -> Result<ModelMaps> {
        self.read_json(MAPS_FILE)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'. Have you run 'train' first?", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }
}
