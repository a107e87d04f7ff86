// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load reviews                 (Layer 4 - data)
//   Step 2: Split train / val / test     (Layer 4 - data)
//   Step 3: Build or restore id maps     (Layer 4 / 6)
//   Step 4: Build or restore vocabulary  (Layer 6 - infra)
//   Step 5: Vectorise every split        (Layer 4 - data)
//   Step 6: Class weights                (Layer 4 - data)
//   Step 7: Memory pre-flight check      (Layer 6 - infra)
//   Step 8: Save configs and maps        (Layer 6 - infra)
//   Step 9: Run training loop            (Layer 5 - ml)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    dataset::ReviewDataset,
    loader::JsonlLoader,
    mappings::{ClassStats, ModelMaps},
    splitter::{available_folds, carve_validation, split_by_fold, split_train_val, Split},
    vectorizer::Vectorizer,
};
use crate::domain::document::RawReview;
use crate::domain::traits::ReviewSource;
use crate::infra::{
    capacity::check_capacity,
    checkpoint::CheckpointManager,
    embeddings::PretrainedEmbeddings,
};
use crate::ml::model::HierarchicalClassifierConfig;
use crate::ml::trainer::{run_training, TrainReport, TrainingData};

/// Share of the corpus used for training when it carries no folds.
const RANDOM_SPLIT_TRAIN: f64 = 0.8;

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings of a training run. Saved next to the weights so
// inference uses the same max_sents / max_words limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainConfig {
    pub dataset:          String,
    pub checkpoint_dir:   String,
    /// Fold used as the test set
    pub fold:             usize,
    /// Validation slice of the training split: fraction if < 1, count otherwise
    pub validation:       f64,
    pub seed:             u64,
    pub embed_size:       usize,
    pub hidden_size:      usize,
    pub batch_size:       usize,
    pub num_workers:      usize,
    pub epochs:           usize,
    pub lr:               f64,
    /// Gradient-norm clip; 0 disables clipping
    pub clip_grad:        f64,
    pub dropout:          f64,
    pub max_sents:        usize,
    pub max_words:        usize,
    /// Vocabulary size cap when building from the corpus
    pub max_feat:         usize,
    /// word2vec text file; replaces the corpus vocabulary
    pub embeddings:       Option<String>,
    /// Checkpoint directory to continue training from
    pub resume:           Option<String>,
    pub balance:          bool,
    pub snapshot:         bool,
    /// 0 disables the pre-flight memory check
    pub memory_budget_mb: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset:          "data/reviews.jsonl".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            fold:             0,
            validation:       0.0,
            seed:             42,
            embed_size:       200,
            hidden_size:      50,
            batch_size:       32,
            num_workers:      2,
            epochs:           10,
            lr:               0.001,
            clip_grad:        1.0,
            dropout:          0.5,
            max_sents:        16,
            max_words:        32,
            max_feat:         10_000,
            embeddings:       None,
            resume:           None,
            balance:          false,
            snapshot:         false,
            memory_budget_mb: 4096,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.epochs == 0 || self.num_workers == 0 {
            bail!("batch size, epochs and workers must all be at least 1");
        }
        if self.max_sents == 0 || self.max_words == 0 {
            bail!("max_sents and max_words must be at least 1");
        }
        if !(self.lr > 0.0) {
            bail!("learning rate must be positive, got {}", self.lr);
        }
        if self.validation < 0.0 || self.clip_grad < 0.0 {
            bail!("validation size and gradient clip cannot be negative");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            bail!("dropout must be in [0, 1), got {}", self.dropout);
        }
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load reviews ──────────────────────────────────────────────
        let reviews = JsonlLoader::new(&cfg.dataset).load_all()?;
        if reviews.is_empty() {
            bail!("No reviews found in '{}'", cfg.dataset);
        }

        // ── Step 2: Split ─────────────────────────────────────────────────────
        let split = split_reviews(reviews, cfg);
        tracing::info!(
            "Split: {} train, {} validation, {} test",
            split.train.len(),
            split.validation.len(),
            split.test.len()
        );
        if split.train.is_empty() {
            bail!("Training split is empty; check --fold and --validation");
        }

        // ── Steps 3-4: Maps, vocabulary, model shape ──────────────────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let prepared = match &cfg.resume {
            Some(dir) => restore_vocabulary(dir, &ckpt)?,
            None      => build_vocabulary(cfg, &split.train, &ckpt)?,
        };
        let Prepared { maps, vectorizer, model_cfg, embeddings } = prepared;
        tracing::info!(
            "{} classes, {} users, {} items, vocabulary of {} ids",
            maps.labels.num_classes(),
            maps.users.table_size(),
            maps.items.table_size(),
            vectorizer.vocab_size()
        );

        // ── Step 5: Vectorise ─────────────────────────────────────────────────
        let train      = vectorizer.vectorize(&split.train, &maps)?;
        let validation = vectorizer.vectorize(&split.validation, &maps)?;
        let test       = vectorizer.vectorize(&split.test, &maps)?;
        tracing::info!(
            "Vectorised training split: {} documents, {} sentences, {} tokens",
            train.len(),
            train.iter().map(|d| d.sentence_count()).sum::<usize>(),
            train.iter().map(|d| d.token_count()).sum::<usize>()
        );

        // ── Step 6: Class weights (1 - proportion) ────────────────────────────
        let stats = ClassStats::from_classes(train.iter().map(|d| d.label));
        for (class, count) in &stats.counts {
            tracing::info!(
                "class {} (label {:?}): {} documents, {:.1}%",
                class,
                maps.labels.label_of(*class),
                count,
                stats.proportion(*class) * 100.0
            );
        }
        let class_weights = stats.class_weights(maps.labels.num_classes());

        // ── Step 7: Memory pre-flight ─────────────────────────────────────────
        if cfg.memory_budget_mb > 0 {
            check_capacity(cfg.batch_size, cfg.max_sents, cfg.max_words, model_cfg.embed_size, cfg.memory_budget_mb)?;
        }

        // ── Step 8: Save everything inference needs ───────────────────────────
        ckpt.save_config(cfg)?;
        ckpt.save_model_config(&model_cfg)?;
        ckpt.save_maps(&maps)?;

        // ── Step 9: Train ─────────────────────────────────────────────────────
        let data = TrainingData {
            train:      ReviewDataset::new(train),
            validation: ReviewDataset::new(validation),
            test:       ReviewDataset::new(test),
            class_weights,
        };
        run_training(cfg, &model_cfg, data, embeddings.as_ref(), &ckpt)
    }
}

struct Prepared {
    maps:       ModelMaps,
    vectorizer: Vectorizer,
    model_cfg:  HierarchicalClassifierConfig,
    embeddings: Option<PretrainedEmbeddings>,
}

/// Split by fold when the corpus has folds, otherwise at random.
fn split_reviews(reviews: Vec<RawReview>, cfg: &TrainConfig) -> Split {
    let folds = available_folds(&reviews);
    if folds.is_empty() {
        tracing::info!("No folds in the dataset; using a seeded random split");
        let (train, test)       = split_train_val(reviews, RANDOM_SPLIT_TRAIN, cfg.seed);
        let (train, validation) = carve_validation(train, cfg.validation);
        return Split { train, validation, test };
    }
    if !folds.contains(&cfg.fold) {
        tracing::warn!("Fold {} not present (available: {:?}); the test set will be empty", cfg.fold, folds);
    }
    split_by_fold(reviews, cfg.fold, cfg.validation)
}

fn build_vocabulary(cfg: &TrainConfig, train: &[RawReview], ckpt: &CheckpointManager) -> Result<Prepared> {
    let maps  = ModelMaps::from_training(train);
    let store = ckpt.tokenizer_store();

    let (tokenizer, embeddings) = match &cfg.embeddings {
        Some(path) => {
            let emb = PretrainedEmbeddings::load(Path::new(path))?;
            (store.build_from_words(&emb.words)?, Some(emb))
        }
        None => {
            let texts: Vec<&str> = train.iter().map(|r| r.text.as_str()).collect();
            (store.build_from_corpus(&texts, cfg.max_feat)?, None)
        }
    };

    let vectorizer = Vectorizer::new(tokenizer);
    let embed_size = embeddings.as_ref().map_or(cfg.embed_size, |e| e.dim);
    let model_cfg  = HierarchicalClassifierConfig::new(
        vectorizer.vocab_size(),
        maps.users.table_size(),
        maps.items.table_size(),
        maps.labels.num_classes(),
    )
    .with_embed_size(embed_size)
    .with_hidden_size(cfg.hidden_size)
    .with_dropout(cfg.dropout);

    Ok(Prepared { maps, vectorizer, model_cfg, embeddings })
}

/// Reuse the vocabulary, maps and model shape of an earlier run.
fn restore_vocabulary(dir: &str, ckpt: &CheckpointManager) -> Result<Prepared> {
    let source    = CheckpointManager::open(dir)?;
    let maps      = source.load_maps()?;
    let model_cfg = source.load_model_config()?;
    let tokenizer = source.tokenizer_store().load()?;

    if source.dir() != ckpt.dir() {
        let target = ckpt.tokenizer_store().path();
        tokenizer
            .save(&target, true)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Cannot copy vocabulary to '{}'", target.display()))?;
    }

    tracing::info!("Reusing vocabulary and maps from '{}'", dir);
    Ok(Prepared { maps, vectorizer: Vectorizer::new(tokenizer), model_cfg, embeddings: None })
}
