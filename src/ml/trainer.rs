// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + evaluate loop using Burn's DataLoader and Adam.
//
//   - Training runs on an Autodiff backend (Autodiff<Wgpu> from
//     the CLI, Autodiff<NdArray> in tests)
//   - model.valid() returns the model on the inner backend;
//     evaluation batches are built on that backend too
//   - Evaluation goes through forward_with_attention, which
//     never applies dropout
//   - argmax(1) returns [batch, 1] so it is flattened before
//     comparing with the labels
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{ReviewBatch, ReviewBatcher, TrimLimits, TruncationReport},
    dataset::ReviewDataset,
    sampler::{BalancedDataset, ClassBuckets},
};
use crate::infra::{
    checkpoint::{CheckpointManager, Manifest, FINAL_MODEL, SNAPSHOT_MODEL},
    embeddings::PretrainedEmbeddings,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{ForwardWorkspace, HierarchicalClassifier, HierarchicalClassifierConfig};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Vectorised splits plus the loss weights computed from the training split.
pub struct TrainingData {
    pub train:         ReviewDataset,
    pub validation:    ReviewDataset,
    pub test:          ReviewDataset,
    pub class_weights: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Evaluation {
    pub documents: usize,
    pub correct:   usize,
}

impl Evaluation {
    pub fn accuracy(&self) -> Option<f64> {
        (self.documents > 0).then(|| self.correct as f64 / self.documents as f64)
    }
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Total epochs behind the saved weights, earlier runs included
    pub epochs:        usize,
    pub last_epoch:    Option<EpochMetrics>,
    pub test_accuracy: Option<f64>,
    pub truncation:    TruncationReport,
}

pub fn run_training(
    cfg:        &TrainConfig,
    model_cfg:  &HierarchicalClassifierConfig,
    data:       TrainingData,
    embeddings: Option<&PretrainedEmbeddings>,
    ckpt:       &CheckpointManager,
) -> Result<TrainReport> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, model_cfg, data, embeddings, ckpt, device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:        &TrainConfig,
    model_cfg:  &HierarchicalClassifierConfig,
    data:       TrainingData,
    embeddings: Option<&PretrainedEmbeddings>,
    ckpt:       &CheckpointManager,
    device:     B::Device,
) -> Result<TrainReport> {

    // ── Build or restore the model ────────────────────────────────────────────
    let mut model: HierarchicalClassifier<B> = model_cfg.init(&device)?;
    let mut done = 0usize;

    if let Some(resume) = &cfg.resume {
        let source   = CheckpointManager::open(resume)?;
        let manifest = source.load_manifest()?;
        model = source.load_model(model, &manifest.model_file, &device)?;
        done  = manifest.epochs;
        tracing::info!("Resuming from '{}' after {} epochs", resume, done);
    } else if let Some(emb) = embeddings {
        model = model.set_word_embeddings(emb.to_tensor(&device))?;
        tracing::info!("Installed {} pretrained word vectors", emb.words.len());
    }
    tracing::info!(
        "Model ready: vocab={}, embed={}, hidden={}x2, classes={}",
        model_cfg.vocab_size, model_cfg.embed_size, model_cfg.hidden_size, model_cfg.num_classes
    );

    // ── Adam with gradient-norm clipping ──────────────────────────────────────
    let clipping  = (cfg.clip_grad > 0.0).then(|| GradientClippingConfig::Norm(cfg.clip_grad as f32));
    let mut optim = AdamConfig::new().with_grad_clipping(clipping).init();

    let limits        = TrimLimits::new(cfg.max_sents, cfg.max_words);
    let train_batcher = ReviewBatcher::<B>::new(device.clone(), limits);
    let eval_batcher  = ReviewBatcher::<B::InnerBackend>::new(device.clone(), limits);
    let metrics       = MetricsLogger::new(ckpt.dir())?;

    let buckets        = cfg.balance.then(|| ClassBuckets::from_labels(data.train.labels()));
    let mut ws         = ForwardWorkspace::new();
    let mut last_epoch = None;
    let mut truncation = TruncationReport::default();

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in done + 1..=done + cfg.epochs {
        let loader = epoch_loader(cfg, &train_batcher, &data.train, buckets.as_ref(), epoch);

        let mut loss_sum = 0.0f64;
        let mut seen     = Evaluation::default();
        let mut trimmed  = TruncationReport::default();

        for batch in loader.iter() {
            let step = model.forward_classification(&batch, &mut ws, Some(&data.class_weights))?;

            let docs = batch.num_docs;
            loss_sum += step.loss.clone().into_scalar().elem::<f64>() * docs as f64;
            seen.correct   += count_correct(step.scores, step.targets);
            seen.documents += docs;
            trimmed.merge(&batch.truncation);

            let grads = step.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let train_loss = if seen.documents > 0 { loss_sum / seen.documents as f64 } else { f64::NAN };
        let val_acc = if data.validation.document_count() > 0 {
            evaluate(&model.valid(), data.validation.clone(), eval_batcher.clone(), cfg.batch_size)?.accuracy()
        } else {
            None
        };

        let m = EpochMetrics {
            epoch,
            train_loss,
            train_acc: seen.accuracy().unwrap_or(0.0),
            val_acc,
            truncated: trimmed.truncated_fraction(),
        };
        metrics.log(&m)?;

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_acc={} | truncated={:.1}%",
            epoch,
            done + cfg.epochs,
            m.train_loss,
            m.train_acc * 100.0,
            m.val_acc.map(|a| format!("{:.1}%", a * 100.0)).unwrap_or_else(|| "-".into()),
            m.truncated * 100.0,
        );
        tracing::info!(
            "Epoch {}: {} of {} documents truncated, {} sentences and {} words dropped",
            epoch,
            trimmed.documents_truncated,
            trimmed.documents,
            trimmed.sentences_dropped,
            trimmed.words_dropped,
        );

        if cfg.snapshot {
            ckpt.save_model(&model, SNAPSHOT_MODEL)?;
            ckpt.save_manifest(&Manifest::new(SNAPSHOT_MODEL, epoch, model_cfg))?;
            tracing::info!("Snapshot saved after epoch {}", epoch);
        }

        truncation.merge(&trimmed);
        last_epoch = Some(m);
    }

    // ── Final test pass and save ──────────────────────────────────────────────
    let test = evaluate(&model.valid(), data.test.clone(), eval_batcher, cfg.batch_size)?;
    match test.accuracy() {
        Some(acc) => println!("Test accuracy: {:.2}% on {} documents", acc * 100.0, test.documents),
        None      => tracing::warn!("Test split is empty; no test accuracy reported"),
    }

    let epochs = done + cfg.epochs;
    let mut manifest = Manifest::new(FINAL_MODEL, epochs, model_cfg);
    manifest.test_accuracy = test.accuracy();
    ckpt.save_model(&model, FINAL_MODEL)?;
    ckpt.save_manifest(&manifest)?;

    tracing::info!("Training complete! Weights saved to '{}'", ckpt.dir().display());
    Ok(TrainReport { epochs, last_epoch, test_accuracy: test.accuracy(), truncation })
}

/// Loader for one epoch; balanced views draw afresh every epoch.
fn epoch_loader<B: Backend>(
    cfg:     &TrainConfig,
    batcher: &ReviewBatcher<B>,
    train:   &ReviewDataset,
    buckets: Option<&ClassBuckets>,
    epoch:   usize,
) -> Arc<dyn DataLoader<ReviewBatch<B>>> {
    let seed    = cfg.seed.wrapping_add(epoch as u64);
    let builder = DataLoaderBuilder::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers);

    match buckets {
        Some(buckets) => builder.build(BalancedDataset::new(train.clone(), buckets, seed)),
        None          => builder.shuffle(seed).build(train.clone()),
    }
}

/// Accuracy of `model` over `dataset`, using the read-only attention path.
pub fn evaluate<B: Backend>(
    model:      &HierarchicalClassifier<B>,
    dataset:    ReviewDataset,
    batcher:    ReviewBatcher<B>,
    batch_size: usize,
) -> Result<Evaluation> {
    let mut eval = Evaluation::default();
    if dataset.document_count() == 0 {
        return Ok(eval);
    }

    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .num_workers(1)
        .build(dataset);

    let mut ws = ForwardWorkspace::new();
    for batch in loader.iter() {
        let out = model.forward_with_attention(&batch, &mut ws)?;
        eval.correct   += count_correct(out.scores, batch.labels.clone());
        eval.documents += batch.num_docs;
    }
    Ok(eval)
}

fn count_correct<B: Backend>(scores: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let correct: i64 = scores
        .argmax(1)
        .flatten::<1>(0, 1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    correct as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::TokenizedDocument;
    use burn::backend::{Autodiff, NdArray};

    type Ad = Autodiff<NdArray>;

    fn documents() -> Vec<TokenizedDocument> {
        (0..8)
            .map(|k| {
                let class = k % 2;
                let word  = 2 + class as u32;
                TokenizedDocument::new(vec![vec![word; 2 + k % 3], vec![word, 4]], class)
            })
            .collect()
    }

    fn data() -> TrainingData {
        TrainingData {
            train:         ReviewDataset::new(documents()),
            validation:    ReviewDataset::new(documents()[..2].to_vec()),
            test:          ReviewDataset::new(documents()[..4].to_vec()),
            class_weights: vec![0.5, 0.5],
        }
    }

    fn config(dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            checkpoint_dir: dir.display().to_string(),
            epochs:         2,
            batch_size:     3,
            num_workers:    1,
            snapshot:       true,
            ..TrainConfig::default()
        }
    }

    fn model_cfg() -> HierarchicalClassifierConfig {
        HierarchicalClassifierConfig::new(6, 1, 1, 2).with_embed_size(4).with_hidden_size(2)
    }

    #[test]
    fn test_evaluation_accuracy() {
        assert_eq!(Evaluation::default().accuracy(), None);
        assert_eq!(Evaluation { documents: 4, correct: 3 }.accuracy(), Some(0.75));
    }

    #[test]
    fn test_training_writes_metrics_and_weights() {
        let dir  = tempfile::tempdir().unwrap();
        let cfg  = config(dir.path());
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        ckpt.save_model_config(&model_cfg()).unwrap();

        let report = train_loop::<Ad>(&cfg, &model_cfg(), data(), None, &ckpt, Default::default()).unwrap();

        assert_eq!(report.epochs, 2);
        let acc = report.test_accuracy.unwrap();
        assert!((0.0..=1.0).contains(&acc));
        assert!(report.last_epoch.unwrap().train_loss.is_finite());

        let manifest = ckpt.load_manifest().unwrap();
        assert_eq!(manifest.model_file, FINAL_MODEL);
        assert_eq!(manifest.epochs, 2);

        let csv = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);

        // Resuming continues the epoch count from the manifest
        let resumed = TrainConfig { epochs: 1, resume: Some(cfg.checkpoint_dir.clone()), ..cfg };
        let report  = train_loop::<Ad>(&resumed, &model_cfg(), data(), None, &ckpt, Default::default()).unwrap();
        assert_eq!(report.epochs, 3);
        assert_eq!(ckpt.load_manifest().unwrap().epochs, 3);
    }

    #[test]
    fn test_balanced_training_runs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { balance: true, epochs: 1, ..config(dir.path()) };
        let ckpt = CheckpointManager::new(dir.path()).unwrap();

        let report = train_loop::<Ad>(&cfg, &model_cfg(), data(), None, &ckpt, Default::default()).unwrap();
        assert_eq!(report.epochs, 1);
        assert_eq!(report.truncation.documents, 4);
    }
}
