// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Classifies raw review text with a trained checkpoint and
// reports which sentences the model attended to.
//
// Texts go through the same vectorizer and batcher as training,
// so sentences beyond max_sents are cut in the same way; the
// attention vector covers exactly the sentences the model saw.
// Requests are scored in chunks of the training batch size, so a
// long input file never becomes one oversized forward pass.

use anyhow::{Context, Result};
use burn::{prelude::*, tensor::activation};

use crate::data::{
    batcher::{ReviewBatcher, TrimLimits},
    mappings::ModelMaps,
    vectorizer::{EncodedSentence, Vectorizer},
};
use crate::domain::document::{ContextIds, TokenizedDocument};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{ForwardWorkspace, HierarchicalClassifier};

/// One text to classify, with optional user / item names.
#[derive(Debug, Clone, Default)]
pub struct ClassifyRequest {
    pub text: String,
    pub user: Option<String>,
    pub item: Option<String>,
}

impl ClassifyRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone)]
pub struct SentenceWeight {
    pub text:   String,
    pub weight: f32,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    /// Raw label, as found in the training data
    pub label:         i64,
    pub class:         usize,
    /// Softmax over classes, indexed by class id
    pub probabilities: Vec<f32>,
    pub sentences:     Vec<SentenceWeight>,
}

pub struct Inferencer<B: Backend> {
    model:      HierarchicalClassifier<B>,
    vectorizer: Vectorizer,
    maps:       ModelMaps,
    batcher:    ReviewBatcher<B>,
    batch_size: usize,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:      HierarchicalClassifier<B>,
        vectorizer: Vectorizer,
        maps:       ModelMaps,
        batcher:    ReviewBatcher<B>,
        batch_size: usize,
    ) -> Self {
        Self { model, vectorizer, maps, batcher, batch_size: batch_size.max(1) }
    }

    pub fn from_checkpoint(ckpt: &CheckpointManager, device: &B::Device) -> Result<Self> {
        let cfg        = ckpt.load_config()?;
        let maps       = ckpt.load_maps()?;
        let vectorizer = Vectorizer::new(ckpt.tokenizer_store().load()?);
        let model      = ckpt.restore_model::<B>(device)?;
        let batcher    = ReviewBatcher::new(device.clone(), TrimLimits::new(cfg.max_sents, cfg.max_words));

        tracing::info!("Model loaded from '{}'", ckpt.dir().display());
        Ok(Self::new(model, vectorizer, maps, batcher, cfg.batch_size))
    }

    pub fn classify(&self, requests: &[ClassifyRequest]) -> Result<Vec<Prediction>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut texts = Vec::with_capacity(requests.len());
        let mut docs  = Vec::with_capacity(requests.len());
        for req in requests {
            let sentences: Vec<EncodedSentence> = self.vectorizer.encode_sentences(&req.text)?;
            let context = ContextIds::new(
                self.maps.users.id_of(req.user.as_deref()),
                self.maps.items.id_of(req.item.as_deref()),
            );
            let ids = sentences.iter().map(|s| s.ids.clone()).collect();
            docs.push(TokenizedDocument::new(ids, 0).with_context(context));
            texts.push(sentences);
        }

        let mut ws          = ForwardWorkspace::new();
        let mut predictions = Vec::with_capacity(requests.len());
        let mut texts       = texts.into_iter();
        for chunk in docs.chunks(self.batch_size) {
            let sentences: Vec<_> = texts.by_ref().take(chunk.len()).collect();
            predictions.extend(self.classify_chunk(chunk, sentences, &mut ws)?);
        }
        Ok(predictions)
    }

    fn classify_chunk(
        &self,
        docs:  &[TokenizedDocument],
        texts: Vec<Vec<EncodedSentence>>,
        ws:    &mut ForwardWorkspace,
    ) -> Result<Vec<Prediction>> {
        let batch   = self.batcher.batch_documents(docs);
        let output  = self.model.forward_with_attention(&batch, ws)?;
        let classes = self.maps.labels.num_classes();

        let probs: Vec<f32> = activation::softmax(output.scores, 1).into_data().iter::<f32>().collect();
        let [_, max_lr] = output.sentence_attention.dims();
        let attention: Vec<f32> = output.sentence_attention.into_data().iter::<f32>().collect();

        let limit = self.batcher.limits.max_sents;
        texts
            .into_iter()
            .enumerate()
            .map(|(k, sentences)| -> Result<Prediction> {
                let probabilities = probs[k * classes..(k + 1) * classes].to_vec();
                let class = argmax(&probabilities);
                let label = self
                    .maps
                    .labels
                    .label_of(class)
                    .with_context(|| format!("class {class} has no label in the checkpoint maps"))?;

                let weights = &attention[k * max_lr..(k + 1) * max_lr];
                let sentences = sentences
                    .into_iter()
                    .take(limit)
                    .zip(weights)
                    .map(|(s, &weight)| SentenceWeight { text: s.text, weight })
                    .collect();

                Ok(Prediction { label, class, probabilities, sentences })
            })
            .collect()
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mappings::{ContextMap, LabelMap};
    use crate::infra::tokenizer_store::TokenizerStore;
    use crate::ml::model::HierarchicalClassifierConfig;

    type TestBackend = burn::backend::NdArray;

    fn inferencer(dir: &std::path::Path, max_sents: usize) -> Inferencer<TestBackend> {
        inferencer_with_batch(dir, max_sents, 32)
    }

    fn inferencer_with_batch(dir: &std::path::Path, max_sents: usize, batch_size: usize) -> Inferencer<TestBackend> {
        let words: Vec<String> = ["great", "bad", "phone", "."].iter().map(|w| w.to_string()).collect();
        let tok    = TokenizerStore::new(dir).build_from_words(&words).unwrap();
        let device = Default::default();
        let model  = HierarchicalClassifierConfig::new(tok.get_vocab_size(true), 2, 1, 3)
            .with_embed_size(4)
            .with_hidden_size(2)
            .init::<TestBackend>(&device)
            .unwrap();
        let maps = ModelMaps {
            labels: LabelMap::build([1, 3, 5]),
            users:  ContextMap::build([Some("alice")]),
            items:  ContextMap::default(),
        };
        let batcher = ReviewBatcher::new(device, TrimLimits::new(max_sents, 10));
        Inferencer::new(model, Vectorizer::new(tok), maps, batcher, batch_size)
    }

    #[test]
    fn test_predictions_carry_probabilities_and_sentence_attention() {
        let dir = tempfile::tempdir().unwrap();
        let inf = inferencer(dir.path(), 8);

        let requests = vec![
            ClassifyRequest::new("Great phone. Bad battery. Great!"),
            ClassifyRequest { user: Some("alice".into()), ..ClassifyRequest::new("bad") },
        ];
        let out = inf.classify(&requests).unwrap();
        assert_eq!(out.len(), 2);

        for p in &out {
            assert_eq!(p.probabilities.len(), 3);
            assert!((p.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            assert!([1, 3, 5].contains(&p.label));
            let total: f32 = p.sentences.iter().map(|s| s.weight).sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
        assert_eq!(out[0].sentences.len(), 3);
        assert_eq!(out[0].sentences[1].text, "Bad battery.");
        assert_eq!(out[1].sentences.len(), 1);
        assert!((out[1].sentences[0].weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sentences_beyond_the_limit_are_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let inf = inferencer(dir.path(), 2);
        let out = inf.classify(&[ClassifyRequest::new("Great. Bad. Phone.")]).unwrap();
        assert_eq!(out[0].sentences.len(), 2);
    }

    #[test]
    fn test_requests_beyond_one_batch_keep_their_order() {
        let dir = tempfile::tempdir().unwrap();
        let inf = inferencer_with_batch(dir.path(), 8, 2);

        let texts = ["Great.", "Bad phone. Great!", "Phone. Bad. Great.", "bad", "Great phone. Bad."];
        let requests: Vec<ClassifyRequest> = texts.iter().map(|t| ClassifyRequest::new(*t)).collect();
        let out = inf.classify(&requests).unwrap();

        assert_eq!(out.len(), 5);
        let counts: Vec<usize> = out.iter().map(|p| p.sentences.len()).collect();
        assert_eq!(counts, vec![1, 2, 3, 1, 2]);
        assert_eq!(out[2].sentences[1].text, "Bad.");

        for (p, request) in out.iter().zip(&requests) {
            let alone = &inf.classify(std::slice::from_ref(request)).unwrap()[0];
            for (a, b) in p.probabilities.iter().zip(&alone.probabilities) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_empty_request_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inferencer(dir.path(), 4).classify(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
    }
}
