// ============================================================
// Layer 5 — Hierarchical Attention Classifier
// ============================================================
//   words [S, W]                        (rows sorted by sentence length)
//     │ embed (× not-PAD mask)
//     ▼
//   word encoder ── contexts gathered per row by doc_index
//     │ [S, 2H] one vector per sentence
//     ▼
//   resequence ──▶ [N, max_lr, 2H]      (documents by sentence count)
//     │
//   sentence encoder ── contexts in document_order
//     │ [N, 2H]
//     ▼
//   restore ──▶ caller order ──▶ linear ──▶ [N, classes]
//
// Dropout (training only) acts on the three embedding lookups.
// The padding embedding never contributes: embedded positions
// holding PAD are multiplied by zero, so the PAD row of the
// table also never receives gradient.

use burn::{
    module::Param,
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::data::batcher::ReviewBatch;
use crate::domain::document::{PAD_ID, UNK_ID};
use crate::ml::attention::MaskBuffer;
use crate::ml::encoder::{SequenceEncoder, SequenceEncoderConfig};
use crate::ml::error::ModelError;
use crate::ml::resequencer::ResequencePlan;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct HierarchicalClassifierConfig {
    pub vocab_size:  usize,
    /// Size of the user table, including the "no user" id 0
    pub num_users:   usize,
    pub num_items:   usize,
    pub num_classes: usize,
    #[config(default = 200)]
    pub embed_size:  usize,
    /// Per direction
    #[config(default = 100)]
    pub hidden_size: usize,
    #[config(default = 0.5)]
    pub dropout:     f64,
    /// Width of the user/item vectors; defaults to 2 x hidden_size.
    pub context_size: Option<usize>,
}

impl HierarchicalClassifierConfig {
    pub fn context_width(&self) -> usize {
        self.context_size.unwrap_or(2 * self.hidden_size)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<HierarchicalClassifier<B>, ModelError> {
        if self.vocab_size <= UNK_ID as usize + 1 {
            return Err(ModelError::Config(format!(
                "vocabulary of {} ids has no room beyond the reserved tokens",
                self.vocab_size
            )));
        }
        if self.num_classes == 0 || self.num_users == 0 || self.num_items == 0 {
            return Err(ModelError::Config(
                "class, user and item tables must each have at least one entry".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::Config(format!("dropout {} is outside [0, 1)", self.dropout)));
        }

        let ctx  = self.context_width();
        let word = SequenceEncoderConfig::new(self.embed_size, self.hidden_size, ctx).init(device)?;
        let sent = SequenceEncoderConfig::new(2 * self.hidden_size, self.hidden_size, ctx).init(device)?;

        Ok(HierarchicalClassifier {
            embed:   EmbeddingConfig::new(self.vocab_size, self.embed_size).init(device),
            users:   EmbeddingConfig::new(self.num_users, ctx).init(device),
            items:   EmbeddingConfig::new(self.num_items, ctx).init(device),
            word,
            sent,
            output:  LinearConfig::new(2 * self.hidden_size, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        })
    }
}

#[derive(Module, Debug)]
pub struct HierarchicalClassifier<B: Backend> {
    pub embed:   Embedding<B>,
    pub users:   Embedding<B>,
    pub items:   Embedding<B>,
    pub word:    SequenceEncoder<B>,
    pub sent:    SequenceEncoder<B>,
    pub output:  Linear<B>,
    pub dropout: Dropout,
}

/// Scratch state for one forward pass at a time.
///
/// Every forward call overwrites all of it; two batches in flight at
/// once need two workspaces.
#[derive(Debug, Default)]
pub struct ForwardWorkspace {
    word_mask:     MaskBuffer,
    sentence_mask: MaskBuffer,
    word_lengths:  Vec<usize>,
    plan:          ResequencePlan,
}

impl ForwardWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan of the most recent forward pass.
    pub fn plan(&self) -> &ResequencePlan {
        &self.plan
    }
}

pub struct ClassifierOutput<B: Backend> {
    /// [N, num_classes], caller's document order
    pub scores: Tensor<B, 2>,
    /// [N, max_lr], caller's document order; zero past each document's length
    pub sentence_attention: Tensor<B, 2>,
}

#[derive(Debug)]
pub struct ClassificationStep<B: Backend> {
    pub loss:    Tensor<B, 1>,
    pub scores:  Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> HierarchicalClassifier<B> {
    /// Class scores for every document of `batch`, in the caller's order.
    pub fn forward(&self, batch: &ReviewBatch<B>, ws: &mut ForwardWorkspace) -> Result<Tensor<B, 2>, ModelError> {
        self.run(batch, ws, true).map(|out| out.scores)
    }

    /// Scores plus sentence attention, without dropout.
    pub fn forward_with_attention(
        &self,
        batch: &ReviewBatch<B>,
        ws:    &mut ForwardWorkspace,
    ) -> Result<ClassifierOutput<B>, ModelError> {
        self.run(batch, ws, false)
    }

    /// Weighted cross-entropy over the batch; `class_weights` has one entry per class.
    pub fn forward_classification(
        &self,
        batch:         &ReviewBatch<B>,
        ws:            &mut ForwardWorkspace,
        class_weights: Option<&[f32]>,
    ) -> Result<ClassificationStep<B>, ModelError> {
        let scores = self.forward(batch, ws)?;
        let [_, classes] = scores.dims();

        let mut ce = CrossEntropyLossConfig::new();
        if let Some(weights) = class_weights {
            if weights.len() != classes {
                return Err(ModelError::Shape {
                    what:     "class weights",
                    expected: vec![classes],
                    actual:   vec![weights.len()],
                });
            }
            ce = ce.with_weights(Some(weights.to_vec()));
        }

        let targets = batch.labels.clone();
        let loss    = ce.init(&scores.device()).forward(scores.clone(), targets.clone());
        Ok(ClassificationStep { loss, scores, targets })
    }

    /// Replace the word embedding table, e.g. with pretrained vectors.
    pub fn set_word_embeddings(mut self, table: Tensor<B, 2>) -> Result<Self, ModelError> {
        let expected = self.embed.weight.val().dims();
        if table.dims() != expected {
            return Err(ModelError::Shape {
                what:     "word embedding table",
                expected: expected.to_vec(),
                actual:   table.dims().to_vec(),
            });
        }
        self.embed.weight = Param::from_tensor(table);
        Ok(self)
    }

    fn run(
        &self,
        batch: &ReviewBatch<B>,
        ws:    &mut ForwardWorkspace,
        train: bool,
    ) -> Result<ClassifierOutput<B>, ModelError> {
        if batch.num_docs == 0 || batch.stats.is_empty() {
            return Err(ModelError::EmptyBatch);
        }
        ws.plan.rebuild(&batch.stats, batch.num_docs)?;

        let device = batch.words.device();
        let regularise = |t: Tensor<B, 2>| if train { self.dropout.forward(t) } else { t };

        // ── Document contexts [N, C] in caller order ──────────────────────────
        let users = regularise(self.lookup(&self.users, batch.users.clone()));
        let items = regularise(self.lookup(&self.items, batch.items.clone()));

        // ── Word level ────────────────────────────────────────────────────────
        let [rows, width] = batch.words.dims();
        let not_pad  = batch.words.clone().not_equal_elem(PAD_ID as i32).float();
        let embedded = self.embed.forward(batch.words.clone()) * not_pad.unsqueeze_dim::<3>(2);
        let embedded = if train { self.dropout.forward(embedded) } else { embedded };

        let doc_rows: Vec<i32> = batch.stats.iter().map(|s| s.doc_index as i32).collect();
        let doc_rows = Tensor::<B, 1, Int>::from_ints(doc_rows.as_slice(), &device);

        ws.word_lengths.clear();
        ws.word_lengths.extend(batch.stats.iter().map(|s| s.ls));

        let words = self.word.forward(
            embedded,
            &ws.word_lengths,
            users.clone().select(0, doc_rows.clone()),
            items.clone().select(0, doc_rows),
            &mut ws.word_mask,
        )?;
        tracing::trace!("word level: {} rows x {} steps", rows, width);

        // ── Sentence level ────────────────────────────────────────────────────
        let sentences = ws.plan.apply(words.pooled)?;
        let docs = self.sent.forward(
            sentences,
            ws.plan.lengths(),
            ws.plan.reorder(users),
            ws.plan.reorder(items),
            &mut ws.sentence_mask,
        )?;

        // ── Back to caller order ──────────────────────────────────────────────
        let pooled = ws.plan.restore(docs.pooled);
        let scores = self.output.forward(pooled);

        Ok(ClassifierOutput {
            scores,
            sentence_attention: ws.plan.restore(docs.weights),
        })
    }

    fn lookup(&self, table: &Embedding<B>, ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [n] = ids.dims();
        let [_, width] = table.weight.val().dims();
        table.forward(ids.unsqueeze_dim::<2>(1)).reshape([n, width])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{ReviewBatcher, TrimLimits};
    use crate::domain::document::{ContextIds, TokenizedDocument};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    fn config() -> HierarchicalClassifierConfig {
        HierarchicalClassifierConfig::new(40, 3, 3, 2)
            .with_embed_size(4)
            .with_hidden_size(3)
            .with_dropout(0.0)
    }

    fn doc(tag: u32, lengths: &[usize]) -> TokenizedDocument {
        let sentences = lengths
            .iter()
            .enumerate()
            .map(|(s, &len)| (0..len as u32).map(|k| 2 + (tag * 7 + s as u32 * 3 + k) % 38).collect())
            .collect();
        TokenizedDocument::new(sentences, (tag % 2) as usize)
            .with_context(ContextIds::new(tag as usize % 3, (tag as usize + 1) % 3))
    }

    /// A = [3, 5], B = [4], C = [2, 2, 6]
    fn scenario() -> Vec<TokenizedDocument> {
        vec![doc(1, &[3, 5]), doc(2, &[4]), doc(3, &[2, 2, 6])]
    }

    fn batch<B: Backend>(docs: &[TokenizedDocument], device: &B::Device) -> ReviewBatch<B> {
        ReviewBatcher::<B>::new(device.clone(), TrimLimits::unlimited()).batch_documents(docs)
    }

    fn rows(t: Tensor<TestBackend, 2>) -> Vec<Vec<f32>> {
        let [_, width] = t.dims();
        let flat: Vec<f32> = t.into_data().iter::<f32>().collect();
        flat.chunks(width).map(<[f32]>::to_vec).collect()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_mismatched_context_size_is_a_configuration_error() {
        let device = Default::default();
        let err = config().with_context_size(Some(5)).init::<TestBackend>(&device).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn test_vocabulary_needs_a_word_beyond_pad_and_unk() {
        let device = Default::default();
        let err = HierarchicalClassifierConfig::new(2, 1, 1, 2).init::<TestBackend>(&device).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
        assert!(HierarchicalClassifierConfig::new(3, 1, 1, 2)
            .with_embed_size(4)
            .with_hidden_size(2)
            .init::<TestBackend>(&device)
            .is_ok());
    }

    #[test]
    fn test_scores_follow_caller_document_order() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device).unwrap();
        let mut ws = ForwardWorkspace::new();
        let docs   = scenario();

        let scores = rows(model.forward_with_attention(&batch(&docs, &device), &mut ws).unwrap().scores);
        assert_eq!(scores.len(), 3);
        // Sentence level ran C, A, B
        assert_eq!(ws.plan().document_order().as_slice(), &[2, 0, 1]);

        // Every document scored alone matches its row in the joint batch
        for (k, d) in docs.iter().enumerate() {
            let alone = model
                .forward_with_attention(&batch(std::slice::from_ref(d), &device), &mut ws)
                .unwrap();
            assert_close(&rows(alone.scores)[0], &scores[k]);
        }

        // Permuting the batch permutes the output rows the same way
        let shuffled = vec![docs[2].clone(), docs[0].clone(), docs[1].clone()];
        let permuted = rows(model.forward_with_attention(&batch(&shuffled, &device), &mut ws).unwrap().scores);
        assert_close(&permuted[0], &scores[2]);
        assert_close(&permuted[1], &scores[0]);
        assert_close(&permuted[2], &scores[1]);
    }

    #[test]
    fn test_sentence_attention_is_normalised_per_document() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device).unwrap();
        let mut ws = ForwardWorkspace::new();

        let out = model.forward_with_attention(&batch(&scenario(), &device), &mut ws).unwrap();
        let att = rows(out.sentence_attention);

        assert_eq!(att.len(), 3);
        for (row, len) in att.iter().zip([2usize, 1, 3]) {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
            assert!(row[len..].iter().all(|&w| w == 0.0));
        }
        assert_close(&att[1], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_document_without_sentences_is_scored_alongside_others() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device).unwrap();
        let mut ws = ForwardWorkspace::new();

        let mut docs = scenario();
        docs.insert(1, TokenizedDocument::new(vec![], 0));

        let out    = model.forward_with_attention(&batch(&docs, &device), &mut ws).unwrap();
        let scores = rows(out.scores);
        assert_eq!(scores.len(), 4);
        assert!(scores.iter().flatten().all(|v| v.is_finite()));

        let att = rows(out.sentence_attention);
        assert_close(&att[1], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_padding_embedding_receives_no_gradient() {
        type Ad = Autodiff<NdArray>;
        let device = Default::default();
        let model  = config().init::<Ad>(&device).unwrap();
        let mut ws = ForwardWorkspace::new();

        let step = model
            .forward_classification(&batch::<Ad>(&scenario(), &device), &mut ws, Some(&[0.4, 0.6]))
            .unwrap();
        let grads = step.loss.backward();

        let table_grad = model.embed.weight.val().grad(&grads).unwrap();
        let pad_row: Vec<f32> = table_grad.clone().slice([0..1, 0..4]).into_data().iter::<f32>().collect();
        assert!(pad_row.iter().all(|&g| g == 0.0));

        let total: f32 = table_grad.abs().sum().into_data().iter::<f32>().sum();
        assert!(total > 0.0);
    }

    #[test]
    fn test_class_weights_must_match_class_count() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device).unwrap();
        let err = model
            .forward_classification(&batch(&scenario(), &device), &mut ForwardWorkspace::new(), Some(&[1.0]))
            .unwrap_err();
        assert!(matches!(err, ModelError::Shape { what: "class weights", .. }));
    }

    #[test]
    fn test_set_word_embeddings_checks_dimensions() {
        let device = Default::default();
        let model  = config().init::<TestBackend>(&device).unwrap();

        let wrong = Tensor::<TestBackend, 2>::zeros([40, 5], &device);
        assert!(model.clone().set_word_embeddings(wrong).is_err());

        let table = Tensor::<TestBackend, 2>::ones([40, 4], &device);
        let model = model.set_word_embeddings(table).unwrap();
        let sum: f32 = model.embed.weight.val().sum().into_data().iter::<f32>().sum();
        assert_eq!(sum, 160.0);
    }
}
