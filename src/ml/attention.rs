// ============================================================
// Layer 5 — Context-Conditioned Additive Attention
// ============================================================
// Scores every valid position of every sequence against two
// context vectors (user u, item i):
//
//   score[b, t] = w · tanh(W_u u[b] + W_i i[b] + W_h h[b, t] + bias)
//
// then normalises the scores with a masked softmax so that
// padded positions get exactly zero weight and the valid
// weights of each row sum to one.
//
// The softmax subtracts the per-row maximum (taken over valid
// positions only) before exponentiating; the maximum term then
// contributes exp(0) = 1 to the denominator, so a row with at
// least one valid position can never divide by zero.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

/// Score written into padded slots before exponentiation.
const MASKED_SCORE: f32 = -1.0e9;

#[derive(Config, Debug)]
pub struct AdditiveAttentionConfig {
    /// Width of each hidden state (2H for a bidirectional encoder)
    pub hidden_size:  usize,
    pub context_size: usize,
}

impl AdditiveAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AdditiveAttention<B> {
        let n = self.hidden_size;
        AdditiveAttention {
            att_u: LinearConfig::new(self.context_size, n).with_bias(false).init(device),
            // carries the shared bias term
            att_i: LinearConfig::new(self.context_size, n).init(device),
            att_h: LinearConfig::new(n, n).with_bias(false).init(device),
            att_w: LinearConfig::new(n, 1).with_bias(false).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct AdditiveAttention<B: Backend> {
    pub att_u: Linear<B>,
    pub att_i: Linear<B>,
    pub att_h: Linear<B>,
    pub att_w: Linear<B>,
}

impl<B: Backend> AdditiveAttention<B> {
    /// hidden [B, T, N], users/items [B, C], mask [B, T] (1 = valid)
    /// → attention weights [B, T].
    pub fn forward(
        &self,
        hidden: Tensor<B, 3>,
        users:  Tensor<B, 2>,
        items:  Tensor<B, 2>,
        mask:   Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let [batch, steps, _] = hidden.dims();

        let context = self.att_u.forward(users) + self.att_i.forward(items);
        let summed  = activation::tanh(self.att_h.forward(hidden) + context.unsqueeze_dim::<3>(1));
        let scores  = self.att_w.forward(summed).reshape([batch, steps]);

        masked_softmax(scores, mask)
    }
}

/// Row-wise softmax over positions where `mask` is 1; masked positions get 0.
pub fn masked_softmax<B: Backend>(scores: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let padding = mask.clone().equal_elem(0.0);

    let row_max = scores
        .clone()
        .mask_fill(padding.clone(), MASKED_SCORE)
        .max_dim(1)
        .detach();

    let exp = (scores - row_max).mask_fill(padding, MASKED_SCORE).exp() * mask;
    let sum = exp.clone().sum_dim(1);
    exp / sum
}

/// Reusable host-side buffer for the [B, T] validity mask.
#[derive(Debug, Default)]
pub struct MaskBuffer {
    values: Vec<f32>,
}

impl MaskBuffer {
    /// Overwrite the buffer with a mask for `lengths` over `steps` positions.
    pub fn fill(&mut self, lengths: &[usize], steps: usize) -> &[f32] {
        self.values.clear();
        self.values.resize(lengths.len() * steps, 0.0);
        for (row, &len) in lengths.iter().enumerate() {
            let valid = len.min(steps);
            self.values[row * steps..row * steps + valid].fill(1.0);
        }
        &self.values
    }

    pub fn tensor<B: Backend>(&mut self, lengths: &[usize], steps: usize, device: &B::Device) -> Tensor<B, 2> {
        let rows = lengths.len();
        Tensor::<B, 1>::from_floats(self.fill(lengths, steps), device).reshape([rows, steps])
    }
}
