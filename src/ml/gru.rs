// ============================================================
// Layer 5 — Packed Bidirectional GRU
// ============================================================
// A GRU run over a length-sorted, right-padded batch that only
// ever computes real positions.
//
// Because rows are sorted longest first, the rows still "alive"
// at time step t are always a prefix of the batch:
//
//   lengths      = [4, 2, 2, 1]
//   batch_sizes  = [4, 3, 1, 1]      (rows with length > t)
//
// At step t only rows 0..batch_sizes[t] are fed to the cell;
// the other rows keep their state untouched. That gives the
// backward direction the right starting point too: a row of
// length 2 starts its reverse pass at t = 1 from a zero state,
// never having seen the padding at t = 2, 3.
//
// Outputs at padded positions are exactly zero.
//
// Cell (per direction, gates packed as [reset | update | new]):
//   r  = σ(W_ir x + b_ir + W_hr h + b_hr)
//   z  = σ(W_iz x + b_iz + W_hz h + b_hz)
//   n  = tanh(W_in x + b_in + r ⊙ (W_hn h + b_hn))
//   h' = (1 - z) ⊙ n + z ⊙ h

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

/// Rows active at each time step; `lengths` must be sorted descending.
pub fn packed_batch_sizes(lengths: &[usize]) -> Vec<usize> {
    let steps = lengths.first().copied().unwrap_or(0);
    (0..steps)
        .map(|t| lengths.iter().take_while(|&&len| len > t).count())
        .collect()
}

#[derive(Config, Debug)]
pub struct PackedGruConfig {
    pub input_size:  usize,
    pub hidden_size: usize,
}

impl PackedGruConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PackedBiGru<B> {
        PackedBiGru {
            forward:  self.init_direction(device),
            backward: self.init_direction(device),
        }
    }

    fn init_direction<B: Backend>(&self, device: &B::Device) -> GruDirection<B> {
        GruDirection {
            input_gates:  LinearConfig::new(self.input_size, 3 * self.hidden_size).init(device),
            hidden_gates: LinearConfig::new(self.hidden_size, 3 * self.hidden_size).init(device),
            hidden_size:  self.hidden_size,
        }
    }
}

#[derive(Module, Debug)]
pub struct GruDirection<B: Backend> {
    pub input_gates:  Linear<B>,
    pub hidden_gates: Linear<B>,
    pub hidden_size:  usize,
}

impl<B: Backend> GruDirection<B> {
    /// One cell update for `n` active rows: x_gates [n, 3H], h [n, H] → [n, H].
    fn step(&self, x_gates: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, _] = h.dims();
        let hs     = self.hidden_size;
        let h_gates = self.hidden_gates.forward(h.clone());

        let gate = |t: &Tensor<B, 2>, k: usize| t.clone().slice([0..n, k * hs..(k + 1) * hs]);

        let r = activation::sigmoid(gate(&x_gates, 0) + gate(&h_gates, 0));
        let z = activation::sigmoid(gate(&x_gates, 1) + gate(&h_gates, 1));
        let candidate = activation::tanh(gate(&x_gates, 2) + r * gate(&h_gates, 2));

        z.clone() * h + z.neg().add_scalar(1.0) * candidate
    }

    /// Run over `x` [B, T, E] following `batch_sizes`; returns [B, steps, H].
    pub fn run(&self, x: Tensor<B, 3>, batch_sizes: &[usize], reverse: bool) -> Tensor<B, 3> {
        let [batch, _, _] = x.dims();
        let device = x.device();
        let hs     = self.hidden_size;
        let gs     = 3 * hs;
        let steps  = batch_sizes.len();

        // Input projections for every position at once
        let gates = self.input_gates.forward(x);

        let mut h = Tensor::<B, 2>::zeros([batch, hs], &device);
        let mut outputs: Vec<Option<Tensor<B, 2>>> = vec![None; steps];

        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..steps).rev())
        } else {
            Box::new(0..steps)
        };

        for t in order {
            let active = batch_sizes[t];
            let x_t = gates.clone().slice([0..active, t..t + 1, 0..gs]).reshape([active, gs]);
            let h_active = h.clone().slice([0..active, 0..hs]);
            let h_new = self.step(x_t, h_active);

            let (out, next) = if active < batch {
                let idle  = h.slice([active..batch, 0..hs]);
                let zeros = Tensor::<B, 2>::zeros([batch - active, hs], &device);
                (
                    Tensor::cat(vec![h_new.clone(), zeros], 0),
                    Tensor::cat(vec![h_new, idle], 0),
                )
            } else {
                (h_new.clone(), h_new)
            };
            outputs[t] = Some(out);
            h = next;
        }

        Tensor::stack::<3>(outputs.into_iter().flatten().collect(), 1)
    }
}

#[derive(Module, Debug)]
pub struct PackedBiGru<B: Backend> {
    pub forward:  GruDirection<B>,
    pub backward: GruDirection<B>,
}

impl<B: Backend> PackedBiGru<B> {
    /// x [B, T, E] with descending `batch_sizes` → [B, steps, 2H],
    /// forward states in the first H features, backward in the last H.
    pub fn run(&self, x: Tensor<B, 3>, batch_sizes: &[usize]) -> Tensor<B, 3> {
        let fwd = self.forward.run(x.clone(), batch_sizes, false);
        let bwd = self.backward.run(x, batch_sizes, true);
        Tensor::cat(vec![fwd, bwd], 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn values(t: Tensor<TestBackend, 3>) -> Vec<f32> {
        t.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_batch_sizes_follow_sorted_lengths() {
        assert_eq!(packed_batch_sizes(&[4, 2, 2, 1]), vec![4, 3, 1, 1]);
        assert_eq!(packed_batch_sizes(&[1]), vec![1]);
        assert!(packed_batch_sizes(&[]).is_empty());
    }

    #[test]
    fn test_padded_positions_output_zero() {
        let device = Default::default();
        let gru = PackedGruConfig::new(3, 2).init::<TestBackend>(&device);
        let x   = Tensor::<TestBackend, 3>::random([2, 3, 3], burn::tensor::Distribution::Default, &device);

        let out = gru.run(x, &packed_batch_sizes(&[3, 1]));
        assert_eq!(out.dims(), [2, 3, 4]);

        let padded = values(out.slice([1..2, 1..3, 0..4]));
        assert!(padded.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_padding_content_never_reaches_real_positions() {
        let device = Default::default();
        let gru = PackedGruConfig::new(2, 3).init::<TestBackend>(&device);

        let short = Tensor::<TestBackend, 3>::from_floats([[[0.5, -0.5], [0.1, 0.2]]], &device);
        let alone = gru.run(short.clone(), &packed_batch_sizes(&[2]));

        // Same row with garbage in a third, padded step, batched under a longer row
        let junk  = Tensor::<TestBackend, 3>::from_floats([[[9.0, 9.0]]], &device);
        let row   = Tensor::cat(vec![short, junk], 1);
        let long  = Tensor::<TestBackend, 3>::random([1, 3, 2], burn::tensor::Distribution::Default, &device);
        let batch = Tensor::cat(vec![long, row], 0);
        let out   = gru.run(batch, &packed_batch_sizes(&[3, 2]));

        let expected = values(alone);
        let actual   = values(out.slice([1..2, 0..2, 0..6]));
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5, "{a} vs {e}");
        }
    }
}
