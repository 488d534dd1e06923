use burn::config::Config;
use burn::module::{Module, Param};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::Distribution;

use crate::error::{Result, VqVaeError};

#[derive(Config)]
pub struct VectorQuantizerConfig {
    pub num_embeddings: usize,
    pub embedding_dim: usize,
    /// Moving-average decay for codebook updates. Only 0 (gradient-trained codebook) is supported.
    #[config(default = 0.0)]
    pub decay: f64,
}

impl VectorQuantizerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<VectorQuantizer<B>> {
        if self.decay != 0.0 {
            return Err(VqVaeError::EmaUnsupported { decay: self.decay });
        }

        if self.num_embeddings == 0 {
            return Err(VqVaeError::EmptyCodebook);
        }

        let bound = 1.0 / self.num_embeddings as f64;
        let embeddings = Tensor::random(
            [self.num_embeddings, self.embedding_dim],
            Distribution::Uniform(-bound, bound),
            device,
        );

        Ok(VectorQuantizer {
            num_embeddings: self.num_embeddings,
            embedding_dim: self.embedding_dim,
            embeddings: Param::from_tensor(embeddings),
        })
    }
}

#[derive(Module, Debug)]
pub struct VectorQuantizer<B: Backend> {
    num_embeddings: usize,
    embedding_dim: usize,
    // K x D
    embeddings: Param<Tensor<B, 2>>,
}

pub struct Quantized<B: Backend> {
    /// Selected codebook vectors. Differentiable w.r.t. the codebook only.
    pub codes: Tensor<B, 4>,
    /// Same values as `codes`, but the gradient goes straight through to the input.
    pub straight_through: Tensor<B, 4>,
    pub indices: Tensor<B, 3, Int>,
    pub perplexity: Tensor<B, 1>,
}

impl<B: Backend> VectorQuantizer<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Quantized<B> {
        let [batch, channels, height, width] = x.dims();
        assert_eq!(
            channels, self.embedding_dim,
            "quantizer expects {} channels, got {}",
            self.embedding_dim, channels
        );

        let device = x.device();
        let num_vectors = batch * height * width;

        // BxDxHxW -> (BxHxW)xD
        let flat = x.clone().permute([0, 2, 3, 1]).reshape([num_vectors, channels]);
        let codebook = self.embeddings.val();

        let indices = nearest_code(flat, codebook.clone());

        let encodings = Tensor::<B, 2>::zeros([num_vectors, self.num_embeddings], &device).scatter(
            1,
            indices.clone(),
            Tensor::ones([num_vectors, 1], &device),
        );

        let codes = encodings
            .clone()
            .matmul(codebook)
            .reshape([batch, height, width, channels])
            .permute([0, 3, 1, 2]);

        let straight_through = x.clone() + (codes.clone() - x).detach();

        Quantized {
            codes,
            straight_through,
            indices: indices.reshape([batch, height, width]),
            perplexity: perplexity(encodings),
        }
    }

    pub fn num_embeddings(&self) -> usize {
        self.num_embeddings
    }

    pub fn embeddings(&self) -> Tensor<B, 2> {
        self.embeddings.val()
    }
}

/// Index of the closest codebook row for every row of `flat`, as an Nx1 tensor.
fn nearest_code<B: Backend>(flat: Tensor<B, 2>, codebook: Tensor<B, 2>) -> Tensor<B, 2, Int> {
    let flat = flat.detach();
    let codebook = codebook.detach();

    let [num_vectors, _] = flat.dims();
    let [num_embeddings, _] = codebook.dims();

    // |x|^2 + |e|^2 - 2 x.e
    let flat_sq = flat
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .expand([num_vectors, num_embeddings]);
    let codebook_sq = codebook
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .reshape([1, num_embeddings])
        .expand([num_vectors, num_embeddings]);
    let dot = flat.matmul(codebook.transpose());

    let distances = flat_sq + codebook_sq - dot.mul_scalar(2.0);

    distances.argmin(1)
}

fn perplexity<B: Backend>(encodings: Tensor<B, 2>) -> Tensor<B, 1> {
    let avg_probs = encodings.mean_dim(0);
    let entropy = -(avg_probs.clone() * Tensor::log(avg_probs + 1e-10)).sum();

    Tensor::exp(entropy).detach()
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::loss::{MseLoss, Reduction};
    use burn::tensor::TensorData;

    use super::*;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    fn fixed_quantizer(rows: [[f32; 2]; 3]) -> VectorQuantizer<TestBackend> {
        let device = Default::default();
        VectorQuantizer {
            num_embeddings: 3,
            embedding_dim: 2,
            embeddings: Param::from_tensor(Tensor::from_floats(rows, &device)),
        }
    }

    #[test]
    fn test_codes_are_codebook_rows() {
        TestBackend::seed(7);
        let device = Default::default();

        let quantizer = VectorQuantizerConfig::new(8, 4)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::random([2, 4, 3, 5], Distribution::Default, &device);

        let output = quantizer.forward(x);
        assert_eq!(output.codes.dims(), [2, 4, 3, 5]);
        assert_eq!(output.indices.dims(), [2, 3, 5]);

        let codebook = quantizer.embeddings().to_data().to_vec::<f32>().unwrap();
        let rows = codebook.chunks(4).collect::<Vec<_>>();

        let codes = output
            .codes
            .permute([0, 2, 3, 1])
            .reshape([30, 4])
            .to_data()
            .to_vec::<f32>()
            .unwrap();

        for vector in codes.chunks(4) {
            assert!(rows.iter().any(|row| *row == vector), "{vector:?} is not a codebook entry");
        }
    }

    #[test]
    fn test_selects_nearest_code() {
        let device = Default::default();
        let quantizer = fixed_quantizer([[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);

        // three positions along the width axis
        let x = Tensor::<TestBackend, 1>::from_floats([0.1, 0.9, 5.0, 0.1, 1.2, 5.0], &device)
            .reshape([1, 2, 1, 3]);

        let output = quantizer.forward(x);

        let indices = output.indices.to_data().iter::<i64>().collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2]);

        output.codes.to_data().assert_approx_eq(
            &TensorData::from([[[[0.0f32, 1.0, 2.0]], [[0.0, 1.0, 2.0]]]]),
            5,
        );
    }

    #[test]
    fn test_straight_through_matches_codes() {
        let device = Default::default();
        let quantizer = fixed_quantizer([[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
        let x = Tensor::<TestBackend, 4>::random([1, 2, 4, 4], Distribution::Default, &device);

        let output = quantizer.forward(x);

        output
            .straight_through
            .to_data()
            .assert_approx_eq(&output.codes.to_data(), 5);
    }

    #[test]
    fn test_perplexity() {
        let device = Default::default();
        let quantizer = fixed_quantizer([[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);

        let single = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let perplexity = quantizer.forward(single).perplexity.into_scalar();
        assert!((perplexity - 1.0).abs() < 1e-4);

        let spread = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 2.0, 0.0, 1.0, 2.0], &device)
            .reshape([1, 2, 1, 3]);
        let perplexity = quantizer.forward(spread).perplexity.into_scalar();
        assert!((perplexity - 3.0).abs() < 1e-3);
    }

    #[test]
    #[should_panic]
    fn test_rejects_wrong_channel_count() {
        let device = Default::default();
        let quantizer = fixed_quantizer([[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);

        quantizer.forward(Tensor::<TestBackend, 4>::zeros([1, 3, 2, 2], &device));
    }

    #[test]
    fn test_ema_decay_fails_at_construction() {
        let device = Default::default();
        let result = VectorQuantizerConfig::new(512, 128)
            .with_decay(0.99)
            .init::<TestBackend>(&device);

        assert!(matches!(result, Err(VqVaeError::EmaUnsupported { .. })));
    }

    #[test]
    fn test_empty_codebook_fails_at_construction() {
        let device = Default::default();
        let result = VectorQuantizerConfig::new(0, 32).init::<TestBackend>(&device);

        assert!(matches!(result, Err(VqVaeError::EmptyCodebook)));
    }

    #[test]
    fn test_gradient_routing() {
        TestAutodiffBackend::seed(3);
        let device = Default::default();
        let quantizer = VectorQuantizerConfig::new(16, 4)
            .init::<TestAutodiffBackend>(&device)
            .unwrap();

        // commitment term reaches the input only
        let x = Tensor::<TestAutodiffBackend, 4>::random([1, 4, 3, 3], Distribution::Default, &device)
            .require_grad();
        let output = quantizer.forward(x.clone());
        let loss = MseLoss::new().forward(output.codes.detach(), x.clone(), Reduction::Mean);
        let grads = loss.backward();
        assert!(x.grad(&grads).is_some());
        assert!(quantizer.embeddings().grad(&grads).is_none());

        // codebook term reaches the codebook only
        let x = Tensor::<TestAutodiffBackend, 4>::random([1, 4, 3, 3], Distribution::Default, &device)
            .require_grad();
        let output = quantizer.forward(x.clone());
        let loss = MseLoss::new().forward(output.codes, x.clone().detach(), Reduction::Mean);
        let grads = loss.backward();
        assert!(x.grad(&grads).is_none());
        assert!(quantizer.embeddings().grad(&grads).is_some());

        // the straight-through output bypasses the lookup
        let x = Tensor::<TestAutodiffBackend, 4>::random([1, 4, 3, 3], Distribution::Default, &device)
            .require_grad();
        let output = quantizer.forward(x.clone());
        let grads = output.straight_through.sum().backward();
        let grad = x.grad(&grads).unwrap().to_data().to_vec::<f32>().unwrap();
        assert!(grad.iter().all(|g| (g - 1.0).abs() < 1e-6));
        assert!(quantizer.embeddings().grad(&grads).is_none());
    }
}
