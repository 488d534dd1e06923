use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::{Backend, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{Adaptor, LossInput};
use burn::train::{TrainOutput, TrainStep, ValidStep};

use crate::error::{Result, VqVaeError};
use crate::metric::gradnorm::{GradientNorm, GradientNormInput};
use crate::metric::latent_loss::{CodebookLossInput, CommitmentLossInput, ReconstructionLossInput};
use crate::metric::perplexity::{BottomPerplexityInput, TopPerplexityInput};
use crate::model::{check_input_shape, Prediction, VqVae};
use crate::ops::ScalarExt;

/// Normaliser for the reconstruction error, typical pixel variance of the training data.
pub const DATA_VARIANCE: f64 = 0.00025;

#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    images: Tensor<B, 4>,
    targets: Tensor<B, 4>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn new(images: Tensor<B, 4>, targets: Tensor<B, 4>) -> Result<Self> {
        check_input_shape(images.dims())?;

        if targets.dims() != images.dims() {
            return Err(VqVaeError::TargetShape {
                images: images.dims(),
                targets: targets.dims(),
            });
        }

        Ok(Self { images, targets })
    }

    /// Batch whose targets are the input images themselves.
    pub fn autoencoding(images: Tensor<B, 4>) -> Result<Self> {
        Self::new(images.clone(), images)
    }
}

#[derive(Module, Debug)]
pub struct Reconstruct<B: Backend> {
    pub model: VqVae<B>,
    pub commitment_cost: f32,
}

pub struct LossOutput<B: Backend> {
    pub total: Tensor<B, 1>,
    pub recon: Tensor<B, 1>,
    pub e_top: Tensor<B, 1>,
    pub e_bottom: Tensor<B, 1>,
    pub q_top: Tensor<B, 1>,
    pub q_bottom: Tensor<B, 1>,
}

pub type LossTuple<B> = (
    Tensor<B, 1>,
    Tensor<B, 1>,
    Tensor<B, 1>,
    Tensor<B, 1>,
    Tensor<B, 1>,
    Tensor<B, 1>,
);

impl<B: Backend> LossOutput<B> {
    pub fn labels() -> [&'static str; 6] {
        [
            "loss",
            "recon_loss",
            "e_top_latent_loss",
            "e_bottom_latent_loss",
            "q_top_latent_loss",
            "q_bottom_latent_loss",
        ]
    }

    pub fn into_tuple(self) -> LossTuple<B> {
        (
            self.total,
            self.recon,
            self.e_top,
            self.e_bottom,
            self.q_top,
            self.q_bottom,
        )
    }

    /// Component values in `labels()` order.
    pub fn scalars(&self) -> [f32; 6] {
        [
            self.total.scalar(),
            self.recon.scalar(),
            self.e_top.scalar(),
            self.e_bottom.scalar(),
            self.q_top.scalar(),
            self.q_bottom.scalar(),
        ]
    }
}

impl<B: Backend> Reconstruct<B> {
    pub fn new(model: VqVae<B>, commitment_cost: f32) -> Self {
        Self {
            model,
            commitment_cost,
        }
    }

    pub fn loss(&self, prediction: &Prediction<B>, target: Tensor<B, 4>) -> LossOutput<B> {
        let mse = MseLoss::new();

        // e_* trains the encoder towards its codes, q_* trains the codes towards the encoder
        let e_top = mse.forward(
            prediction.top_quantized.clone().detach(),
            prediction.merged_top.clone(),
            Reduction::Mean,
        );
        let q_top = mse.forward(
            prediction.top_quantized.clone(),
            prediction.merged_top.clone().detach(),
            Reduction::Mean,
        );

        let e_bottom = mse.forward(
            prediction.bottom_quantized.clone().detach(),
            prediction.bottom_pre_quant.clone(),
            Reduction::Mean,
        );
        let q_bottom = mse.forward(
            prediction.bottom_quantized.clone(),
            prediction.bottom_pre_quant.clone().detach(),
            Reduction::Mean,
        );

        let recon = mse
            .forward(prediction.reconstruction.clone(), target, Reduction::Mean)
            .div_scalar(DATA_VARIANCE);

        let total = recon.clone()
            + q_top.clone()
            + q_bottom.clone()
            + (e_top.clone() + e_bottom.clone()).mul_scalar(self.commitment_cost);

        LossOutput {
            total,
            recon,
            e_top,
            e_bottom,
            q_top,
            q_bottom,
        }
    }

    fn forward_step(&self, batch: ImageBatch<B>) -> (Prediction<B>, LossOutput<B>) {
        let ImageBatch { images, targets } = batch;

        let prediction = self.model.predict(images);
        let loss = self.loss(&prediction, targets);

        (prediction, loss)
    }

    pub fn gradient_norm(&self, grads: &B::Gradients) -> f32
    where
        B: AutodiffBackend,
    {
        let mut gradient_norm = GradientNorm::new(grads, 1.0);
        self.visit(&mut gradient_norm);
        gradient_norm.total_norm.sqrt()
    }
}

pub struct ReconstructStepOutput<B: Backend> {
    pub reconstruction: Tensor<B, 4>,
    pub loss: LossOutput<B>,
    pub top_perplexity: f32,
    pub bottom_perplexity: f32,
    pub gradient_norm: Option<f32>,
}

impl<B: Backend> ReconstructStepOutput<B> {
    fn new(prediction: Prediction<B>, loss: LossOutput<B>, gradient_norm: Option<f32>) -> Self {
        Self {
            reconstruction: prediction.reconstruction,
            top_perplexity: prediction.top_perplexity.scalar(),
            bottom_perplexity: prediction.bottom_perplexity.scalar(),
            loss,
            gradient_norm,
        }
    }
}

impl<B: AutodiffBackend> TrainStep<ImageBatch<B>, ReconstructStepOutput<B>> for Reconstruct<B> {
    fn step(&self, batch: ImageBatch<B>) -> TrainOutput<ReconstructStepOutput<B>> {
        let (prediction, loss) = self.forward_step(batch);

        let grads = loss.total.backward();
        let gradient_norm = self.gradient_norm(&grads);

        TrainOutput::new(
            self,
            grads,
            ReconstructStepOutput::new(prediction, loss, Some(gradient_norm)),
        )
    }
}

impl<B: Backend> ValidStep<ImageBatch<B>, ReconstructStepOutput<B>> for Reconstruct<B> {
    fn step(&self, batch: ImageBatch<B>) -> ReconstructStepOutput<B> {
        let (prediction, loss) = self.forward_step(batch);

        ReconstructStepOutput::new(prediction, loss, None)
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for ReconstructStepOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.total.clone())
    }
}

impl<B: Backend> Adaptor<ReconstructionLossInput> for ReconstructStepOutput<B> {
    fn adapt(&self) -> ReconstructionLossInput {
        ReconstructionLossInput {
            value: self.loss.recon.scalar(),
        }
    }
}

impl<B: Backend> Adaptor<CommitmentLossInput> for ReconstructStepOutput<B> {
    fn adapt(&self) -> CommitmentLossInput {
        CommitmentLossInput {
            value: self.loss.e_top.scalar::<f32>() + self.loss.e_bottom.scalar::<f32>(),
        }
    }
}

impl<B: Backend> Adaptor<CodebookLossInput> for ReconstructStepOutput<B> {
    fn adapt(&self) -> CodebookLossInput {
        CodebookLossInput {
            value: self.loss.q_top.scalar::<f32>() + self.loss.q_bottom.scalar::<f32>(),
        }
    }
}

impl<B: Backend> Adaptor<TopPerplexityInput> for ReconstructStepOutput<B> {
    fn adapt(&self) -> TopPerplexityInput {
        TopPerplexityInput {
            value: self.top_perplexity,
        }
    }
}

impl<B: Backend> Adaptor<BottomPerplexityInput> for ReconstructStepOutput<B> {
    fn adapt(&self) -> BottomPerplexityInput {
        BottomPerplexityInput {
            value: self.bottom_perplexity,
        }
    }
}

impl<B: Backend> Adaptor<GradientNormInput> for ReconstructStepOutput<B> {
    fn adapt(&self) -> GradientNormInput {
        GradientNormInput {
            value: self.gradient_norm.unwrap_or_default(),
        }
    }
}
