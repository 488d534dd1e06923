use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;
use tracing::debug;

use crate::error::{Result, VqVaeError};
use crate::model::{Prediction, VqVae};
use crate::ops::{self, ScalarExt};
use crate::summary::{SummaryWriter, RANDOM_TAG, RECONSTRUCTED_TAG};
use crate::task::reconstruct::{LossOutput, Reconstruct};

/// The configured model and loss hyperparameters of one training run.
pub struct TrainingContext<B: Backend> {
    pub task: Reconstruct<B>,
    pub beta: f64,
    last_epoch: Option<usize>,
}

impl<B: Backend> TrainingContext<B> {
    pub fn new(task: Reconstruct<B>, beta: f64) -> Self {
        Self {
            task,
            beta,
            last_epoch: None,
        }
    }

    pub fn model(&self) -> &VqVae<B> {
        &self.task.model
    }

    pub fn commitment_cost(&self) -> f32 {
        self.task.commitment_cost
    }

    pub fn last_epoch(&self) -> Option<usize> {
        self.last_epoch
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Prediction<B>> {
        self.task.model.forward(input)
    }

    /// Total and component losses for `prediction` against `target`.
    pub fn loss(&self, prediction: &Prediction<B>, target: Tensor<B, 4>, _input: Tensor<B, 4>) -> LossOutput<B> {
        self.task.loss(prediction, target)
    }

    /// Records reconstructions and the model's response to noise, at most once per epoch.
    ///
    /// Returns whether anything was written. The noise has the same shape as `input` and the
    /// standard deviation observed in it.
    pub fn summary<W: SummaryWriter<B>>(
        &mut self,
        epoch: usize,
        writer: &mut W,
        prediction: &Prediction<B>,
        input: Tensor<B, 4>,
    ) -> Result<bool> {
        if self.last_epoch.is_some_and(|last| epoch <= last) {
            debug!(epoch, last_epoch = ?self.last_epoch, "summary already written");
            return Ok(false);
        }
        self.last_epoch = Some(epoch);

        writer
            .add_images(RECONSTRUCTED_TAG, prediction.reconstruction.clone().detach(), epoch)
            .map_err(|err| VqVaeError::Summary(Box::new(err)))?;

        let std = ops::std(input.clone().detach()).scalar::<f64>();
        let noise = Tensor::random(input.shape(), Distribution::Normal(0.0, std), &input.device());
        let noise_prediction = self.task.model.forward(noise)?;

        writer
            .add_images(RANDOM_TAG, noise_prediction.reconstruction.detach(), epoch)
            .map_err(|err| VqVaeError::Summary(Box::new(err)))?;

        debug!(epoch, noise_std = std, "summary written");

        Ok(true)
    }
}
