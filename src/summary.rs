use std::convert::Infallible;

use burn::prelude::{Backend, ElementConversion, Tensor};

pub const RECONSTRUCTED_TAG: &str = "reconstructed";
pub const RANDOM_TAG: &str = "random";

/// Sink for image batches recorded during training.
pub trait SummaryWriter<B: Backend> {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Record a BxCxHxW batch of images under `tag` at `step`.
    fn add_images(&mut self, tag: &str, images: Tensor<B, 4>, step: usize) -> Result<(), Self::Error>;
}

/// Writes a one-line statistical digest of every image batch to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSummaryWriter;

impl<B: Backend> SummaryWriter<B> for TracingSummaryWriter {
    type Error = Infallible;

    fn add_images(&mut self, tag: &str, images: Tensor<B, 4>, step: usize) -> Result<(), Self::Error> {
        let [batch, channels, height, width] = images.dims();

        let min = images.clone().min().into_scalar().elem::<f32>();
        let max = images.clone().max().into_scalar().elem::<f32>();
        let mean = images.mean().into_scalar().elem::<f32>();

        tracing::info!(tag, step, batch, channels, height, width, min, mean, max, "images");

        Ok(())
    }
}
