use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

use crate::error::{Result, VqVaeError};
use crate::model::decoder::{Decoded, Decoder, DecoderConfig};
use crate::model::encoder::{Encoder, EncoderConfig};

pub mod decoder;
pub mod encoder;
pub mod quantizer;

/// Channels, height and width every input image must have. Only the batch size is free.
pub const INPUT_SHAPE: [usize; 3] = [3, 240, 320];

#[derive(Config)]
pub struct VqVaeConfig {
    #[config(default = 512)]
    pub codebook_size: usize,
    #[config(default = 0.0)]
    pub ema_decay: f64,
}

impl VqVaeConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<VqVae<B>> {
        let decoder = DecoderConfig::new(self.codebook_size)
            .with_ema_decay(self.ema_decay)
            .init::<B>(device)?;

        Ok(VqVae {
            encoder: EncoderConfig::new().init::<B>(device),
            decoder,
        })
    }
}

#[derive(Module, Debug)]
pub struct VqVae<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

/// Everything a forward pass produces, in the order the loss and summary consume it.
pub struct Prediction<B: Backend> {
    pub reconstruction: Tensor<B, 4>,
    pub top_features: Tensor<B, 4>,
    pub merged_top: Tensor<B, 4>,
    pub top_quantized: Tensor<B, 4>,
    pub bottom_features: Tensor<B, 4>,
    pub bottom_pre_quant: Tensor<B, 4>,
    pub bottom_quantized: Tensor<B, 4>,
    pub top_perplexity: Tensor<B, 1>,
    pub bottom_perplexity: Tensor<B, 1>,
}

pub type PredictionTuple<B> = (
    Tensor<B, 4>,
    Tensor<B, 4>,
    Tensor<B, 4>,
    Tensor<B, 4>,
    Tensor<B, 4>,
    Tensor<B, 4>,
    Tensor<B, 4>,
);

impl<B: Backend> Prediction<B> {
    /// (reconstruction, top_features, merged_top, top_quantized, bottom_features, bottom_pre_quant, bottom_quantized)
    pub fn into_tuple(self) -> PredictionTuple<B> {
        (
            self.reconstruction,
            self.top_features,
            self.merged_top,
            self.top_quantized,
            self.bottom_features,
            self.bottom_pre_quant,
            self.bottom_quantized,
        )
    }
}

pub fn check_input_shape(dims: [usize; 4]) -> Result<()> {
    let [_batch, channels, height, width] = dims;

    if [channels, height, width] != INPUT_SHAPE {
        return Err(VqVaeError::InputShape {
            expected: INPUT_SHAPE,
            actual: dims.to_vec(),
        });
    }

    Ok(())
}

impl<B: Backend> VqVae<B> {
    pub fn encode(&self, input: Tensor<B, 4>) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        check_input_shape(input.dims())?;

        Ok(self.encoder.forward(input))
    }

    pub fn decode(&self, top: Tensor<B, 4>, bottom: Tensor<B, 4>) -> Decoded<B> {
        self.decoder.forward(top, bottom)
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Result<Prediction<B>> {
        check_input_shape(input.dims())?;

        Ok(self.predict(input))
    }

    /// Forward pass for input whose shape has already been checked.
    pub(crate) fn predict(&self, input: Tensor<B, 4>) -> Prediction<B> {
        let (top_features, bottom_features) = self.encoder.forward(input);

        let Decoded {
            reconstruction,
            bottom,
            bottom_quantized,
            merged_top,
            top_quantized,
        } = self.decode(top_features.clone(), bottom_features.clone());

        Prediction {
            reconstruction,
            top_features,
            merged_top,
            top_quantized: top_quantized.codes,
            bottom_features,
            bottom_pre_quant: bottom,
            bottom_quantized: bottom_quantized.codes,
            top_perplexity: top_quantized.perplexity,
            bottom_perplexity: bottom_quantized.perplexity,
        }
    }

    pub fn codebook_size(&self) -> usize {
        self.decoder.codebook_top.num_embeddings()
    }
}
