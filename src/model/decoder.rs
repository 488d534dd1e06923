use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::Relu;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::sigmoid;

use crate::error::{Result, VqVaeError};
use crate::model::quantizer::{Quantized, VectorQuantizer, VectorQuantizerConfig};

#[derive(Config)]
pub struct DecoderConvLayerConfig {
    pub conv_dim_in: usize,
    pub conv_dim_out: usize,
    pub conv_kernel: usize,
    pub conv_stride: usize,
    pub conv_padding: usize,
    pub input_size: [usize; 2],
    /// Spatial size this stage must produce.
    pub output_size: [usize; 2],
}

impl DecoderConvLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<DecoderConvLayer<B>> {
        Ok(DecoderConvLayer {
            conv: self.init_conv::<B>(device)?,
            activation: Relu::new(),
        })
    }

    fn init_conv<B: Backend>(&self, device: &B::Device) -> Result<ConvTranspose2d<B>> {
        let [in_height, in_width] = self.input_size;
        let [out_height, out_width] = self.output_size;

        let padding_out = [
            self.output_padding(in_height, out_height)?,
            self.output_padding(in_width, out_width)?,
        ];

        Ok(ConvTranspose2dConfig::new(
            [self.conv_dim_in, self.conv_dim_out],
            [self.conv_kernel, self.conv_kernel],
        )
        .with_stride([self.conv_stride, self.conv_stride])
        .with_padding([self.conv_padding, self.conv_padding])
        .with_padding_out(padding_out)
        .init(device))
    }

    fn output_padding(&self, input: usize, target: usize) -> Result<usize> {
        conv_transpose2d_output_padding(
            input,
            target,
            self.conv_kernel,
            self.conv_stride,
            self.conv_padding,
        )
    }
}

/// Output padding that makes a transposed convolution produce exactly `target`.
pub fn conv_transpose2d_output_padding(
    input: usize,
    target: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Result<usize> {
    let error = || VqVaeError::OutputShape {
        input,
        target,
        kernel: kernel_size,
        stride,
        padding,
    };

    let min_len = input
        .checked_sub(1)
        .map(|len| len * stride + kernel_size)
        .and_then(|len| len.checked_sub(2 * padding))
        .ok_or_else(error)?;

    match target.checked_sub(min_len) {
        Some(padding_out) if padding_out < stride.max(1) => Ok(padding_out),
        _ => Err(error()),
    }
}

#[derive(Module, Debug)]
pub struct DecoderConvLayer<B: Backend> {
    conv: ConvTranspose2d<B>,
    activation: Relu,
}

impl<B: Backend> DecoderConvLayer<B> {
    pub fn forward(&self, hidden: Tensor<B, 4>) -> Tensor<B, 4> {
        let hidden = self.conv.forward(hidden);
        self.activation.forward(hidden)
    }
}

fn bottom_stages() -> Vec<DecoderConvLayerConfig> {
    vec![
        DecoderConvLayerConfig::new(128, 64, 3, 1, 1, [11, 16], [11, 16]),
        DecoderConvLayerConfig::new(64, 32, 5, 2, 0, [11, 16], [25, 35]),
    ]
}

fn top_stages() -> Vec<DecoderConvLayerConfig> {
    vec![
        DecoderConvLayerConfig::new(32, 16, 5, 2, 0, [25, 35], [54, 74]),
        DecoderConvLayerConfig::new(16, 8, 9, 2, 0, [54, 74], [116, 156]),
    ]
}

fn output_stage() -> DecoderConvLayerConfig {
    DecoderConvLayerConfig::new(8, 3, 9, 2, 0, [116, 156], [240, 320])
}

#[derive(Config)]
pub struct DecoderConfig {
    pub codebook_size: usize,
    #[config(default = 0.0)]
    pub ema_decay: f64,
    #[config(default = "bottom_stages()")]
    pub bottom_stages: Vec<DecoderConvLayerConfig>,
    #[config(default = "top_stages()")]
    pub top_stages: Vec<DecoderConvLayerConfig>,
    #[config(default = "output_stage()")]
    pub output_stage: DecoderConvLayerConfig,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Decoder<B>> {
        let bottom_dim = self.bottom_stages.first().map_or(0, |stage| stage.conv_dim_in);
        let (top_dim, top_size) = self
            .bottom_stages
            .last()
            .map_or((0, [0, 0]), |stage| (stage.conv_dim_out, stage.output_size));

        let quantizer = |dim| {
            VectorQuantizerConfig::new(self.codebook_size, dim)
                .with_decay(self.ema_decay)
                .init::<B>(device)
        };

        let projection = DecoderConvLayerConfig::new(top_dim, top_dim, 1, 1, 0, top_size, top_size);

        Ok(Decoder {
            codebook_bottom: quantizer(bottom_dim)?,
            codebook_top: quantizer(top_dim)?,
            bottom_layers: self
                .bottom_stages
                .iter()
                .map(|stage| stage.init::<B>(device))
                .collect::<Result<_>>()?,
            project_top: projection.init_conv::<B>(device)?,
            project_z: projection.init_conv::<B>(device)?,
            top_layers: self
                .top_stages
                .iter()
                .map(|stage| stage.init::<B>(device))
                .collect::<Result<_>>()?,
            output: self.output_stage.init_conv::<B>(device)?,
        })
    }
}

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub codebook_bottom: VectorQuantizer<B>,
    pub codebook_top: VectorQuantizer<B>,
    bottom_layers: Vec<DecoderConvLayer<B>>,
    project_top: ConvTranspose2d<B>,
    project_z: ConvTranspose2d<B>,
    top_layers: Vec<DecoderConvLayer<B>>,
    output: ConvTranspose2d<B>,
}

pub struct Decoded<B: Backend> {
    pub reconstruction: Tensor<B, 4>,
    /// Bottom features as they entered the bottom quantizer.
    pub bottom: Tensor<B, 4>,
    pub bottom_quantized: Quantized<B>,
    /// Upsampled bottom latents plus projected top features, before quantization.
    pub merged_top: Tensor<B, 4>,
    pub top_quantized: Quantized<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn forward(&self, top: Tensor<B, 4>, bottom: Tensor<B, 4>) -> Decoded<B> {
        let bottom_quantized = self.codebook_bottom.forward(bottom.clone());

        let z = apply_layers(&self.bottom_layers, bottom_quantized.straight_through.clone());

        let merged_top = z.clone() + self.project_top.forward(top);
        let top_quantized = self.codebook_top.forward(merged_top.clone());

        let hidden = top_quantized.straight_through.clone() + self.project_z.forward(z);
        let hidden = apply_layers(&self.top_layers, hidden);
        let reconstruction = sigmoid(self.output.forward(hidden));

        Decoded {
            reconstruction,
            bottom,
            bottom_quantized,
            merged_top,
            top_quantized,
        }
    }
}

fn apply_layers<B: Backend>(layers: &[DecoderConvLayer<B>], mut hidden: Tensor<B, 4>) -> Tensor<B, 4> {
    for layer in layers {
        hidden = layer.forward(hidden);
    }

    hidden
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn test_output_padding() {
        // 3x3, stride 1, same padding
        assert_eq!(conv_transpose2d_output_padding(11, 11, 3, 1, 1).unwrap(), 0);
        assert_eq!(conv_transpose2d_output_padding(11, 25, 5, 2, 0).unwrap(), 0);
        assert_eq!(conv_transpose2d_output_padding(35, 74, 5, 2, 0).unwrap(), 1);
        assert_eq!(conv_transpose2d_output_padding(156, 320, 9, 2, 0).unwrap(), 1);
    }

    #[test]
    fn test_output_padding_unreachable() {
        assert!(matches!(
            conv_transpose2d_output_padding(11, 11, 3, 1, 0),
            Err(VqVaeError::OutputShape { .. })
        ));
        assert!(conv_transpose2d_output_padding(25, 56, 5, 2, 0).is_err());
        assert!(conv_transpose2d_output_padding(0, 4, 3, 1, 0).is_err());
    }

    #[test]
    fn test_stage_shapes() {
        let device = Default::default();
        let config = DecoderConfig::new(16);

        let stages = config
            .bottom_stages
            .iter()
            .chain(&config.top_stages)
            .chain([&config.output_stage]);

        for stage in stages {
            let layer = stage.init::<TestBackend>(&device).unwrap();
            let [height, width] = stage.input_size;
            let input = Tensor::zeros([1, stage.conv_dim_in, height, width], &device);

            let [_, channels, out_height, out_width] = layer.forward(input).dims();
            assert_eq!(channels, stage.conv_dim_out);
            assert_eq!([out_height, out_width], stage.output_size);
        }
    }

    #[test]
    fn test_decode_shapes() {
        TestBackend::seed(0);
        let device = Default::default();
        let decoder = DecoderConfig::new(16).init::<TestBackend>(&device).unwrap();

        let top = Tensor::random([2, 32, 25, 35], Distribution::Default, &device);
        let bottom = Tensor::random([2, 128, 11, 16], Distribution::Default, &device);

        let decoded = decoder.forward(top, bottom);

        assert_eq!(decoded.reconstruction.dims(), [2, 3, 240, 320]);
        assert_eq!(decoded.bottom.dims(), [2, 128, 11, 16]);
        assert_eq!(decoded.bottom_quantized.codes.dims(), [2, 128, 11, 16]);
        assert_eq!(decoded.merged_top.dims(), [2, 32, 25, 35]);
        assert_eq!(decoded.top_quantized.codes.dims(), [2, 32, 25, 35]);
    }
}
