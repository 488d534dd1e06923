use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};
use itertools::{izip, Itertools};

#[derive(Module, Debug)]
pub struct EncoderConvLayer<B: Backend> {
    conv: Conv2d<B>,
    activation: Relu,
}

#[derive(Config)]
pub struct EncoderConvLayerConfig {
    conv_dim_in: usize,
    conv_dim_out: usize,
    conv_kernel: usize,
    conv_stride: usize,
    conv_padding: usize,
}

impl EncoderConvLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderConvLayer<B> {
        EncoderConvLayer {
            conv: Conv2dConfig::new(
                [self.conv_dim_in, self.conv_dim_out],
                [self.conv_kernel, self.conv_kernel],
            )
            .with_stride([self.conv_stride, self.conv_stride])
            .with_padding(PaddingConfig2d::Explicit(self.conv_padding, self.conv_padding))
            .init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> EncoderConvLayer<B> {
    pub fn forward(&self, hidden: Tensor<B, 4>) -> Tensor<B, 4> {
        let hidden = self.conv.forward(hidden);
        self.activation.forward(hidden)
    }
}

#[derive(Config)]
pub struct EncoderConfig {
    #[config(default = "vec![3, 8, 16, 32, 64, 128]")]
    pub conv_dims: Vec<usize>,
    #[config(default = "vec![9, 9, 5, 5, 3]")]
    pub conv_kernels: Vec<usize>,
    #[config(default = "vec![2, 2, 2, 2, 1]")]
    pub conv_strides: Vec<usize>,
    // the stride-1 stage keeps its spatial size
    #[config(default = "vec![0, 0, 0, 0, 1]")]
    pub conv_paddings: Vec<usize>,
    /// Number of layers whose output is taken as the top features.
    #[config(default = 3)]
    pub top_layers: usize,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let dim_windows = self.conv_dims.iter().tuple_windows::<(_, _)>();

        let mut layers = izip!(dim_windows, &self.conv_kernels, &self.conv_strides, &self.conv_paddings)
            .map(|((dim_in, dim_out), kernel, stride, padding)| {
                EncoderConvLayerConfig::new(*dim_in, *dim_out, *kernel, *stride, *padding).init::<B>(device)
            })
            .collect_vec();

        let bottom_layers = layers.split_off(self.top_layers);

        Encoder {
            top_layers: layers,
            bottom_layers,
        }
    }

    pub fn top_dim(&self) -> usize {
        self.conv_dims[self.top_layers]
    }

    pub fn bottom_dim(&self) -> usize {
        self.conv_dims.last().copied().unwrap_or_default()
    }

    /// Spatial size after the top stages and after all stages.
    pub fn output_sizes(&self, [height, width]: [usize; 2]) -> ([usize; 2], [usize; 2]) {
        let stages = izip!(&self.conv_kernels, &self.conv_strides, &self.conv_paddings).collect_vec();
        let (top, bottom) = stages.split_at(self.top_layers);

        let top_size = conv_output_size([height, width], top);
        let bottom_size = conv_output_size(top_size, bottom);

        (top_size, bottom_size)
    }
}

fn conv_output_size(
    [mut height, mut width]: [usize; 2],
    stages: &[(&usize, &usize, &usize)],
) -> [usize; 2] {
    for (kernel, stride, padding) in stages {
        height = conv2d_output_len(height, **kernel, **stride, **padding);
        width = conv2d_output_len(width, **kernel, **stride, **padding);
    }

    [height, width]
}

pub fn conv2d_output_len(len: usize, kernel_size: usize, stride: usize, padding: usize) -> usize {
    ((len + 2 * padding - kernel_size) / stride) + 1
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    top_layers: Vec<EncoderConvLayer<B>>,
    bottom_layers: Vec<EncoderConvLayer<B>>,
}

impl<B: Backend> Encoder<B> {
    /// Returns the (top, bottom) feature maps. Shapes are not checked here.
    pub fn forward(&self, input: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let top = apply_layers(&self.top_layers, input);
        let bottom = apply_layers(&self.bottom_layers, top.clone());

        (top, bottom)
    }
}

fn apply_layers<B: Backend>(layers: &[EncoderConvLayer<B>], mut hidden: Tensor<B, 4>) -> Tensor<B, 4> {
    for layer in layers {
        hidden = layer.forward(hidden);
    }

    hidden
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn test_output_sizes() {
        let config = EncoderConfig::new();

        assert_eq!(config.top_dim(), 32);
        assert_eq!(config.bottom_dim(), 128);
        assert_eq!(config.output_sizes([240, 320]), ([25, 35], [11, 16]));
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let encoder = EncoderConfig::new().init::<TestBackend>(&device);

        let (top, bottom) = encoder.forward(Tensor::zeros([2, 3, 240, 320], &device));

        assert_eq!(top.dims(), [2, 32, 25, 35]);
        assert_eq!(bottom.dims(), [2, 128, 11, 16]);
    }
}
