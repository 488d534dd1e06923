use std::path::Path;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::wgpu::WgpuDevice;
use burn::backend::{Autodiff, NdArray, Wgpu};
use burn::prelude::Tensor;
use burn::tensor::backend::AutodiffBackend;
use burn::train::TrainStep;
use color_eyre::eyre::{bail, WrapErr};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vqvae2::config::{configure, Properties};
use vqvae2::model::INPUT_SHAPE;
use vqvae2::summary::TracingSummaryWriter;
use vqvae2::task::reconstruct::{ImageBatch, LossOutput};

fn read_properties(path: Option<&str>) -> color_eyre::Result<Properties> {
    let Some(path) = path else {
        return Ok(Properties::new());
    };

    let text = std::fs::read_to_string(Path::new(path)).wrap_err_with(|| format!("reading {path}"))?;
    let properties = serde_json::from_str(&text).wrap_err_with(|| format!("parsing {path}"))?;

    Ok(properties)
}

fn run<B: AutodiffBackend>(properties: &Properties, device: B::Device) -> color_eyre::Result<()> {
    let mut context = configure::<B>(properties, &device)?;

    let [channels, height, width] = INPUT_SHAPE;
    let input = Tensor::<B, 4>::zeros([1, channels, height, width], &device);

    let prediction = context.forward(input.clone())?;
    let loss = context.loss(&prediction, input.clone(), input.clone());
    for (label, value) in LossOutput::<B>::labels().into_iter().zip(loss.scalars()) {
        info!(label, value, "loss");
    }

    let output = TrainStep::step(&context.task, ImageBatch::autoencoding(input.clone())?).item;
    info!(
        gradient_norm = output.gradient_norm,
        top_perplexity = output.top_perplexity,
        bottom_perplexity = output.bottom_perplexity,
        "train step"
    );

    context.summary(0, &mut TracingSummaryWriter, &prediction, input)?;

    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let backend = args.first().map(String::as_str).unwrap_or("ndarray");
    let properties = read_properties(args.get(1).map(String::as_str))?;

    match backend {
        "ndarray" => run::<Autodiff<NdArray>>(&properties, NdArrayDevice::Cpu),
        "wgpu" => run::<Autodiff<Wgpu>>(&properties, WgpuDevice::default()),
        other => bail!("unknown backend `{other}`, expected `ndarray` or `wgpu`"),
    }
}
