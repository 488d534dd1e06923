use burn::config::Config;
use burn::prelude::Backend;
use serde_json::Value;
use tracing::{info, warn};

use crate::context::TrainingContext;
use crate::error::{Result, VqVaeError};
use crate::model::encoder::EncoderConfig;
use crate::model::VqVaeConfig;
use crate::task::reconstruct::Reconstruct;

/// Free-form options handed over by the training harness. Unknown keys are ignored.
pub type Properties = serde_json::Map<String, Value>;

#[derive(Config)]
pub struct TrainingConfig {
    #[config(default = 512)]
    pub codebook_size: usize,
    /// Accepted but inert: latent widths are fixed by the architecture.
    #[config(default = 128)]
    pub latent_space_dim: usize,
    #[config(default = 0.0)]
    pub ema_decay: f64,
    #[config(default = 1.0)]
    pub commitment_cost: f64,
    #[config(default = 1.0)]
    pub beta: f64,
}

impl TrainingConfig {
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let mut config = Self::new();

        if let Some(value) = properties.get("codebook_size") {
            config.codebook_size = parse_count("codebook_size", value)?;
        }
        if let Some(value) = properties.get("latent_space_dim") {
            config.latent_space_dim = parse_count("latent_space_dim", value)?;
        }
        if let Some(value) = properties.get("ema_decay") {
            config.ema_decay = parse_float("ema_decay", value)?;
        }
        if let Some(value) = properties.get("commitment_cost") {
            config.commitment_cost = parse_float("commitment_cost", value)?;
        }

        match properties.get("beta").map(|value| (value, parse_lenient_float(value))) {
            Some((_, Some(beta))) => config.beta = beta,
            Some((value, None)) => warn!(%value, beta = config.beta, "ignoring unparsable beta"),
            None => {}
        }

        Ok(config)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<TrainingContext<B>> {
        let model_config = VqVaeConfig::new()
            .with_codebook_size(self.codebook_size)
            .with_ema_decay(self.ema_decay);

        let bottom_dim = EncoderConfig::new().bottom_dim();
        if self.latent_space_dim != bottom_dim {
            warn!(
                latent_space_dim = self.latent_space_dim,
                bottom_dim, "latent_space_dim has no effect, latent widths are fixed"
            );
        }

        let model = model_config.init::<B>(device)?;

        info!(
            "Latent space is 1x{}, codebook has {} entries.",
            self.latent_space_dim, self.codebook_size
        );
        info!(commitment_cost = self.commitment_cost, beta = self.beta, "loss weights");

        Ok(TrainingContext::new(
            Reconstruct::new(model, self.commitment_cost as f32),
            self.beta,
        ))
    }
}

/// Builds the training context described by `properties`, falling back to defaults for absent keys.
pub fn configure<B: Backend>(properties: &Properties, device: &B::Device) -> Result<TrainingContext<B>> {
    TrainingConfig::from_properties(properties)?.init(device)
}

fn parse_count(key: &'static str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| VqVaeError::InvalidProperty {
            key,
            reason: format!("expected a non-negative integer, got {value}"),
        })
}

fn parse_float(key: &'static str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| VqVaeError::InvalidProperty {
        key,
        reason: format!("expected a number, got {value}"),
    })
}

fn parse_lenient_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
