use thiserror::Error;

#[derive(Debug, Error)]
pub enum VqVaeError {
    #[error("input must be [batch, {expected:?}], got {actual:?}")]
    InputShape { expected: [usize; 3], actual: Vec<usize> },

    #[error("targets have shape {targets:?} but images have shape {images:?}")]
    TargetShape { images: [usize; 4], targets: [usize; 4] },

    #[error("EMA codebook updates are not supported (ema_decay = {decay})")]
    EmaUnsupported { decay: f64 },

    #[error("codebook must have at least one entry")]
    EmptyCodebook,

    #[error("invalid value for `{key}`: {reason}")]
    InvalidProperty { key: &'static str, reason: String },

    #[error("transposed convolution cannot map {input} to {target} (kernel {kernel}, stride {stride}, padding {padding})")]
    OutputShape {
        input: usize,
        target: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
    },

    #[error("summary writer failed: {0}")]
    Summary(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = VqVaeError> = std::result::Result<T, E>;
