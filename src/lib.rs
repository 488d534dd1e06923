pub mod config;
pub mod context;
pub mod error;
pub mod metric;
pub mod model;
pub mod ops;
pub mod summary;
pub mod task;

pub use config::{configure, Properties, TrainingConfig};
pub use context::TrainingContext;
pub use error::{Result, VqVaeError};
pub use model::{Prediction, VqVae, VqVaeConfig};
