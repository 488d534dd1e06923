pub mod gradnorm;
pub mod latent_loss;
pub mod perplexity;

#[cfg(test)]
pub(crate) fn test_metadata() -> burn::train::metric::MetricMetadata {
    use burn::data::dataloader::Progress;

    burn::train::metric::MetricMetadata {
        progress: Progress {
            items_processed: 1,
            items_total: 1,
        },
        epoch: 1,
        epoch_total: 1,
        iteration: 1,
        lr: None,
    }
}
