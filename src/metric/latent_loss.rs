use std::marker::PhantomData;

use burn::prelude::Backend;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};

#[derive(Default)]
pub struct ReconstructionLossMetric<B: Backend> {
    pub state: NumericMetricState,
    _phantom: PhantomData<B>,
}

pub struct ReconstructionLossInput {
    pub value: f32,
}

impl<B: Backend> Metric for ReconstructionLossMetric<B> {
    const NAME: &'static str = "Reconstruction Loss";
    type Input = ReconstructionLossInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.state.update(item.value as f64, 1, FormatOptions::new(Self::NAME).precision(3))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for ReconstructionLossMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// e_top + e_bottom, before the commitment cost is applied.
#[derive(Default)]
pub struct CommitmentLossMetric<B: Backend> {
    pub state: NumericMetricState,
    _phantom: PhantomData<B>,
}

pub struct CommitmentLossInput {
    pub value: f32,
}

impl<B: Backend> Metric for CommitmentLossMetric<B> {
    const NAME: &'static str = "Commitment Loss";
    type Input = CommitmentLossInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.state.update(item.value as f64, 1, FormatOptions::new(Self::NAME).precision(5))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for CommitmentLossMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// q_top + q_bottom.
#[derive(Default)]
pub struct CodebookLossMetric<B: Backend> {
    pub state: NumericMetricState,
    _phantom: PhantomData<B>,
}

pub struct CodebookLossInput {
    pub value: f32,
}

impl<B: Backend> Metric for CodebookLossMetric<B> {
    const NAME: &'static str = "Codebook Loss";
    type Input = CodebookLossInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.state.update(item.value as f64, 1, FormatOptions::new(Self::NAME).precision(5))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for CodebookLossMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
