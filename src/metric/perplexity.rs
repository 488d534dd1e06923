use std::marker::PhantomData;

use burn::prelude::Backend;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};

#[derive(Default)]
pub struct TopPerplexityMetric<B: Backend> {
    pub state: NumericMetricState,
    _phantom: PhantomData<B>,
}

pub struct TopPerplexityInput {
    pub value: f32,
}

impl<B: Backend> Metric for TopPerplexityMetric<B> {
    const NAME: &'static str = "Top Perplexity";
    type Input = TopPerplexityInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.state.update(item.value as f64, 1, FormatOptions::new(Self::NAME).precision(3))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for TopPerplexityMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[derive(Default)]
pub struct BottomPerplexityMetric<B: Backend> {
    pub state: NumericMetricState,
    _phantom: PhantomData<B>,
}

pub struct BottomPerplexityInput {
    pub value: f32,
}

impl<B: Backend> Metric for BottomPerplexityMetric<B> {
    const NAME: &'static str = "Bottom Perplexity";
    type Input = BottomPerplexityInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.state.update(item.value as f64, 1, FormatOptions::new(Self::NAME).precision(3))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for BottomPerplexityMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}
