use std::marker::PhantomData;

use burn::module::{ModuleVisitor, ParamId};
use burn::prelude::{Backend, Tensor};
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};

use crate::ops::{l2, ScalarExt};

/// Accumulates the squared L2 norm of every parameter gradient.
pub struct GradientNorm<'a, B: AutodiffBackend> {
    pub scale: f32,
    pub grads: &'a B::Gradients,
    pub total_norm: f32,
}

impl<'a, B: AutodiffBackend> GradientNorm<'a, B> {
    pub fn new(grads: &'a B::Gradients, scale: f32) -> Self {
        Self {
            grads,
            scale,
            total_norm: 0.0,
        }
    }
}

impl<'a, B: AutodiffBackend> ModuleVisitor<B> for GradientNorm<'a, B> {
    fn visit_float<const D: usize>(&mut self, _id: &ParamId, tensor: &Tensor<B, D>) {
        if let Some(grads) = tensor.grad(self.grads) {
            let param_norm = l2(grads / self.scale);
            self.total_norm += param_norm.powf_scalar(2.0).scalar::<f32>();
        }
    }
}

#[derive(Default)]
pub struct GradientNormMetric<B: Backend> {
    state: NumericMetricState,
    _phantom: PhantomData<B>,
}

pub struct GradientNormInput {
    pub value: f32,
}

impl<B: Backend> Metric for GradientNormMetric<B> {
    const NAME: &'static str = "Gradient Norm";
    type Input = GradientNormInput;

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        self.state.update(item.value as f64, 1, FormatOptions::new(Self::NAME).precision(3))
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for GradientNormMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};
    use burn::module::{Module, Param};

    use super::*;
    use crate::metric::test_metadata;

    type TestAutodiffBackend = Autodiff<NdArray>;

    #[derive(Module, Debug)]
    struct Scale<B: Backend> {
        weight: Param<Tensor<B, 1>>,
    }

    #[test]
    fn test_gradient_norm() {
        let device = Default::default();
        let module = Scale::<TestAutodiffBackend> {
            weight: Param::from_tensor(Tensor::ones([2], &device)),
        };

        // d/dw sum(w * [3, 4]) = [3, 4]
        let input = Tensor::<TestAutodiffBackend, 1>::from_floats([3.0, 4.0], &device);
        let grads = (module.weight.val() * input).sum().backward();

        let mut norm = GradientNorm::new(&grads, 1.0);
        module.visit(&mut norm);
        assert!((norm.total_norm.sqrt() - 5.0).abs() < 1e-5);

        let mut metric = GradientNormMetric::<TestAutodiffBackend>::default();
        metric.update(&GradientNormInput { value: 5.0 }, &test_metadata());
        assert!((metric.value() - 5.0).abs() < 1e-9);
    }
}
