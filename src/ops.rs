use burn::prelude::{Backend, ElementConversion, Tensor};
use burn::tensor::Element;

pub fn l2<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, 1> {
    let tensor = tensor.flatten::<1>(0, D - 1);
    let squared = tensor.powi_scalar(2);
    let summed = squared.sum();
    summed.sqrt()
}

/// Unbiased standard deviation over all elements.
pub fn std<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Tensor<B, 1> {
    tensor.flatten::<1>(0, D - 1).var(0).sqrt()
}

pub trait ScalarExt {
    fn scalar<E: Element>(&self) -> E;
}

impl<B: Backend> ScalarExt for Tensor<B, 1> {
    fn scalar<E: Element>(&self) -> E {
        assert_eq!(self.dims()[0], 1);

        self.clone().into_scalar().elem()
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn test_l2() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::from_floats([[3.0, 0.0], [0.0, 4.0]], &device);

        assert!((l2(tensor).scalar::<f32>() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_std() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);

        // sample variance of 1..=4 is 5/3
        let expected = (5.0f32 / 3.0).sqrt();
        assert!((std(tensor).scalar::<f32>() - expected).abs() < 1e-5);

        let zeros = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);
        assert_eq!(std(zeros).scalar::<f32>(), 0.0);
    }
}
