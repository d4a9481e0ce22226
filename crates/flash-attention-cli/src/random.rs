//! Seeded random inputs for the bench and check commands.

use flash_attention::{Element, Tensor};
use rand::Rng;
use rand_distr::StandardNormal;

/// Row-major tensor of standard-normal samples.
pub fn normal_tensor<T: Element, R: Rng>(
    rng: &mut R,
    shape: &[usize],
) -> flash_attention::Result<Tensor<T>> {
    Tensor::from_fn(shape, |_| T::from_f64_lossy(rng.sample::<f64, _>(StandardNormal)))
}
