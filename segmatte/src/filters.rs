//! Separable Gaussian filtering of image tensors.
//!
//! Kernels follow the common imaging-library convention: with no explicit
//! sigma, odd sizes up to 7 use fixed binomial tables and larger sizes derive
//! `sigma = 0.3 * ((size - 1) * 0.5 - 1) + 0.8`. Borders are reflected without
//! repeating the edge pixel (`gfedcb|abcdefgh|gfedcba`).

use burn::tensor::{
    backend::Backend, module::conv2d, ops::ConvOptions, Int, Tensor, TensorData,
};

use crate::error::{SegMatteError, SegMatteResult};

const SMALL_GAUSSIAN_TABLES: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// Sigma implied by a kernel size when none is given.
pub fn default_sigma(size: usize) -> f64 {
    0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian kernel.
///
/// # Errors
///
/// Returns `InvalidConfiguration` if `size` is zero or even.
pub fn gaussian_kernel_1d(size: usize, sigma: Option<f64>) -> SegMatteResult<Vec<f32>> {
    if size == 0 || size % 2 == 0 {
        return Err(SegMatteError::InvalidConfiguration {
            reason: format!("Gaussian kernel size must be odd and positive, got {size}"),
        });
    }

    if sigma.is_none() && size <= 7 {
        return Ok(SMALL_GAUSSIAN_TABLES[size / 2].to_vec());
    }

    let sigma = sigma.unwrap_or_else(|| default_sigma(size));
    let center = (size - 1) as f64 / 2.0;
    let two_sigma_squared = 2.0 * sigma * sigma;

    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (-(x * x) / two_sigma_squared).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

/// Source index for every position of a line of `len` samples padded by
/// `pad` on both sides, reflecting at the borders without repeating the edge.
pub fn reflect_101_indices(len: usize, pad: usize) -> Vec<i64> {
    if len == 0 {
        return Vec::new();
    }
    let len = len as i64;
    let pad = pad as i64;

    (-pad..len + pad)
        .map(|mut p| {
            if len == 1 {
                return 0;
            }
            while p < 0 || p >= len {
                p = if p < 0 { -p } else { 2 * len - p - 2 };
            }
            p
        })
        .collect()
}

pub(crate) fn index_tensor<B: Backend>(indices: Vec<i64>, device: &B::Device) -> Tensor<B, 1, Int> {
    let len = indices.len();
    Tensor::from_data(
        TensorData::new(indices, [len]).convert::<B::IntElem>(),
        device,
    )
}

/// Blur every channel of a `[C, H, W]` tensor with the separable `kernel`.
///
/// The output has the input's shape.
pub fn gaussian_blur<B: Backend>(image: Tensor<B, 3>, kernel: &[f32]) -> Tensor<B, 3> {
    let [channels, height, width] = image.dims();
    let size = kernel.len();
    if size <= 1 || height == 0 || width == 0 {
        return image;
    }

    let device = image.device();
    let pad = size / 2;
    let options = || ConvOptions::new([1, 1], [0, 0], [1, 1], 1);

    // Channels become the batch so a single-channel kernel covers them all.
    let x = image.reshape([channels, 1, height, width]);

    let horizontal = Tensor::<B, 1>::from_floats(kernel, &device).reshape([1, 1, 1, size]);
    let x = x.select(3, index_tensor::<B>(reflect_101_indices(width, pad), &device));
    let x = conv2d(x, horizontal, None, options());

    let vertical = Tensor::<B, 1>::from_floats(kernel, &device).reshape([1, 1, size, 1]);
    let x = x.select(2, index_tensor::<B>(reflect_101_indices(height, pad), &device));
    let x = conv2d(x, vertical, None, options());

    x.reshape([channels, height, width])
}
