//! Color-histogram feature vectors from decoded RGB pixels.
//!
//! Image decoding happens upstream; this only bins an already decoded,
//! packed `[r, g, b, r, g, b, ...]` buffer.

use crate::error::{Result, IndexError};
use crate::vector::FeatureVector;

/// Default bins per channel, giving a 4 * 4 * 4 = 64 dimensional histogram.
pub const DEFAULT_BINS_PER_CHANNEL: usize = 4;

/// Joint RGB histogram with `bins_per_channel^3` cells, normalized by pixel count.
///
/// Cell index is `r_bin * b^2 + g_bin * b + b_bin` where each channel bin is
/// `value / (256 / b)`, capped at `b - 1` when `b` does not divide 256.
pub fn color_histogram(rgb: &[u8], bins_per_channel: usize) -> Result<FeatureVector> {
    if bins_per_channel == 0 || bins_per_channel > 256 {
        return Err(IndexError::InvalidConfig(format!(
            "bins per channel must be in 1..=256, got {}",
            bins_per_channel
        )));
    }
    if rgb.len() % 3 != 0 {
        return Err(IndexError::InvalidVector {
            reason: format!("RGB buffer length {} is not a multiple of 3", rgb.len()),
        });
    }

    let bins = bins_per_channel;
    let bin_width = 256 / bins;
    let bin = |value: u8| (value as usize / bin_width).min(bins - 1);

    let mut histogram = vec![0.0f32; bins * bins * bins];
    for pixel in rgb.chunks_exact(3) {
        let index = bin(pixel[0]) * bins * bins + bin(pixel[1]) * bins + bin(pixel[2]);
        histogram[index] += 1.0;
    }

    let pixels = (rgb.len() / 3) as f32;
    if pixels > 0.0 {
        for cell in &mut histogram {
            *cell /= pixels;
        }
    }
    Ok(FeatureVector::new(histogram))
}
