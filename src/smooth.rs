use crate::error::{invalid, Result};

/// Row 12 of Pascal's triangle over its sum, a close approximation of a Gaussian with σ ≈ 1.7.
pub const KERNEL: [f32; 13] = [
    1.0 / 4096.0,
    12.0 / 4096.0,
    66.0 / 4096.0,
    220.0 / 4096.0,
    495.0 / 4096.0,
    792.0 / 4096.0,
    924.0 / 4096.0,
    792.0 / 4096.0,
    495.0 / 4096.0,
    220.0 / 4096.0,
    66.0 / 4096.0,
    12.0 / 4096.0,
    1.0 / 4096.0,
];

const RADIUS: isize = (KERNEL.len() / 2) as isize;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Axis {
    Rows,
    Columns,
}

/// Filters `luminance` (row-major, values in `0..=255`) along rows, then along columns of the
/// result. Samples past the border reuse the nearest edge pixel.
pub fn smooth(luminance: &[f32], width: usize, height: usize) -> Result<Vec<f32>> {
    if luminance.len() != width * height {
        return Err(invalid(format!(
            "luminance buffer of {} values does not match {}x{}",
            luminance.len(),
            width,
            height
        )));
    }
    let rows = pass(luminance, width, height, Axis::Rows);
    Ok(pass(&rows, width, height, Axis::Columns))
}

fn pass(src: &[f32], width: usize, height: usize, axis: Axis) -> Vec<f32> {
    let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;
    let mut out = Vec::with_capacity(src.len());
    for y in 0..height {
        for x in 0..width {
            let center = src[y * width + x];
            let mut sum = 0.0;
            let mut total_weight = 0.0;
            for (k, &spatial) in KERNEL.iter().enumerate() {
                let offset = k as isize - RADIUS;
                let (sx, sy) = match axis {
                    Axis::Rows => (clamp(x as isize + offset, width), y),
                    Axis::Columns => (x, clamp(y as isize + offset, height)),
                };
                let sample = src[sy * width + sx];
                let weight = spatial * (1.0 - (center - sample).abs() / 255.0);
                sum += weight * sample;
                total_weight += weight;
            }
            // The center tap always has full range weight, so the total is positive.
            out.push(sum / total_weight);
        }
    }
    out
}
