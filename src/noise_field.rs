use noise::{NoiseFn, SuperSimplex};

use crate::error::{invalid, Result};
use crate::rand::noise_seed;

/// A `width × height` grid of samples, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl ScalarField {
    pub fn from_values(width: usize, height: usize, values: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(invalid(format!("field size {}x{} is empty", width, height)));
        }
        if values.len() != width * height {
            return Err(invalid(format!(
                "field of {}x{} needs {} values, got {}",
                width,
                height,
                width * height,
                values.len()
            )));
        }
        Ok(ScalarField {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.width + x]
    }

    /// Returns `(min, max)` over all samples. Fields are never empty, so this always exists.
    pub fn range(&self) -> (f64, f64) {
        self.values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// Samples 2D super-simplex noise at `(x / width * scale, y / height * scale)` for every grid
/// index. Values lie in `[-1, 1]`.
///
/// noise 0.8's 2D `Simplex` is discontinuous across simplex edges and only spans about ±0.37.
///
/// The output depends only on the arguments: `seed` picks the permutation table, so repeated
/// calls (and separate processes) agree bit-for-bit.
pub fn generate(seed: f64, width: usize, height: usize, scale: f64) -> Result<ScalarField> {
    if width == 0 || height == 0 {
        return Err(invalid(format!("grid size {}x{} is empty", width, height)));
    }
    if !scale.is_finite() {
        return Err(invalid(format!("noise scale {} is not finite", scale)));
    }
    let simplex = SuperSimplex::new(noise_seed(seed));
    let mut values = Vec::with_capacity(width * height);
    for y in 0..height {
        let v = y as f64 / height as f64 * scale;
        for x in 0..width {
            let u = x as f64 / width as f64 * scale;
            values.push(simplex.get([u, v]));
        }
    }
    log::debug!(
        "sampled {}x{} noise field (seed={}, scale={})",
        width,
        height,
        seed,
        scale
    );
    ScalarField::from_values(width, height, values)
}
