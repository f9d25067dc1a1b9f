use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{invalid, PapercutError, Result};
use crate::mask::MaskParams;
use crate::raster::DEFAULT_SEAM_PADDING;

pub const MAX_LAYERS: usize = 10;

/// Everything one generation cycle needs. Passed by reference into each call and never
/// mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, clap::Args, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Seed for the noise permutation table.
    #[clap(long, default_value_t = 0.42, allow_hyphen_values = true)]
    pub seed: f64,

    /// Noise frequency across the whole grid. Values below 1 are treated as 1.
    #[clap(long, default_value_t = 3.0)]
    pub noise_scale: f64,

    /// Number of paper layers; rounded and clamped to 1..=10.
    #[clap(long, default_value_t = 5.0)]
    pub paper_count: f64,

    /// Shifts every contour threshold down by this amount.
    #[clap(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub random_offset: f64,

    /// Samples per side of the noise grid.
    #[clap(long, default_value_t = 200)]
    pub grid_size: usize,

    /// Pixels per side of each layer image.
    #[clap(long, default_value_t = 2048)]
    pub target_size: u32,

    /// Extra pixels added to the grid-to-pixel scale to hide seams between layers.
    #[clap(long, default_value_t = DEFAULT_SEAM_PADDING)]
    pub seam_padding: f32,

    /// Image to tile across each layer instead of plain white.
    #[clap(long)]
    pub pattern: Option<String>,

    /// Per-layer settings for photo cutouts, front to back.
    #[clap(skip)]
    pub masks: Vec<MaskParams>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: 0.42,
            noise_scale: 3.0,
            paper_count: 5.0,
            random_offset: 0.0,
            grid_size: 200,
            target_size: 2048,
            seam_padding: DEFAULT_SEAM_PADDING,
            pattern: None,
            masks: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| PapercutError::Io {
            key: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("seed", self.seed),
            ("noiseScale", self.noise_scale),
            ("paperCount", self.paper_count),
            ("randomOffset", self.random_offset),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{} must be finite, got {}", name, value)));
            }
        }
        if self.grid_size == 0 {
            return Err(invalid("gridSize must be positive"));
        }
        if self.target_size == 0 {
            return Err(invalid("targetSize must be positive"));
        }
        if !self.seam_padding.is_finite() {
            return Err(invalid("seamPadding must be finite"));
        }
        if self.masks.len() > MAX_LAYERS {
            return Err(invalid(format!(
                "at most {} mask layers, got {}",
                MAX_LAYERS,
                self.masks.len()
            )));
        }
        if let Some(mask) = self
            .masks
            .iter()
            .find(|m| !(0.0..=1.0).contains(&m.cutoff))
        {
            return Err(invalid(format!(
                "mask cutoff {} is outside [0, 1]",
                mask.cutoff
            )));
        }
        Ok(())
    }

    pub fn layer_count(&self) -> usize {
        self.paper_count.round().clamp(1.0, MAX_LAYERS as f64) as usize
    }

    pub fn scale(&self) -> f64 {
        self.noise_scale.max(1.0)
    }

    /// `i / n - random_offset` for each of the `n` layers.
    pub fn thresholds(&self) -> Vec<f64> {
        let n = self.layer_count();
        (0..n)
            .map(|i| i as f64 / n as f64 - self.random_offset)
            .collect()
    }

    /// The mask for each photo layer. Without explicit masks, one layer per paper with cutoffs
    /// spread evenly through `(0, 1)`, darkest first.
    pub fn layer_masks(&self) -> Vec<MaskParams> {
        if !self.masks.is_empty() {
            return self.masks.clone();
        }
        let n = self.layer_count();
        (0..n)
            .map(|i| MaskParams {
                cutoff: (i + 1) as f64 / (n + 1) as f64,
                ..MaskParams::default()
            })
            .collect()
    }
}
