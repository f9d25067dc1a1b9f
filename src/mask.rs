use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::cutout::CutoutImage;
use crate::error::{invalid, Result};
use crate::smooth::smooth;

/// Per-layer masking parameters.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MaskParams {
    /// Luminance and alpha cutoff as a fraction of full scale, in `[0, 1]`.
    pub cutoff: f64,
    /// Keep the dark side of the cutoff instead of the bright side.
    pub inverse: bool,
    /// Paint every pixel pure white, leaving only the alpha shape.
    pub recolor_white: bool,
    /// Run the bilateral smoother over luminance before deciding.
    pub smooth: bool,
}

impl Default for MaskParams {
    fn default() -> Self {
        MaskParams {
            cutoff: 0.5,
            inverse: false,
            recolor_white: false,
            smooth: false,
        }
    }
}

/// Perceptual luminance on the `0..=255` scale.
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.2125 * f64::from(r) + 0.7154 * f64::from(g) + 0.0721 * f64::from(b)
}

/// Builds a cutout with the same dimensions as `source`.
///
/// A pixel is erased (alpha 0) if its own alpha is below the cutoff, or if its luminance is on
/// the cut side: at or below the cutoff normally, above it when `inverse` is set. Surviving
/// pixels keep their alpha. `recolor_white` whitens every pixel and never changes an alpha.
pub fn apply_mask(source: &RgbaImage, params: &MaskParams) -> Result<CutoutImage> {
    if !(0.0..=1.0).contains(&params.cutoff) {
        return Err(invalid(format!(
            "mask cutoff {} is outside [0, 1]",
            params.cutoff
        )));
    }
    let cutoff = 255.0 * params.cutoff;
    let (width, height) = source.dimensions();

    let smoothed = if params.smooth {
        let lum: Vec<f32> = source
            .pixels()
            .map(|&Rgba([r, g, b, _])| luminance(r, g, b) as f32)
            .collect();
        Some(smooth(&lum, width as usize, height as usize)?)
    } else {
        None
    };

    let mut out = source.clone();
    for (i, px) in out.pixels_mut().enumerate() {
        let Rgba([r, g, b, a]) = *px;
        let keep = if f64::from(a) < cutoff {
            false
        } else {
            let lum = match &smoothed {
                Some(lum) => f64::from(lum[i]),
                None => luminance(r, g, b),
            };
            if params.inverse {
                lum <= cutoff
            } else {
                lum > cutoff
            }
        };
        if !keep {
            px.0[3] = 0;
        }
        if params.recolor_white {
            px.0[0] = 255;
            px.0[1] = 255;
            px.0[2] = 255;
        }
    }
    log::debug!(
        "masked {}x{} image at cutoff {} (inverse={}, smooth={})",
        width,
        height,
        params.cutoff,
        params.inverse,
        params.smooth
    );
    Ok(CutoutImage::new(out))
}
