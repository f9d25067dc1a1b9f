use image::RgbaImage;
use raqote::{
    DrawOptions, DrawTarget, ExtendMode, FilterMode, Path, PathBuilder, SolidSource, Source,
    Transform,
};

use crate::contour::ContourBand;
use crate::cutout::{premultiplied_argb, CutoutImage};
use crate::error::{invalid, Result};

/// Extra pixels added to the grid-to-pixel scale. Adjacent bands sharing a boundary would
/// otherwise leave hairline seams once antialiased.
pub const DEFAULT_SEAM_PADDING: f32 = 5.0;

/// Grid positions are shifted by half a cell so sample centers land on pixel boundaries.
const HALF_CELL: f32 = 0.5;

#[derive(Debug, Copy, Clone)]
pub struct BandRasterizer {
    grid_width: usize,
    grid_height: usize,
    target_size: u32,
    padding: f32,
}

impl BandRasterizer {
    pub fn new(
        grid_width: usize,
        grid_height: usize,
        target_size: u32,
        padding: f32,
    ) -> Result<Self> {
        if grid_width == 0 || grid_height == 0 {
            return Err(invalid(format!(
                "grid size {}x{} is empty",
                grid_width, grid_height
            )));
        }
        if target_size == 0 || target_size > i32::MAX as u32 {
            return Err(invalid(format!("unusable target size {}", target_size)));
        }
        if !padding.is_finite() {
            return Err(invalid(format!("seam padding {} is not finite", padding)));
        }
        Ok(BandRasterizer {
            grid_width,
            grid_height,
            target_size,
            padding,
        })
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Grid space to pixel space.
    pub fn transform(&self) -> Transform {
        let size = self.target_size as f32 + self.padding;
        Transform::translation(-HALF_CELL, -HALF_CELL)
            .then_scale(size / self.grid_width as f32, size / self.grid_height as f32)
    }

    /// Renders one band. With `pattern`, the sheet is filled by repeating the pattern from the
    /// top-left corner instead of solid white.
    pub fn rasterize(&self, band: &ContourBand, pattern: Option<&RgbaImage>) -> CutoutImage {
        let size = self.target_size as i32;
        let mut dt = DrawTarget::new(size, size);
        let (w, h) = (size as f32, size as f32);

        match pattern.filter(|p| p.width() > 0 && p.height() > 0) {
            Some(pattern) => {
                let data = premultiplied_argb(pattern);
                let image = raqote::Image {
                    width: pattern.width() as i32,
                    height: pattern.height() as i32,
                    data: &data,
                };
                let source = Source::Image(
                    image,
                    ExtendMode::Repeat,
                    FilterMode::Nearest,
                    Transform::identity(),
                );
                dt.fill_rect(0.0, 0.0, w, h, &source, &DrawOptions::new());
            }
            None => {
                let white = Source::Solid(SolidSource::from_unpremultiplied_argb(
                    0xff, 0xff, 0xff, 0xff,
                ));
                dt.fill_rect(0.0, 0.0, w, h, &white, &DrawOptions::new());
            }
        }

        if !band.is_empty() {
            let coverage = self.coverage(band);
            for (px, cov) in dt.get_data_mut().iter_mut().zip(coverage.get_data()) {
                *px = erase(*px, (cov >> 24) as u8);
            }
        }
        CutoutImage::from_draw_target(&dt)
    }

    /// Antialiased coverage of the band, in the alpha byte of each pixel.
    fn coverage(&self, band: &ContourBand) -> DrawTarget {
        let size = self.target_size as i32;
        let mut mask = DrawTarget::new(size, size);
        mask.set_transform(&self.transform());
        let ink = Source::Solid(SolidSource::from_unpremultiplied_argb(0xff, 0, 0, 0));
        mask.fill(&band_path(band), &ink, &DrawOptions::new());
        mask
    }
}

/// Scales a premultiplied pixel by `1 - coverage`. Zero coverage leaves it untouched and full
/// coverage clears it.
fn erase(px: u32, coverage: u8) -> u32 {
    let keep = 255 - u32::from(coverage);
    u32::from_le_bytes(
        px.to_le_bytes()
            .map(|c| ((u32::from(c) * keep + 127) / 255) as u8),
    )
}

/// All rings of a band as one non-zero-winding path. Holes wind opposite to their exteriors, so
/// they stay covered.
fn band_path(band: &ContourBand) -> Path {
    let mut pb = PathBuilder::new();
    for ring in band.rings() {
        let mut points = ring.iter();
        if let Some(&(x, y)) = points.next() {
            pb.move_to(x as f32, y as f32);
            for &(x, y) in points {
                pb.line_to(x as f32, y as f32);
            }
            pb.close();
        }
    }
    pb.finish()
}
