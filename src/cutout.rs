use std::path::Path;

use image::{Rgba, RgbaImage};
use raqote::DrawTarget;

/// One renderable layer: an RGBA raster with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, PartialEq)]
pub struct CutoutImage(RgbaImage);

impl CutoutImage {
    pub fn new(image: RgbaImage) -> Self {
        CutoutImage(image)
    }

    /// A square, fully opaque white sheet. Used wherever a layer has nothing better to show.
    pub fn blank(size: u32) -> Self {
        CutoutImage(RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255])))
    }

    /// Converts raqote's premultiplied ARGB pixels.
    pub fn from_draw_target(dt: &DrawTarget) -> Self {
        let (width, height) = (dt.width() as u32, dt.height() as u32);
        let mut image = RgbaImage::new(width, height);
        for (px, out) in dt.get_data().iter().zip(image.pixels_mut()) {
            let [b, g, r, a] = px.to_le_bytes();
            *out = Rgba([unpremultiply(r, a), unpremultiply(g, a), unpremultiply(b, a), a]);
        }
        CutoutImage(image)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.0.get_pixel(x, y)
    }

    /// Number of fully erased (alpha 0) pixels.
    pub fn erased_pixels(&self) -> usize {
        self.0.pixels().filter(|p| p.0[3] == 0).count()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.0
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        self.0.save_with_format(path, image::ImageFormat::Png)
    }
}

fn unpremultiply(c: u8, a: u8) -> u8 {
    match a {
        0 => 0,
        255 => c,
        _ => ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8,
    }
}

/// Packs straight RGBA pixels into raqote's premultiplied ARGB words.
pub(crate) fn premultiplied_argb(image: &RgbaImage) -> Vec<u32> {
    image
        .pixels()
        .map(|&Rgba([r, g, b, a])| {
            let pm = |c: u8| ((u32::from(c) * u32::from(a) + 127) / 255) as u8;
            u32::from_le_bytes([pm(b), pm(g), pm(r), a])
        })
        .collect()
}
