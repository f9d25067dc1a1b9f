use std::sync::Arc;

use rayon::prelude::*;

use crate::config::Config;
use crate::contour::{self, ContourBand};
use crate::cutout::CutoutImage;
use crate::error::Result;
use crate::layers::{layer_depth, LayerSlots, Ticket};
use crate::loader::{ImageLoader, ImageState, PendingImage};
use crate::mask::{apply_mask, MaskParams};
use crate::noise_field;
use crate::raster::BandRasterizer;

/// One paper plane as handed to the scene.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'a> {
    pub index: usize,
    /// Plane offset along the view axis.
    pub depth: f64,
    /// Latest image for this layer. May lag behind while `settled` is false.
    pub image: Option<&'a CutoutImage>,
    pub settled: bool,
}

enum Work {
    Band {
        band: ContourBand,
        rasterizer: BandRasterizer,
    },
    Photo {
        params: MaskParams,
        fallback_size: u32,
    },
}

struct Job {
    ticket: Ticket,
    image: Arc<PendingImage>,
    work: Work,
}

impl Job {
    fn render(&self) -> CutoutImage {
        let state = self.image.state();
        match &self.work {
            Work::Band { band, rasterizer } => {
                let pattern = match &state {
                    ImageState::Ready(image) => Some(image.as_ref()),
                    _ => {
                        log::warn!(
                            "pattern {:?} unavailable, layer {} uses white fill",
                            self.image.key(),
                            self.ticket.layer
                        );
                        None
                    }
                };
                rasterizer.rasterize(band, pattern)
            }
            Work::Photo {
                params,
                fallback_size,
            } => {
                let masked = match &state {
                    ImageState::Ready(photo) => apply_mask(photo, params).map_err(|err| {
                        log::warn!("layer {}: {}", self.ticket.layer, err);
                    }),
                    _ => {
                        log::warn!(
                            "photo {:?} unavailable, layer {} left blank",
                            self.image.key(),
                            self.ticket.layer
                        );
                        Err(())
                    }
                };
                masked.unwrap_or_else(|()| CutoutImage::blank(*fallback_size))
            }
        }
    }
}

pub struct Papercut {
    loader: ImageLoader,
    slots: LayerSlots<CutoutImage>,
    jobs: Vec<Job>,
}

impl Papercut {
    pub fn new(loader: ImageLoader) -> Self {
        Papercut {
            loader,
            slots: LayerSlots::new(),
            jobs: Vec::new(),
        }
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    /// Cuts one layer per contour threshold out of a fresh noise field.
    ///
    /// Without a pattern the layers are committed before this returns. With one, they are
    /// committed by [`pump`](Self::pump) or [`finish`](Self::finish) once the pattern resolves.
    pub fn regenerate(&mut self, config: &Config) -> Result<()> {
        config.validate()?;
        let grid = config.grid_size;
        let field = noise_field::generate(config.seed, grid, grid, config.scale())?;
        let bands = contour::extract(&field, &config.thresholds())?;
        let rasterizer =
            BandRasterizer::new(grid, grid, config.target_size, config.seam_padding)?;
        let tickets = self.slots.begin_cycle(bands.len());

        match &config.pattern {
            None => {
                let images: Vec<CutoutImage> = bands
                    .par_iter()
                    .map(|band| rasterizer.rasterize(band, None))
                    .collect();
                for (ticket, image) in tickets.into_iter().zip(images) {
                    self.slots.commit(ticket, image);
                }
            }
            Some(key) => {
                let pattern = self.loader.request(key);
                for (ticket, band) in tickets.into_iter().zip(bands) {
                    self.jobs.push(Job {
                        ticket,
                        image: Arc::clone(&pattern),
                        work: Work::Band { band, rasterizer },
                    });
                }
                self.pump();
            }
        }
        log::debug!(
            "regenerated {} noise layers (seed={}, pattern={:?})",
            self.slots.len(),
            config.seed,
            config.pattern
        );
        Ok(())
    }

    /// Cuts one layer per mask out of the photo stored under `photo`.
    pub fn regenerate_from_photo(&mut self, photo: &str, config: &Config) -> Result<()> {
        config.validate()?;
        let masks = config.layer_masks();
        let image = self.loader.request(photo);
        let tickets = self.slots.begin_cycle(masks.len());
        for (ticket, params) in tickets.into_iter().zip(masks) {
            self.jobs.push(Job {
                ticket,
                image: Arc::clone(&image),
                work: Work::Photo {
                    params,
                    fallback_size: config.target_size,
                },
            });
        }
        self.pump();
        Ok(())
    }

    /// Re-masks a single photo layer, leaving the others alone.
    pub fn update_photo_layer(
        &mut self,
        photo: &str,
        layer: usize,
        params: MaskParams,
        config: &Config,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&params.cutoff) {
            return Err(crate::error::invalid(format!(
                "mask cutoff {} is outside [0, 1]",
                params.cutoff
            )));
        }
        let ticket = self.slots.begin(layer).ok_or_else(|| {
            crate::error::invalid(format!(
                "layer {} does not exist ({} layers)",
                layer,
                self.slots.len()
            ))
        })?;
        self.jobs.push(Job {
            ticket,
            image: self.loader.request(photo),
            work: Work::Photo {
                params,
                fallback_size: config.target_size,
            },
        });
        self.pump();
        Ok(())
    }

    /// Commits every queued job whose image has resolved and drops jobs made stale by a newer
    /// cycle. Never blocks. Returns the number of layers committed.
    pub fn pump(&mut self) -> usize {
        let slots = &self.slots;
        self.jobs.retain(|job| slots.is_current(job.ticket));
        let (ready, waiting): (Vec<Job>, Vec<Job>) = std::mem::take(&mut self.jobs)
            .into_iter()
            .partition(|job| !job.image.is_pending());
        self.jobs = waiting;

        let rendered: Vec<(Ticket, CutoutImage)> = ready
            .par_iter()
            .map(|job| (job.ticket, job.render()))
            .collect();
        let mut committed = 0;
        for (ticket, image) in rendered {
            if self.slots.commit(ticket, image) {
                committed += 1;
            }
        }
        committed
    }

    /// Blocks until every outstanding job has resolved, then commits them.
    pub fn finish(&mut self) -> usize {
        let slots = &self.slots;
        self.jobs.retain(|job| slots.is_current(job.ticket));
        for job in &self.jobs {
            job.image.wait();
        }
        self.pump()
    }

    pub fn is_settled(&self) -> bool {
        !self.jobs.iter().any(|job| self.slots.is_current(job.ticket))
            && (0..self.slots.len()).all(|i| self.slots.is_settled(i))
    }

    pub fn layers(&self) -> Vec<Layer<'_>> {
        (0..self.slots.len())
            .map(|index| Layer {
                index,
                depth: layer_depth(index),
                image: self.slots.latest(index),
                settled: self.slots.is_settled(index),
            })
            .collect()
    }

    /// Settled layer images, front to back. Empty until the current cycle completes.
    pub fn images(&self) -> Vec<&CutoutImage> {
        if !self.is_settled() {
            return Vec::new();
        }
        (0..self.slots.len())
            .filter_map(|i| self.slots.current(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::{encode_png, gated_loader, open};
    use crate::loader::{MemorySource, DEFAULT_CAPACITY};
    use image::{Rgba, RgbaImage};

    fn small_config() -> Config {
        Config {
            grid_size: 40,
            target_size: 64,
            ..Config::default()
        }
    }

    fn loader_with(entries: &[(&str, RgbaImage)]) -> ImageLoader {
        let mut source = MemorySource::new();
        for (key, image) in entries {
            source.insert(*key, encode_png(image));
        }
        ImageLoader::new(source).unwrap()
    }

    #[test]
    fn test_noise_cycle_is_synchronous() {
        let mut papercut = Papercut::new(loader_with(&[]));
        papercut.regenerate(&small_config()).unwrap();
        assert!(papercut.is_settled());
        let layers = papercut.layers();
        assert_eq!(layers.len(), 5);
        for (i, layer) in layers.iter().enumerate() {
            assert_eq!(layer.index, i);
            assert_eq!(layer.depth, -(i as f64) / 2.0);
            assert!(layer.settled);
            assert_eq!(layer.image.map(|img| img.width()), Some(64));
        }
        assert_eq!(papercut.images().len(), 5);
    }

    #[test]
    fn test_pattern_cycle_commits_after_decode() {
        let green = Rgba([0, 200, 0, 255]);
        let mut papercut = Papercut::new(loader_with(&[(
            "moss.png",
            RgbaImage::from_pixel(8, 8, green),
        )]));
        let config = Config {
            pattern: Some("moss.png".to_owned()),
            ..small_config()
        };
        papercut.regenerate(&config).unwrap();
        papercut.finish();
        assert!(papercut.is_settled());
        let images = papercut.images();
        assert_eq!(images.len(), 5);
        for image in &images {
            assert!(image.as_rgba().pixels().any(|p| *p == green));
            assert!(!image.as_rgba().pixels().any(|p| *p == Rgba([255, 255, 255, 255])));
        }
    }

    #[test]
    fn test_missing_pattern_falls_back_to_white() {
        let mut papercut = Papercut::new(loader_with(&[]));
        let config = Config {
            pattern: Some("missing.png".to_owned()),
            ..small_config()
        };
        papercut.regenerate(&config).unwrap();
        papercut.finish();
        let plain = {
            let mut reference = Papercut::new(loader_with(&[]));
            reference.regenerate(&small_config()).unwrap();
            reference.images().into_iter().cloned().collect::<Vec<_>>()
        };
        let fallback: Vec<CutoutImage> = papercut.images().into_iter().cloned().collect();
        assert_eq!(fallback, plain);
    }

    #[test]
    fn test_newer_cycle_wins() {
        let mut papercut = Papercut::new(loader_with(&[(
            "tile.png",
            RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])),
        )]));
        let patterned = Config {
            pattern: Some("tile.png".to_owned()),
            ..small_config()
        };
        papercut.regenerate(&patterned).unwrap();
        // Supersede it before (or after) the pattern resolves: the plain cycle must win.
        let plain = Config {
            paper_count: 2.0,
            ..small_config()
        };
        papercut.regenerate(&plain).unwrap();
        papercut.finish();
        assert!(papercut.is_settled());
        let images = papercut.images();
        assert_eq!(images.len(), 2);
        for image in &images {
            assert!(!image.as_rgba().pixels().any(|p| *p == Rgba([10, 20, 30, 255])));
        }
    }

    #[test]
    fn test_plain_cycle_does_not_wait_for_slow_pattern() {
        let (loader, _fetches, gate) = gated_loader(DEFAULT_CAPACITY);
        let mut papercut = Papercut::new(loader);
        let patterned = Config {
            pattern: Some("slow.png".to_owned()),
            ..small_config()
        };
        papercut.regenerate(&patterned).unwrap();
        assert!(!papercut.is_settled());
        assert_eq!(papercut.pump(), 0);

        papercut.regenerate(&small_config()).unwrap();
        assert!(papercut.is_settled());
        let plain: Vec<CutoutImage> = papercut.images().into_iter().cloned().collect();

        open(&gate);
        papercut.finish();
        let after: Vec<CutoutImage> = papercut.images().into_iter().cloned().collect();
        assert_eq!(after, plain);
    }

    #[test]
    fn test_photo_layers() {
        let photo = RgbaImage::from_fn(10, 10, |x, _| {
            let v = (x * 25) as u8;
            Rgba([v, v, v, 255])
        });
        let mut papercut = Papercut::new(loader_with(&[("upload", photo)]));
        let config = Config {
            paper_count: 3.0,
            ..small_config()
        };
        papercut.regenerate_from_photo("upload", &config).unwrap();
        papercut.finish();
        let images = papercut.images();
        assert_eq!(images.len(), 3);
        let erased: Vec<usize> = images.iter().map(|i| i.erased_pixels()).collect();
        // Cutoffs 0.25, 0.5, 0.75 erase progressively more of the gradient.
        assert!(erased[0] < erased[1] && erased[1] < erased[2], "{:?}", erased);
        assert_eq!((images[0].width(), images[0].height()), (10, 10));

        papercut
            .update_photo_layer(
                "upload",
                0,
                MaskParams {
                    cutoff: 0.9,
                    ..MaskParams::default()
                },
                &config,
            )
            .unwrap();
        papercut.finish();
        let images = papercut.images();
        assert!(images[0].erased_pixels() > erased[2]);
        assert!(papercut.update_photo_layer("upload", 7, MaskParams::default(), &config).is_err());
    }

    #[test]
    fn test_missing_photo_gives_blank_layers() {
        let mut papercut = Papercut::new(loader_with(&[]));
        papercut
            .regenerate_from_photo("gone", &small_config())
            .unwrap();
        papercut.finish();
        let images = papercut.images();
        assert_eq!(images.len(), 5);
        assert!(images.iter().all(|i| *i == &CutoutImage::blank(64)));
    }
}
