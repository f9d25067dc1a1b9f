use std::fs::File;
use std::io::{BufReader, Cursor};

use anyhow::Context;
use hex_literal::hex;
use image::{ImageFormat, Rgba, RgbaImage};

use papercut::config::Config;
use papercut::contour;
use papercut::loader::{ImageLoader, MemorySource};
use papercut::noise_field;
use papercut::papercut::Papercut;

const TARGET_SIZE: u32 = 512;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noise_config() -> Config {
    Config {
        seed: 0.42,
        noise_scale: 3.0,
        paper_count: 5.0,
        grid_size: 200,
        target_size: TARGET_SIZE,
        ..Config::default()
    }
}

fn render(config: &Config) -> anyhow::Result<Vec<RgbaImage>> {
    let mut papercut = Papercut::new(ImageLoader::new(MemorySource::new())?);
    papercut.regenerate(config)?;
    papercut.finish();
    Ok(papercut
        .images()
        .into_iter()
        .map(|image| image.as_rgba().clone())
        .collect())
}

#[test]
fn test_noise_layers_end_to_end() -> anyhow::Result<()> {
    init_logging();
    let config = noise_config();
    assert_eq!(config.thresholds(), vec![0.0, 0.2, 0.4, 0.6, 0.8]);

    let field = noise_field::generate(config.seed, 200, 200, config.scale())?;
    let bands = contour::extract(&field, &config.thresholds())?;
    let images = render(&config)?;
    assert_eq!(images.len(), 5);

    let scale = (TARGET_SIZE as f64 + f64::from(config.seam_padding)) / 200.0;
    let mut previous_erased = usize::MAX;
    for (band, image) in bands.iter().zip(&images) {
        assert_eq!(image.dimensions(), (TARGET_SIZE, TARGET_SIZE));
        assert!(!band.is_empty(), "band at {} is empty", band.threshold);
        let erased = image.pixels().filter(|p| p.0[3] == 0).count();
        assert!(erased > 0, "band at {} erased nothing", band.threshold);
        // Higher thresholds cut smaller holes.
        assert!(erased <= previous_erased);
        previous_erased = erased;

        // Paper clearly below the threshold is untouched, holes and gaps between rings included.
        let mut untouched = 0;
        for (x, y, px) in image.enumerate_pixels() {
            let u = (f64::from(x) + 0.5) / scale;
            let v = (f64::from(y) + 0.5) / scale;
            if bilinear(&field, u, v) < band.threshold - 0.1 {
                assert_eq!(px.0, [255; 4], "band {} at ({}, {})", band.threshold, x, y);
                untouched += 1;
            }
        }
        assert!(untouched > 0, "band at {} covers everything", band.threshold);
    }

    assert_eq!(render(&config)?, images, "rendering is not reproducible");
    Ok(())
}

#[test]
fn test_layers_survive_png_round_trip() -> anyhow::Result<()> {
    init_logging();
    let config = Config {
        grid_size: 60,
        target_size: 128,
        paper_count: 2.0,
        ..noise_config()
    };
    let images = render(&config)?;

    let dir = std::env::temp_dir().join(format!("papercut-layers-{}", std::process::id()));
    std::fs::create_dir_all(&dir).context("Failed to create temp dir")?;
    for (index, image) in images.iter().enumerate() {
        let path = dir.join(format!(
            "0x{}-layer-{:02}.png",
            hex::encode(config.seed.to_be_bytes()),
            index
        ));
        image
            .save_with_format(&path, ImageFormat::Png)
            .context("Failed to write layer PNG")?;

        let reader = BufReader::new(
            File::open(&path).with_context(|| format!("Failed to read {}", path.display()))?,
        );
        let decoded = image::io::Reader::with_format(reader, ImageFormat::Png)
            .decode()
            .context("Failed to decode layer PNG")?
            .into_rgba8();
        assert_eq!(decoded.dimensions(), image.dimensions());
        for ((x, y, actual), expected) in decoded.enumerate_pixels().zip(image.pixels()) {
            assert_px_close((x, y), actual, expected);
        }
    }
    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn test_seed_filename_prefix() {
    assert_eq!(0.42f64.to_be_bytes(), hex!("3fdae147ae147ae1"));
}

#[test]
fn test_photo_layers_from_upload() -> anyhow::Result<()> {
    init_logging();
    // Dark left half, bright right half, with a transparent top row.
    let photo = RgbaImage::from_fn(20, 10, |x, y| match (x, y) {
        (_, 0) => Rgba([255, 255, 255, 0]),
        (x, _) if x < 10 => Rgba([30, 30, 30, 255]),
        _ => Rgba([220, 220, 220, 255]),
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(photo)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)?;
    let mut source = MemorySource::new();
    source.insert("upload.png", bytes);

    let config = Config::from_json(
        r#"{"masks": [{"cutoff": 0.5}, {"cutoff": 0.5, "inverse": true, "recolorWhite": true}]}"#,
    )?;
    let mut papercut = Papercut::new(ImageLoader::new(source)?);
    papercut.regenerate_from_photo("upload.png", &config)?;
    papercut.finish();

    let images = papercut.images();
    assert_eq!(images.len(), 2);
    let (bright, dark) = (images[0], images[1]);
    assert_eq!(bright.pixel(15, 5), Rgba([220, 220, 220, 255]));
    assert_eq!(bright.pixel(5, 5).0[3], 0);
    assert_eq!(dark.pixel(5, 5), Rgba([255, 255, 255, 255]));
    assert_eq!(dark.pixel(15, 5).0[3], 0);
    for x in 0..20 {
        assert_eq!(bright.pixel(x, 0).0[3], 0);
        assert_eq!(dark.pixel(x, 0).0[3], 0);
    }
    Ok(())
}

/// Field value between samples, with `(0, 0)` at the first sample.
fn bilinear(field: &noise_field::ScalarField, u: f64, v: f64) -> f64 {
    let x0 = (u.floor() as usize).min(field.width() - 2);
    let y0 = (v.floor() as usize).min(field.height() - 2);
    let (fx, fy) = (u - x0 as f64, v - y0 as f64);
    let top = field.get(x0, y0) * (1.0 - fx) + field.get(x0 + 1, y0) * fx;
    let bottom = field.get(x0, y0 + 1) * (1.0 - fx) + field.get(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

fn assert_px_close((x, y): (u32, u32), actual: &Rgba<u8>, expected: &Rgba<u8>) {
    const THRESHOLD: u8 = 1;
    let close = actual
        .0
        .iter()
        .zip(expected.0)
        .all(|(a, e)| a.abs_diff(e) <= THRESHOLD);
    if !close {
        panic!(
            "at ({}, {}): expected ~{:?}, got {:?}; max allowed deviation is {}",
            x, y, expected, actual, THRESHOLD
        );
    }
}
