use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use papercut::config::Config;
use papercut::loader::{FileSource, ImageLoader};
use papercut::mask::MaskParams;
use papercut::papercut::Papercut;

#[derive(Parser)]
struct Opts {
    /// Directory to write layer PNGs into.
    #[clap(short, long, default_value = ".")]
    out_dir: PathBuf,
    /// JSON config file (camelCase keys). Replaces the generation flags when given.
    #[clap(long)]
    config_file: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Cut layers along contours of a noise field.
    Noise {
        #[clap(flatten)]
        config: Config,
    },
    /// Cut layers out of a photo by luminance.
    Photo {
        photo: PathBuf,
        /// Cutoff for each layer, front to back. Defaults to one evenly spaced cutoff per paper.
        #[clap(long)]
        cutoff: Vec<f64>,
        #[clap(long)]
        inverse: bool,
        #[clap(long)]
        recolor_white: bool,
        #[clap(long)]
        smooth: bool,
        #[clap(flatten)]
        config: Config,
    },
}

fn resolve_config(file: Option<&Path>, flags: Config) -> anyhow::Result<Config> {
    match file {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(flags),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let mut papercut = Papercut::new(ImageLoader::new(FileSource::new("."))?);
    let seed = match opts.command {
        Command::Noise { config } => {
            let config = resolve_config(opts.config_file.as_deref(), config)?;
            papercut.regenerate(&config)?;
            config.seed
        }
        Command::Photo {
            photo,
            cutoff,
            inverse,
            recolor_white,
            smooth,
            config,
        } => {
            let mut config = resolve_config(opts.config_file.as_deref(), config)?;
            if !cutoff.is_empty() {
                config.masks = cutoff
                    .into_iter()
                    .map(|cutoff| MaskParams {
                        cutoff,
                        inverse,
                        recolor_white,
                        smooth,
                    })
                    .collect();
            } else if inverse || recolor_white || smooth {
                config.masks = config
                    .layer_masks()
                    .into_iter()
                    .map(|m| MaskParams {
                        inverse,
                        recolor_white,
                        smooth,
                        ..m
                    })
                    .collect();
            }
            let key = photo
                .to_str()
                .with_context(|| format!("Photo path is not UTF-8: {}", photo.display()))?;
            papercut.regenerate_from_photo(key, &config)?;
            config.seed
        }
    };
    papercut.finish();

    std::fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("Failed to create {}", opts.out_dir.display()))?;
    let prefix = format!("0x{}", hex::encode(seed.to_be_bytes()));
    for (index, image) in papercut.images().into_iter().enumerate() {
        let filename = opts
            .out_dir
            .join(format!("{}-layer-{:02}.png", prefix, index));
        image
            .save_png(&filename)
            .with_context(|| format!("Failed to write {}", filename.display()))?;
        eprintln!("wrote png: {}", filename.display());
    }
    Ok(())
}
