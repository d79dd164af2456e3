//! Classify one image with a trained weight file
//!
//! ## Usage
//!
//! ```bash
//! # Classify a raw 128x128 RGB8 image (49152 bytes, no header)
//! cargo run --release --bin petal-classify -- --weights flowers.petal rose.rgb
//!
//! # Smoke run with seeded random weights (predictions are meaningless)
//! cargo run --release --bin petal-classify -- --seed 42 rose.rgb
//!
//! # Write the seeded random model out as a weight file
//! cargo run --release --bin petal-classify -- --seed 42 --export random.petal rose.rgb
//!
//! # Trace every stage
//! RUST_LOG=petal=debug cargo run --release --bin petal-classify -- --seed 1 rose.rgb
//! ```
//!
//! A raw RGB8 file can be produced from a PNG with e.g. ImageMagick:
//! `convert rose.png -resize 128x128! rgb:rose.rgb`.

use anyhow::{bail, Context};
use clap::Parser;
use petal::{classify, image, logging, rank, Config, Model};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "petal-classify",
    about = "Label a 128x128 RGB image as daisy, dandelion, roses, sunflowers or tulips"
)]
struct Args {
    /// Raw interleaved RGB8 image, exactly height x width x 3 bytes
    image: PathBuf,

    /// Weight file to load
    #[arg(long, conflicts_with = "seed")]
    weights: Option<PathBuf>,

    /// Use randomly initialised weights with this seed instead of a weight file
    #[arg(long)]
    seed: Option<u64>,

    /// Save the model in use to this path before classifying
    #[arg(long)]
    export: Option<PathBuf>,

    /// Only print the N most likely labels
    #[arg(long)]
    top: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let args = Args::parse();

    let model = match (&args.weights, args.seed) {
        (Some(path), _) => Model::load(path)
            .with_context(|| format!("failed to load weights from {}", path.display()))?,
        (None, Some(seed)) => {
            info!(seed, "using random weights");
            Model::random(Config::default(), seed)?
        }
        (None, None) => bail!("either --weights or --seed is required"),
    };

    if let Some(path) = &args.export {
        model
            .save(path)
            .with_context(|| format!("failed to write weights to {}", path.display()))?;
    }

    let img = image::read_rgb8(&args.image, model.config.input_shape())
        .with_context(|| format!("failed to read image {}", args.image.display()))?;

    let start = Instant::now();
    let probabilities = classify(&model, &img)?;
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "classified");

    let ranked = rank(&probabilities, model.labels())?;
    let shown = args.top.unwrap_or(ranked.len());
    for prediction in ranked.iter().take(shown) {
        println!("{}", prediction);
    }

    Ok(())
}
