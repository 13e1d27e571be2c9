//! scene_analyze - run the fusion pipeline once on an image file

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use scene_fusion::{config::SceneConfig, FusionPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file to analyze (JPEG or PNG).
    #[arg(long)]
    image: PathBuf,
    /// Override the configured focal length in pixels.
    #[arg(long)]
    focal_length_px: Option<f64>,
    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = SceneConfig::load()?;
    if let Some(focal) = args.focal_length_px {
        config.focal_length_px = focal;
        config.validate()?;
    }
    let mut pipeline = FusionPipeline::from_config(&config)?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let result = pipeline
        .process_encoded(&bytes)
        .with_context(|| format!("failed to analyze {}", args.image.display()))?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
