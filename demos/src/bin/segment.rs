//! Directory segmentation runner
//!
//! Runs every image of a directory through each configured network, replaces
//! the background with white, and saves `<stem>_<model>.png` panels showing
//! the original next to the composite.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin segment -- photos --model deeplab101=deeplabv3_resnet101.pth
//!
//! # Wait for Enter between images
//! cargo run --release --bin segment -- photos --model fcn101=fcn_resnet101.pth --step
//!
//! # Settings from a JSON file, CLI flags take precedence
//! cargo run --release --bin segment -- --config segment.json
//! ```

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use segmatte_burn::{load_net, Compositor, Palette, Segmenter};
use segmatte_demos::{
    common::{create_device, get_backend_name, init_tracing, SelectedBackend},
    list_images, ModelSpec, Runner, SegmentConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of input images
    input_dir: Option<PathBuf>,

    /// Network to run, as NAME=WEIGHTS (e.g. fcn101=fcn_resnet101.pth). Repeatable.
    #[arg(short, long = "model")]
    models: Vec<ModelSpec>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wait for Enter after each image
    #[arg(long)]
    step: bool,

    /// Feed the resized image to the network without center cropping
    #[arg(long)]
    no_crop: bool,

    /// Height of the saved panels
    #[arg(long)]
    panel_height: Option<u32>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => SegmentConfig::from_file(path)?,
        None => SegmentConfig::default(),
    };

    // Apply command line overrides
    if let Some(input_dir) = args.input_dir {
        config.input_dir = input_dir;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if !args.models.is_empty() {
        config.models = args.models;
    }
    if args.no_crop {
        config.preprocess.crop = None;
    }
    if args.panel_height.is_some() {
        config.panel_height = args.panel_height;
    }
    config.step |= args.step;

    config.validate()?;
    let images = list_images(&config.input_dir)?;

    let device = create_device();
    tracing::info!(
        backend = get_backend_name(),
        images = images.len(),
        models = config.models.len(),
        "starting",
    );

    let mut models = Vec::with_capacity(config.models.len());
    for spec in &config.models {
        let net = load_net::<SelectedBackend>(&spec.net_config()?, &spec.weights, &device)
            .with_context(|| format!("Failed to load model {spec}"))?;
        let segmenter = Segmenter::new(net, config.preprocess.clone(), &device)?;
        models.push((spec.name.clone(), segmenter));
    }

    let compositor = Compositor::new(Palette::pascal_voc(), config.matte.clone(), &device)?;
    let runner = Runner::new(models, compositor, &config.output_dir, config.panel_height);

    let step = config.step;
    runner.run(&images, |image| {
        if step {
            print!("Done with {}. Press Enter to continue...", image.display());
            std::io::stdout().flush()?;
            std::io::stdin().read_line(&mut String::new())?;
        }
        Ok(())
    })?;

    Ok(())
}
