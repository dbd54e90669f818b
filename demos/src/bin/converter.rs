//! Model Converter
//!
//! Converts a torchvision segmentation checkpoint (`.pth` or `.safetensors`)
//! into a Burn MessagePack record so later runs skip the PyTorch reader.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin converter -- fcn_resnet101 fcn_resnet101.pth fcn_resnet101.mpk
//!
//! # Convert with a configuration file
//! cargo run --bin converter -- deeplab101 in.pth out.mpk --config converter.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use segmatte_burn::{load_net, save_net, SegmentationNetConfig};
use segmatte_demos::{
    common::{create_device, get_backend_name, init_tracing, SelectedBackend},
    ConverterConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model name (e.g. fcn_resnet101, deeplabv3_resnet50, deeplab101)
    model: String,

    /// Input checkpoint path (.pth or .safetensors)
    input: PathBuf,

    /// Output Burn model path (.mpk)
    output: PathBuf,

    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of classes of the checkpoint's classifier
    #[arg(long)]
    num_classes: Option<usize>,

    /// Force overwrite output file
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<ConverterConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        ConverterConfig::default()
    };

    // Apply command line overrides
    let num_classes = args.num_classes.unwrap_or(config.model.num_classes);
    config.model = SegmentationNetConfig::from_name(&args.model)?.with_num_classes(num_classes);
    config.input_path = args.input;
    config.output_path = args.output.with_extension("mpk");

    if !config.input_path.exists() {
        anyhow::bail!(
            "Input model file does not exist: {}",
            config.input_path.display()
        );
    }

    if config.output_path.exists() && !args.force {
        anyhow::bail!(
            "Output file already exists: {}. Use --force to overwrite.",
            config.output_path.display()
        );
    }

    let device = create_device();
    tracing::info!(
        backend = get_backend_name(),
        model = %config.model.name(),
        input = %config.input_path.display(),
        "converting",
    );

    let net = load_net::<SelectedBackend>(&config.model, &config.input_path, &device)?;
    let written = save_net(net, &config.output_path)?;

    tracing::info!(path = %written.display(), "model conversion completed");
    Ok(())
}
