//! Configuration for the SegMatte command line tools.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use segmatte_burn::{MatteConfig, PreprocessConfig, SegmentationNetConfig};
use serde::{Deserialize, Serialize};

/// A network to run: a name that selects the architecture (`fcn101`,
/// `deeplabv3_resnet101`, ...) and the weight file to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model name, also used as the output file suffix.
    pub name: String,
    /// Weight file (`.pth`, `.safetensors`, `.mpk` or `.bin`).
    pub weights: PathBuf,
}

impl ModelSpec {
    /// Network configuration implied by the name.
    pub fn net_config(&self) -> Result<SegmentationNetConfig> {
        SegmentationNetConfig::from_name(&self.name)
            .with_context(|| format!("Invalid model specification '{self}'"))
    }
}

impl FromStr for ModelSpec {
    type Err = String;

    /// Parse `name=path/to/weights`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, weights) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=WEIGHTS, got '{s}'"))?;
        let name = name.trim();
        if name.is_empty() || weights.is_empty() {
            return Err(format!("expected NAME=WEIGHTS, got '{s}'"));
        }

        Ok(Self {
            name: name.to_string(),
            weights: PathBuf::from(weights),
        })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.weights.display())
    }
}

/// Configuration for the `segment` runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Directory whose entries are all treated as images.
    pub input_dir: PathBuf,
    /// Where the two-panel results are written.
    pub output_dir: PathBuf,
    /// Networks to run on every image, in order.
    pub models: Vec<ModelSpec>,
    /// Network input preparation.
    pub preprocess: PreprocessConfig,
    /// Matte and compositing settings.
    pub matte: MatteConfig,
    /// Wait for Enter after every image.
    pub step: bool,
    /// Height of the saved panels. None keeps the tallest panel's height.
    pub panel_height: Option<u32>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("outputs"),
            models: Vec::new(),
            preprocess: PreprocessConfig::new(),
            matte: MatteConfig::new(),
            step: false,
            panel_height: None,
        }
    }
}

impl SegmentConfig {
    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Check everything that can be checked before touching the images.
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("No models configured. Pass at least one --model NAME=WEIGHTS");
        }
        for model in &self.models {
            model.net_config()?;
        }
        self.preprocess.validate()?;
        self.matte.validate()?;
        Ok(())
    }
}

/// Configuration for the `converter` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Input checkpoint (`.pth` or `.safetensors`).
    pub input_path: PathBuf,
    /// Output Burn record (`.mpk`).
    pub output_path: PathBuf,
    /// Network layout of the checkpoint.
    pub model: SegmentationNetConfig,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("models/deeplabv3_resnet101.pth"),
            output_path: PathBuf::from("models/deeplabv3_resnet101.mpk"),
            model: SegmentationNetConfig::new(),
        }
    }
}
