//! Weight loading for segmentation networks.
//!
//! torchvision checkpoints (`.pth`/`.pt`, `.safetensors`) are read through
//! burn-import with key remaps that move torchvision's `nn.Sequential`
//! indices onto named fields. Burn's own `.mpk` and `.bin` records load
//! directly.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
#[cfg(feature = "pretrained")]
use burn::record::Recorder;
#[cfg(feature = "pretrained")]
use burn_import::{
    pytorch::{LoadArgs as PyTorchLoadArgs, PyTorchFileRecorder},
    safetensors::{LoadArgs as SafetensorsLoadArgs, SafetensorsFileRecorder},
};

use crate::{
    config::Architecture,
    error::{SegMatteError, SegMatteResult},
    models::{SegmentationNet, SegmentationNetConfig},
};

/// Supported weight file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// PyTorch .pt or .pth files
    PyTorch,
    /// SafeTensors .safetensors files
    SafeTensors,
    /// Burn MessagePack .mpk files
    MessagePack,
    /// Burn binary .bin files
    Binary,
}

impl WeightFormat {
    /// Detect format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedWeightFormat` for unknown or missing extensions.
    pub fn from_path(path: &Path) -> SegMatteResult<Self> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("pt" | "pth") => Ok(Self::PyTorch),
            Some("safetensors") => Ok(Self::SafeTensors),
            Some("mpk") => Ok(Self::MessagePack),
            Some("bin") => Ok(Self::Binary),
            _ => Err(SegMatteError::UnsupportedWeightFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Remaps shared by every network: ResNet stem, layer blocks and shortcuts.
const BACKBONE_REMAPS: [(&str, &str); 5] = [
    (r"^backbone\.conv1\.(.+)", "backbone.stem.conv1.$1"),
    (r"^backbone\.bn1\.(.+)", "backbone.stem.bn1.$1"),
    (
        r"^backbone\.layer([1-4])\.([0-9]+)\.(.+)",
        "backbone.layer$1.blocks.$2.$3",
    ),
    (r"^(.+)\.downsample\.0\.(.+)", "$1.downsample.conv.$2"),
    (r"^(.+)\.downsample\.1\.(.+)", "$1.downsample.bn.$2"),
];

const FCN_REMAPS: [(&str, &str); 3] = [
    (r"^classifier\.0\.(.+)", "classifier.conv.$1"),
    (r"^classifier\.1\.(.+)", "classifier.bn.$1"),
    (r"^classifier\.4\.(.+)", "classifier.out.$1"),
];

// ASPP keys are rewritten first so the plain head indices below no longer
// see `classifier.0.*`.
const DEEPLAB_REMAPS: [(&str, &str); 9] = [
    (
        r"^classifier\.0\.convs\.([0-3])\.0\.(.+)",
        "classifier.aspp.convs.$1.conv.$2",
    ),
    (
        r"^classifier\.0\.convs\.([0-3])\.1\.(.+)",
        "classifier.aspp.convs.$1.bn.$2",
    ),
    (
        r"^classifier\.0\.convs\.4\.1\.(.+)",
        "classifier.aspp.pooling.conv.$1",
    ),
    (
        r"^classifier\.0\.convs\.4\.2\.(.+)",
        "classifier.aspp.pooling.bn.$1",
    ),
    (r"^classifier\.0\.project\.0\.(.+)", "classifier.aspp.project.$1"),
    (
        r"^classifier\.0\.project\.1\.(.+)",
        "classifier.aspp.project_bn.$1",
    ),
    (r"^classifier\.1\.(.+)", "classifier.conv.$1"),
    (r"^classifier\.2\.(.+)", "classifier.bn.$1"),
    (r"^classifier\.4\.(.+)", "classifier.out.$1"),
];

/// Key remaps from a torchvision state dict onto the burn module tree.
///
/// `aux_classifier.*` keys match nothing and are left unused.
pub fn key_remaps(architecture: &Architecture) -> Vec<(&'static str, &'static str)> {
    let head: &[(&str, &str)] = match architecture {
        Architecture::Fcn => &FCN_REMAPS,
        Architecture::DeepLabV3 => &DEEPLAB_REMAPS,
    };
    BACKBONE_REMAPS.iter().chain(head).copied().collect()
}

fn loading_error(path: &Path, e: impl std::fmt::Display) -> SegMatteError {
    SegMatteError::WeightLoading {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Load weights from `path` into `module`, picking the reader by extension.
///
/// `remaps` only apply to PyTorch and safetensors files.
///
/// # Errors
///
/// Returns `UnsupportedWeightFormat` for unknown extensions (or torch
/// formats without the `pretrained` feature) and `WeightLoading` when the
/// file cannot be read into the module.
pub fn load_module<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    remaps: &[(&str, &str)],
    device: &B::Device,
) -> SegMatteResult<M> {
    match WeightFormat::from_path(path)? {
        #[cfg(feature = "pretrained")]
        WeightFormat::PyTorch => {
            let args = remaps
                .iter()
                .fold(PyTorchLoadArgs::new(path.to_path_buf()), |args, (from, to)| {
                    args.with_key_remap(from, to)
                });
            let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load(args, device)
                .map_err(|e| loading_error(path, e))?;
            Ok(module.load_record(record))
        }
        #[cfg(feature = "pretrained")]
        WeightFormat::SafeTensors => {
            let args = remaps.iter().fold(
                SafetensorsLoadArgs::new(path.to_path_buf()),
                |args, (from, to)| args.with_key_remap(from, to),
            );
            let record = SafetensorsFileRecorder::<FullPrecisionSettings>::default()
                .load(args, device)
                .map_err(|e| loading_error(path, e))?;
            Ok(module.load_record(record))
        }
        #[cfg(not(feature = "pretrained"))]
        WeightFormat::PyTorch | WeightFormat::SafeTensors => {
            let _ = remaps;
            Err(SegMatteError::UnsupportedWeightFormat {
                path: path.to_path_buf(),
            })
        }
        WeightFormat::MessagePack => module
            .load_file(
                path,
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
                device,
            )
            .map_err(|e| loading_error(path, e)),
        WeightFormat::Binary => module
            .load_file(path, &BinFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| loading_error(path, e)),
    }
}

/// Build the network described by `config` and load its weights.
///
/// # Errors
///
/// See [`load_module`]; also fails if `config` does not validate.
pub fn load_net<B: Backend>(
    config: &SegmentationNetConfig,
    path: &Path,
    device: &B::Device,
) -> SegMatteResult<SegmentationNet<B>> {
    tracing::info!(
        model = %config.name(),
        path = %path.display(),
        "loading weights",
    );

    let remaps = key_remaps(&config.architecture);
    let net = match config.init::<B>(device)? {
        SegmentationNet::Fcn(net) => {
            SegmentationNet::Fcn(load_module(net, path, &remaps, device)?)
        }
        SegmentationNet::DeepLabV3(net) => {
            SegmentationNet::DeepLabV3(load_module(net, path, &remaps, device)?)
        }
    };

    tracing::info!(model = %config.name(), "weights loaded");
    Ok(net)
}

/// Save `module` as a named MessagePack record. Returns the written path,
/// which always carries the `.mpk` extension.
///
/// # Errors
///
/// Returns `WeightLoading` if the record cannot be written.
pub fn save_mpk<B: Backend, M: Module<B>>(module: M, path: &Path) -> SegMatteResult<PathBuf> {
    let path = path.with_extension("mpk");
    module
        .save_file(&path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| loading_error(&path, e))?;
    Ok(path)
}

/// Save either network as a named MessagePack record.
///
/// # Errors
///
/// See [`save_mpk`].
pub fn save_net<B: Backend>(net: SegmentationNet<B>, path: &Path) -> SegMatteResult<PathBuf> {
    match net {
        SegmentationNet::Fcn(net) => save_mpk(net, path),
        SegmentationNet::DeepLabV3(net) => save_mpk(net, path),
    }
}
