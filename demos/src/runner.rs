//! Directory runner: every image through every model, one two-panel PNG each.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::prelude::Backend;
use segmatte_burn::{Compositor, Palette, SegmentationModel, Segmenter};
use walkdir::WalkDir;

use crate::common::side_by_side;

/// Entries of `dir`, sorted by file name. Sub-directories are skipped; files
/// are not filtered by extension.
///
/// # Errors
///
/// Fails when the directory cannot be read or holds no files.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry =
            entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if entry.file_type().is_file() {
            images.push(entry.into_path());
        }
    }

    if images.is_empty() {
        anyhow::bail!("No images found in {}", dir.display());
    }
    Ok(images)
}

/// `<output_dir>/<image stem>_<model>.png`
pub fn output_path(output_dir: &Path, image: &Path, model: &str) -> PathBuf {
    let stem = image
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output_dir.join(format!("{stem}_{model}.png"))
}

/// Runs a set of named segmenters over images and saves original | composite
/// panels.
pub struct Runner<B: Backend, M: SegmentationModel<B>> {
    models: Vec<(String, Segmenter<B, M>)>,
    compositor: Compositor<B>,
    output_dir: PathBuf,
    panel_height: Option<u32>,
}

impl<B: Backend, M: SegmentationModel<B>> Runner<B, M> {
    pub fn new(
        models: Vec<(String, Segmenter<B, M>)>,
        compositor: Compositor<B>,
        output_dir: impl Into<PathBuf>,
        panel_height: Option<u32>,
    ) -> Self {
        Self {
            models,
            compositor,
            output_dir: output_dir.into(),
            panel_height,
        }
    }

    /// Process `images` in order, calling `after_image` once each image is
    /// done with every model. Stops at the first failure.
    pub fn run<F>(&self, images: &[PathBuf], mut after_image: F) -> Result<Vec<PathBuf>>
    where
        F: FnMut(&Path) -> Result<()>,
    {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;

        let mut written = Vec::with_capacity(images.len() * self.models.len());
        for image in images {
            written.extend(self.process_image(image)?);
            after_image(image)?;
        }

        tracing::info!(images = images.len(), outputs = written.len(), "run completed");
        Ok(written)
    }

    /// Segment, decode and save one image with every model.
    pub fn process_image(&self, image: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.models.len());

        for (name, segmenter) in &self.models {
            let segmentation = segmenter
                .segment(image)
                .with_context(|| format!("Failed to segment {} with {name}", image.display()))?;

            let classes = segmentation
                .present_classes(self.compositor.palette())?
                .iter()
                .map(|c| format!("{}({})", c.name, c.pixels))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!(model = %name, path = %image.display(), classes = %classes, "classes found");

            let source = segmentation.source.to_rgb8();
            let composite = self
                .compositor
                .decode_image(segmentation.class_map, &segmentation.source)
                .with_context(|| format!("Failed to decode {} with {name}", image.display()))?
                .to_rgb_image()?;

            let panel = side_by_side(&[&source, &composite], self.panel_height);
            let path = output_path(&self.output_dir, image, name);
            panel
                .save(&path)
                .with_context(|| format!("Failed to save {}", path.display()))?;

            tracing::info!(path = %path.display(), "saved result");
            written.push(path);
        }

        Ok(written)
    }

    pub fn palette(&self) -> &Palette {
        self.compositor.palette()
    }
}
