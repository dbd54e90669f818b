//! Class palettes: the fixed table mapping a class index to a display color.

use burn::prelude::*;

use crate::error::{SegMatteError, SegMatteResult};

/// PASCAL VOC colormap, one RGB triple per class.
pub const VOC_COLORS: [[u8; 3]; 21] = [
    [0, 0, 0],       // background
    [128, 0, 0],     // aeroplane
    [0, 128, 0],     // bicycle
    [128, 128, 0],   // bird
    [0, 0, 128],     // boat
    [128, 0, 128],   // bottle
    [0, 128, 128],   // bus
    [128, 128, 128], // car
    [64, 0, 0],      // cat
    [192, 0, 0],     // chair
    [64, 128, 0],    // cow
    [192, 128, 0],   // diningtable
    [64, 0, 128],    // dog
    [192, 0, 128],   // horse
    [64, 128, 128],  // motorbike
    [192, 128, 128], // person
    [0, 64, 0],      // pottedplant
    [128, 64, 0],    // sheep
    [0, 192, 0],     // sofa
    [128, 192, 0],   // train
    [0, 64, 128],    // tvmonitor
];

/// PASCAL VOC class names, index aligned with [`VOC_COLORS`].
pub const VOC_NAMES: [&str; 21] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
];

/// Immutable table of class colors and names.
///
/// Class 0 is treated as background by convention; its color should be black
/// so that it never survives thresholding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
    names: Vec<String>,
}

impl Palette {
    /// Create a palette from explicit colors and names.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the palette is empty or the two
    /// lists differ in length.
    pub fn new(colors: Vec<[u8; 3]>, names: Vec<String>) -> SegMatteResult<Self> {
        if colors.is_empty() {
            return Err(SegMatteError::InvalidConfiguration {
                reason: "palette must contain at least one class".to_string(),
            });
        }
        if colors.len() != names.len() {
            return Err(SegMatteError::InvalidConfiguration {
                reason: format!(
                    "palette has {} colors but {} names",
                    colors.len(),
                    names.len()
                ),
            });
        }

        Ok(Self { colors, names })
    }

    /// The 21-class PASCAL VOC palette.
    pub fn pascal_voc() -> Self {
        Self {
            colors: VOC_COLORS.to_vec(),
            names: VOC_NAMES.iter().map(|name| (*name).to_string()).collect(),
        }
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always false for a constructed palette.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color of `class`, if it is in range.
    pub fn color(&self, class: usize) -> Option<[u8; 3]> {
        self.colors.get(class).copied()
    }

    /// Name of `class`, if it is in range.
    pub fn name(&self, class: usize) -> Option<&str> {
        self.names.get(class).map(String::as_str)
    }

    /// All colors, index ordered.
    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Colors as a float tensor of shape `[num_classes, 3]`.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let flat: Vec<f32> = self
            .colors
            .iter()
            .flat_map(|rgb| rgb.map(f32::from))
            .collect();

        Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([self.len(), 3])
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::pascal_voc()
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn pascal_voc_has_21_named_classes() {
        let palette = Palette::pascal_voc();
        assert_eq!(palette.len(), 21);
        assert_eq!(palette.color(0), Some([0, 0, 0]));
        assert_eq!(palette.color(15), Some([192, 128, 128]));
        assert_eq!(palette.name(15), Some("person"));
        assert_eq!(palette.name(20), Some("tvmonitor"));
        assert_eq!(palette.color(21), None);
    }

    #[test]
    fn pascal_voc_colors_are_distinct() {
        let palette = Palette::pascal_voc();
        for (i, a) in palette.colors().iter().enumerate() {
            for b in &palette.colors()[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn new_rejects_mismatched_lengths() {
        let result = Palette::new(vec![[0, 0, 0], [255, 0, 0]], vec!["bg".to_string()]);
        assert!(matches!(
            result,
            Err(SegMatteError::InvalidConfiguration { .. })
        ));
        assert!(Palette::new(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn to_tensor_matches_colors() {
        let device = Default::default();
        let palette = Palette::pascal_voc();
        let tensor = palette.to_tensor::<TestBackend>(&device);

        assert_eq!(tensor.dims(), [21, 3]);
        let values = tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(&values[9 * 3..9 * 3 + 3], &[192.0, 0.0, 0.0]);
    }
}
