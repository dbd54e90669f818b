#[cfg(test)]
mod tests {
    use burn::config::Config;

    use crate::config::{MatteConfig, MatteMode, PreprocessConfig, ResizeFilter};
    use crate::error::SegMatteError;
    use crate::models::{ResNetDepth, SegmentationNetConfig};
    use crate::Architecture;

    #[test]
    fn test_default_matte_configuration() {
        let config = MatteConfig::new();

        assert_eq!(config.threshold, 0);
        assert_eq!(config.blur_kernel_size, 7);
        assert_eq!(config.blur_sigma, None);
        assert_eq!(config.mode, MatteMode::PerChannel);
        assert_eq!(config.background, [255, 255, 255]);
        assert_eq!(config.source_filter, ResizeFilter::Triangle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_even_blur_kernel() {
        let config = MatteConfig::new().with_blur_kernel_size(6);

        match config.validate() {
            Err(SegMatteError::InvalidConfiguration { reason }) => {
                assert!(reason.contains("odd"));
            }
            _ => panic!("Expected InvalidConfiguration error"),
        }
    }

    #[test]
    fn test_non_positive_sigma() {
        for sigma in [0.0, -1.0, f64::NAN] {
            let config = MatteConfig::new().with_blur_sigma(Some(sigma));
            assert!(config.validate().is_err(), "sigma {sigma} accepted");
        }
        assert!(MatteConfig::new()
            .with_blur_kernel_size(11)
            .with_blur_sigma(Some(2.5))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_default_preprocess_configuration() {
        let config = PreprocessConfig::new();

        assert_eq!(config.resize, Some(256));
        assert_eq!(config.crop, Some(224));
        assert_eq!(config.mean, [0.485, 0.456, 0.406]);
        assert_eq!(config.std, [0.229, 0.224, 0.225]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_preprocess_configuration() {
        assert!(PreprocessConfig::new()
            .with_resize(Some(0))
            .validate()
            .is_err());
        assert!(PreprocessConfig::new()
            .with_std([0.2, 0.0, 0.2])
            .validate()
            .is_err());
        assert!(PreprocessConfig::new()
            .with_resize(None)
            .with_crop(None)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_configs_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();

        let matte = MatteConfig::new()
            .with_mode(MatteMode::Foreground)
            .with_blur_sigma(Some(1.5));
        let matte_path = dir.path().join("matte.json");
        matte.save(&matte_path).unwrap();
        let loaded = MatteConfig::load(&matte_path).unwrap();
        assert_eq!(loaded.mode, MatteMode::Foreground);
        assert_eq!(loaded.blur_sigma, Some(1.5));

        let net = SegmentationNetConfig::new()
            .with_architecture(Architecture::Fcn)
            .with_depth(ResNetDepth::ResNet50);
        let net_path = dir.path().join("net.json");
        net.save(&net_path).unwrap();
        let loaded = SegmentationNetConfig::load(&net_path).unwrap();
        assert_eq!(loaded.name(), "fcn_resnet50");
        assert_eq!(loaded.num_classes, 21);
    }
}
