//! Crop planning and resizing
//!
//! Every output image has exactly the configured target size. Crop windows are
//! derived only from the source dimensions and the [`TransformSpec`], so the same
//! input always yields the same windows.

use crate::{
    config::{CropStrategy, TransformSpec},
    error::{DatasetError, Result},
    services::{ImageIOService, OutputFormatHandler},
};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::path::Path;

/// Resampling filter used for every resize
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Region of the source image that becomes one dataset image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Set only when the strategy yields more than one window
    pub crop_index: Option<usize>,
}

/// A transformed image, encoded and ready to be packaged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub crop_index: Option<usize>,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Applies a [`TransformSpec`] to decoded images
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    spec: TransformSpec,
}

impl ImageTransformer {
    /// Create a transformer, validating the spec
    ///
    /// # Errors
    /// Returns `DatasetError::InvalidConfig` for an invalid spec.
    pub fn new(spec: TransformSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    #[must_use]
    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    /// File extension of the produced images
    #[must_use]
    pub fn extension(&self) -> &'static str {
        OutputFormatHandler::get_extension(self.spec.output_format)
    }

    /// Largest window centred in the source with the target's aspect ratio
    fn base_window(&self, width: u32, height: u32) -> (u32, u32) {
        let (target_width, target_height) = self.spec.target_size;
        let (w, h) = (u64::from(width), u64::from(height));
        let (tw, th) = (u64::from(target_width), u64::from(target_height));

        if w * th >= h * tw {
            // Source is wider than the target: full height
            let base = (h * tw + th / 2) / th;
            (base.clamp(1, w) as u32, height)
        } else {
            let base = (w * th + tw / 2) / tw;
            (width, base.clamp(1, h) as u32)
        }
    }

    /// Plan the crop windows for a source of the given dimensions
    #[must_use]
    pub fn plan_windows(&self, width: u32, height: u32) -> Vec<CropWindow> {
        let (base_width, base_height) = self.base_window(width, height);

        let scales: Vec<f32> = match &self.spec.crop_strategy {
            CropStrategy::Center => vec![1.0],
            CropStrategy::MultiResolution { scales } => scales.clone(),
        };
        let indexed = scales.len() > 1;

        scales
            .iter()
            .enumerate()
            .map(|(index, scale)| {
                let scaled = |size: u32, limit: u32| {
                    let size = (f64::from(size) * f64::from(*scale)).round() as u32;
                    size.clamp(1, limit)
                };
                let crop_width = scaled(base_width, width);
                let crop_height = scaled(base_height, height);
                CropWindow {
                    x: (width - crop_width) / 2,
                    y: (height - crop_height) / 2,
                    width: crop_width,
                    height: crop_height,
                    crop_index: indexed.then_some(index),
                }
            })
            .collect()
    }

    /// Crop and resize an image into one image per planned window
    ///
    /// The pixel layout is unified for the output format before cropping.
    #[must_use]
    pub fn transform(&self, image: DynamicImage) -> Vec<(Option<usize>, DynamicImage)> {
        let (width, height) = image.dimensions();
        let (target_width, target_height) = self.spec.target_size;
        let unified = OutputFormatHandler::convert_format(image, self.spec.output_format);

        self.plan_windows(width, height)
            .into_iter()
            .map(|window| {
                let resized = unified
                    .crop_imm(window.x, window.y, window.width, window.height)
                    .resize_exact(target_width, target_height, RESIZE_FILTER);
                (window.crop_index, resized)
            })
            .collect()
    }

    /// Transform and encode a decoded image
    ///
    /// # Errors
    /// - `DatasetError::ImageUnreadable` for an image without pixels
    /// - `DatasetError::UnsupportedFormat` when encoding fails
    pub fn process(&self, image: DynamicImage, source: &Path) -> Result<Vec<EncodedImage>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DatasetError::image_unreadable(source, "image has no pixels"));
        }

        self.transform(image)
            .into_iter()
            .map(|(crop_index, image)| {
                let bytes = ImageIOService::encode_image(
                    &image,
                    self.spec.output_format,
                    self.spec.jpeg_quality,
                    source,
                )?;
                Ok(EncodedImage {
                    crop_index,
                    width: image.width(),
                    height: image.height(),
                    bytes,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use image::{Rgb, RgbImage};

    fn transformer(size: (u32, u32), strategy: CropStrategy) -> ImageTransformer {
        ImageTransformer::new(TransformSpec {
            target_size: size,
            crop_strategy: strategy,
            ..TransformSpec::default()
        })
        .unwrap()
    }

    #[test]
    fn test_center_window_is_largest_centred_square() {
        let t = transformer((512, 512), CropStrategy::Center);
        assert_eq!(
            t.plan_windows(300, 200),
            vec![CropWindow {
                x: 50,
                y: 0,
                width: 200,
                height: 200,
                crop_index: None
            }]
        );
        assert_eq!(t.plan_windows(100, 400)[0].y, 150);
    }

    #[test]
    fn test_window_matches_target_aspect() {
        let t = transformer((64, 32), CropStrategy::Center);
        let window = t.plan_windows(300, 100)[0];
        assert_eq!((window.x, window.width, window.height), (50, 200, 100));

        let window = t.plan_windows(100, 300)[0];
        assert_eq!((window.y, window.width, window.height), (125, 100, 50));
    }

    #[test]
    fn test_multi_resolution_windows() {
        let t = transformer(
            (32, 32),
            CropStrategy::MultiResolution {
                scales: vec![1.0, 0.5, 0.5],
            },
        );
        let windows = t.plan_windows(400, 200);
        assert_eq!(windows.len(), 3);
        assert_eq!(
            windows.iter().map(|w| w.crop_index).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );
        assert_eq!((windows[0].width, windows[0].x), (200, 100));
        assert_eq!((windows[1].width, windows[1].height), (100, 100));
        assert_eq!((windows[1].x, windows[1].y), (150, 50));
        assert_eq!(windows[1], CropWindow { crop_index: Some(2), ..windows[2] });
    }

    #[test]
    fn test_single_scale_has_no_index() {
        let t = transformer((8, 8), CropStrategy::MultiResolution { scales: vec![0.5] });
        assert_eq!(t.plan_windows(10, 10)[0].crop_index, None);
    }

    #[test]
    fn test_tiny_sources_still_yield_windows() {
        let t = transformer((512, 512), CropStrategy::MultiResolution { scales: vec![0.01] });
        let window = t.plan_windows(1, 3)[0];
        assert_eq!((window.width, window.height), (1, 1));
        assert_eq!(window.y, 1);
    }

    #[test]
    fn test_outputs_have_target_size() {
        let t = transformer((48, 24), CropStrategy::multi_resolution());
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(37, 91, Rgb([200, 10, 10])));

        let outputs = t.process(image, Path::new("src.png")).unwrap();
        assert_eq!(outputs.len(), 2);
        for output in &outputs {
            assert_eq!((output.width, output.height), (48, 24));
            let decoded = image::load_from_memory(&output.bytes).unwrap();
            assert_eq!(decoded.dimensions(), (48, 24));
        }
    }

    #[test]
    fn test_jpeg_output_drops_alpha() {
        let t = ImageTransformer::new(TransformSpec {
            target_size: (16, 16),
            output_format: OutputFormat::Jpeg,
            ..TransformSpec::default()
        })
        .unwrap();
        assert_eq!(t.extension(), "jpg");

        let image = DynamicImage::ImageRgba8(image::RgbaImage::new(20, 20));
        let outputs = t.transform(image);
        assert_eq!(outputs[0].1.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_invalid_spec_is_rejected() {
        assert!(ImageTransformer::new(TransformSpec {
            target_size: (0, 10),
            ..TransformSpec::default()
        })
        .is_err());
    }
}
