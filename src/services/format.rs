//! Output format handling service
//!
//! Keeps the pixel-layout rules of each output format out of the transformer:
//! colour stays colour, grey stays grey, and alpha survives wherever the encoder
//! can store it.

use crate::config::OutputFormat;
use image::{ColorType, DynamicImage, ImageFormat};

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert any decoded image into an 8-bit layout the output format can encode
    ///
    /// # Examples
    /// ```rust
    /// use e621_noapi::{services::OutputFormatHandler, OutputFormat};
    /// use image::{DynamicImage, RgbaImage};
    ///
    /// let rgba = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
    /// let converted = OutputFormatHandler::convert_format(rgba, OutputFormat::Jpeg);
    /// assert!(matches!(converted, DynamicImage::ImageRgb8(_)));
    /// ```
    #[must_use]
    pub fn convert_format(image: DynamicImage, format: OutputFormat) -> DynamicImage {
        let color = image.color();
        let has_color = color.has_color();
        let keep_alpha = color.has_alpha() && Self::supports_transparency(format);

        match (has_color, keep_alpha) {
            (false, false) if color == ColorType::L8 => image,
            (false, false) => DynamicImage::ImageLuma8(image.to_luma8()),
            // The TIFF encoder has no grey+alpha layout
            (false, true) if format == OutputFormat::Tiff => {
                DynamicImage::ImageRgba8(image.to_rgba8())
            },
            (false, true) if color == ColorType::La8 => image,
            (false, true) => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
            (true, false) if color == ColorType::Rgb8 => image,
            (true, false) => DynamicImage::ImageRgb8(image.to_rgb8()),
            (true, true) if color == ColorType::Rgba8 => image,
            (true, true) => DynamicImage::ImageRgba8(image.to_rgba8()),
        }
    }

    /// Get the file extension (without the dot) for an output format
    ///
    /// ```rust
    /// use e621_noapi::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
        }
    }

    #[must_use]
    pub fn image_format(format: OutputFormat) -> ImageFormat {
        match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Tiff => ImageFormat::Tiff,
        }
    }

    /// Check if a format can store an alpha channel
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Check whether this build can encode the format
    #[must_use]
    pub fn is_available(format: OutputFormat) -> bool {
        match format {
            OutputFormat::WebP => cfg!(feature = "webp-support"),
            OutputFormat::Png | OutputFormat::Jpeg | OutputFormat::Tiff => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, GrayImage, ImageBuffer, LumaA, Rgb, Rgba, RgbaImage};

    #[test]
    fn test_rgba_keeps_alpha_except_for_jpeg() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128])));

        for format in [OutputFormat::Png, OutputFormat::WebP, OutputFormat::Tiff] {
            let converted = OutputFormatHandler::convert_format(rgba.clone(), format);
            assert_eq!(converted.color(), ColorType::Rgba8, "{format}");
        }

        let converted = OutputFormatHandler::convert_format(rgba, OutputFormat::Jpeg);
        assert_eq!(converted.color(), ColorType::Rgb8);
        assert_eq!(converted.as_rgb8().unwrap().get_pixel(1, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_grey_stays_grey() {
        let grey = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, image::Luma([7])));
        for format in [OutputFormat::Png, OutputFormat::Jpeg, OutputFormat::Tiff] {
            let converted = OutputFormatHandler::convert_format(grey.clone(), format);
            assert_eq!(converted.color(), ColorType::L8);
        }

        let grey_alpha =
            DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(3, 3, LumaA([7, 200])));
        assert_eq!(
            OutputFormatHandler::convert_format(grey_alpha.clone(), OutputFormat::Png).color(),
            ColorType::La8
        );
        assert_eq!(
            OutputFormatHandler::convert_format(grey_alpha.clone(), OutputFormat::Jpeg).color(),
            ColorType::L8
        );
        assert_eq!(
            OutputFormatHandler::convert_format(grey_alpha, OutputFormat::Tiff).color(),
            ColorType::Rgba8
        );
    }

    #[test]
    fn test_sixteen_bit_is_reduced_to_eight() {
        let deep: ImageBuffer<Rgb<u16>, Vec<u16>> = ImageBuffer::from_pixel(2, 2, Rgb([65535, 0, 0]));
        let converted =
            OutputFormatHandler::convert_format(DynamicImage::ImageRgb16(deep), OutputFormat::Png);
        assert_eq!(converted.color(), ColorType::Rgb8);
        assert_eq!(converted.as_rgb8().unwrap().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_get_extension() {
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::WebP), "webp");
        assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Tiff), "tiff");
    }

    #[test]
    fn test_supports_transparency() {
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::WebP));
        assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Jpeg));
    }
}
