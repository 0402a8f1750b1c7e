//! Image I/O operations service
//!
//! Decoding classifies failures the way the pipeline reports them: content that
//! no enabled decoder recognises is an unsupported format, while a recognised but
//! truncated or corrupt file (or one that cannot be read at all) is unreadable.

use crate::{
    config::OutputFormat,
    error::{DatasetError, Result},
    services::OutputFormatHandler,
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageError, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Service for decoding source images and encoding dataset images
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// The format is guessed from the file content first and falls back to the
    /// file extension, so mislabelled e621 files still decode.
    ///
    /// # Errors
    /// - `DatasetError::ImageUnreadable` when the file cannot be read or is corrupt
    /// - `DatasetError::UnsupportedFormat` when the content is not a decodable format
    ///
    /// # Examples
    /// ```rust,no_run
    /// use e621_noapi::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("images/ab/cd/abcd.png")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        let reader = ImageReader::open(path_ref)
            .and_then(ImageReader::with_guessed_format)
            .map_err(|e| DatasetError::image_unreadable(path_ref, e.to_string()))?;

        let Some(format) = reader.format() else {
            return Err(DatasetError::unsupported_format(
                path_ref,
                "content does not match any known image format",
            ));
        };
        log::debug!("Decoding {} as {:?}", path_ref.display(), format);

        reader.decode().map_err(|e| match e {
            ImageError::Unsupported(inner) => {
                DatasetError::unsupported_format(path_ref, inner.to_string())
            },
            other => DatasetError::image_unreadable(path_ref, other.to_string()),
        })
    }

    /// Encode an image into the bytes of a dataset file
    ///
    /// # Arguments
    /// * `image` - Image already converted with [`OutputFormatHandler::convert_format`]
    /// * `format` - Output format
    /// * `jpeg_quality` - JPEG quality (0-100), ignored for lossless formats
    /// * `source` - Source file the image came from, used for error context
    ///
    /// # Errors
    /// - `DatasetError::UnsupportedFormat` when the encoder rejects the image
    pub fn encode_image(
        image: &DynamicImage,
        format: OutputFormat,
        jpeg_quality: u8,
        source: &Path,
    ) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());

        let result = match format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality.clamp(1, 100));
                image.write_with_encoder(encoder)
            },
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff => {
                image.write_to(&mut buffer, OutputFormatHandler::image_format(format))
            },
        };

        result.map_err(|e| {
            DatasetError::unsupported_format(
                source,
                format!("failed to encode as {format}: {e}"),
            )
        })?;

        Ok(buffer.into_inner())
    }
}
