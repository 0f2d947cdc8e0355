//! Media normalizer: turns an arbitrary uploaded image into a bounded
//! JPEG suitable for inline upload.
//!
//! The upload is staged in a request-scoped temporary file which is removed
//! when the staging handle drops, on success and on every error path.
//! Decoding and encoding run on the blocking pool.

use folio_core::error::MediaError;
use folio_core::prompt::NormalizedImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Output MIME type of every normalized image.
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

const STAGING_PREFIX: &str = "folio-upload-";

/// Re-encodes uploads to a maximum width and fixed JPEG quality.
#[derive(Debug, Clone)]
pub struct MediaNormalizer {
    max_input_bytes: usize,
    max_width: u32,
    quality: u8,
    temp_dir: Option<PathBuf>,
}

impl MediaNormalizer {
    pub fn new(max_input_bytes: usize, max_width: u32, quality: u8) -> Self {
        Self {
            max_input_bytes,
            max_width: max_width.max(1),
            quality: quality.clamp(1, 100),
            temp_dir: None,
        }
    }

    pub fn from_config(config: &folio_config::AppConfig) -> Self {
        let normalizer = Self::new(
            config.gateway.max_upload_bytes,
            config.media.max_width,
            config.media.jpeg_quality,
        );
        match &config.media.temp_dir {
            Some(dir) => normalizer.with_temp_dir(dir),
            None => normalizer,
        }
    }

    /// Stage uploads under `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn max_input_bytes(&self) -> usize {
        self.max_input_bytes
    }

    /// Normalize `bytes`. Oversized input is rejected before any decoding.
    pub async fn normalize(&self, bytes: Vec<u8>) -> Result<NormalizedImage, MediaError> {
        if bytes.len() > self.max_input_bytes {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                limit: self.max_input_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(MediaError::Decode("empty upload".into()));
        }

        let this = self.clone();
        tokio::task::spawn_blocking(move || this.normalize_blocking(&bytes))
            .await
            .map_err(|e| MediaError::Io(format!("normalizer task failed: {e}")))?
    }

    fn normalize_blocking(&self, bytes: &[u8]) -> Result<NormalizedImage, MediaError> {
        let staged = self.stage(bytes)?;

        let reader = ImageReader::open(staged.path())
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| MediaError::Io(e.to_string()))?;
        let format = reader.format();
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| MediaError::Decode(e.to_string()))?;
        let orientation = decoder
            .orientation()
            .map_err(|e| MediaError::Decode(e.to_string()))?;
        let mut img =
            DynamicImage::from_decoder(decoder).map_err(|e| MediaError::Decode(e.to_string()))?;
        img.apply_orientation(orientation);

        let (width, height) = (img.width(), img.height());
        if width > self.max_width {
            img = img.resize(self.max_width, u32::MAX, FilterType::Lanczos3);
        }

        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))
            .map_err(|e| MediaError::Encode(e.to_string()))?;

        debug!(
            format = ?format,
            input_bytes = bytes.len(),
            output_bytes = out.len(),
            from = %format!("{width}x{height}"),
            to = %format!("{}x{}", img.width(), img.height()),
            "Image normalized"
        );

        Ok(NormalizedImage {
            bytes: out,
            mime_type: OUTPUT_MIME_TYPE.to_string(),
        })
    }

    fn stage(&self, bytes: &[u8]) -> Result<NamedTempFile, MediaError> {
        let mut staged = match &self.temp_dir {
            Some(dir) => NamedTempFile::with_prefix_in(STAGING_PREFIX, dir),
            None => NamedTempFile::with_prefix(STAGING_PREFIX),
        }
        .map_err(|e| MediaError::Io(e.to_string()))?;

        staged
            .write_all(bytes)
            .and_then(|()| staged.flush())
            .map_err(|e| MediaError::Io(e.to_string()))?;
        Ok(staged)
    }
}
