//! Frame → JPEG payload encoding.
//!
//! Encoding runs on tokio's blocking pool so a multi-megapixel frame never
//! stalls the event loop; callers simply await the payload.

use crate::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("invalid frame: expected {expected} RGB bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
    #[error("encoder task failed: {0}")]
    Task(String),
}

/// A compressed image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime: &'static str,
}

/// Converts captured frames into JPEG payloads.
#[derive(Debug, Clone, Copy)]
pub struct CaptureEncoder {
    quality: u8,
}

impl Default for CaptureEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl CaptureEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode `frame` at its native size, or scaled down to fit `max_size`
    /// with its aspect ratio kept.
    pub async fn capture(
        &self,
        frame: Frame,
        max_size: Option<(u32, u32)>,
    ) -> Result<ImagePayload, EncodeError> {
        let quality = self.quality;
        tokio::task::spawn_blocking(move || encode_jpeg(&frame, max_size, quality))
            .await
            .map_err(|e| EncodeError::Task(e.to_string()))?
    }
}

/// Synchronous encoder body, shared by the async path and tests.
pub fn encode_jpeg(
    frame: &Frame,
    max_size: Option<(u32, u32)>,
    quality: u8,
) -> Result<ImagePayload, EncodeError> {
    let expected = frame.expected_len();
    if frame.data.len() != expected {
        return Err(EncodeError::InvalidFrame {
            expected,
            actual: frame.data.len(),
        });
    }

    let raster = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(
        EncodeError::InvalidFrame {
            expected,
            actual: frame.data.len(),
        },
    )?;

    let native = (frame.width, frame.height);
    let raster = match max_size.map(|bound| fit_within(native, bound)) {
        Some((w, h)) if (w, h) != native => {
            image::imageops::resize(&raster, w, h, FilterType::Triangle)
        }
        _ => raster,
    };
    let (width, height) = raster.dimensions();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&raster)
        .map_err(|e| EncodeError::Jpeg(e.to_string()))?;

    tracing::debug!(width, height, bytes = bytes.len(), quality, "encoded capture");

    Ok(ImagePayload {
        bytes,
        width,
        height,
        mime: JPEG_MIME,
    })
}

/// Largest size no bigger than `bound` with the aspect ratio of `size`.
/// Never upscales; a zero bound leaves the size unchanged.
pub fn fit_within(size: (u32, u32), bound: (u32, u32)) -> (u32, u32) {
    let (w, h) = (u64::from(size.0), u64::from(size.1));
    let (bw, bh) = (u64::from(bound.0), u64::from(bound.1));
    if bw == 0 || bh == 0 || w == 0 || h == 0 || (w <= bw && h <= bh) {
        return size;
    }
    let (nw, nh) = if w * bh >= h * bw {
        (bw, (h * bw + w / 2) / w)
    } else {
        ((w * bh + h / 2) / h, bh)
    };
    (nw.max(1) as u32, nh.max(1) as u32)
}
