/*!
 * Raw Frame Representation
 *
 * Uncompressed pixel buffers as handed over by capture primitives.
 */

use image::RgbImage;

use crate::error::{GuidanceError, Result};

/// Pixel format for raw frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// BGRA 8-bit per channel (common on macOS and Windows)
    BGRA,
    /// RGBA 8-bit per channel
    RGBA,
    /// RGB 24-bit
    RGB24,
}

impl PixelFormat {
    /// Get bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::BGRA | PixelFormat::RGBA => 4,
            PixelFormat::RGB24 => 3,
        }
    }
}

/// Raw uncompressed frame
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame pixel data, tightly packed rows
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Get expected data size for this frame
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_size()
    }

    /// Drop alpha and reorder channels into an RGB image
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        if !self.is_valid() {
            return Err(GuidanceError::EncodeFailure(format!(
                "raw frame {}x{} {:?} has {} bytes, expected {}",
                self.width,
                self.height,
                self.format,
                self.data.len(),
                self.expected_size()
            )));
        }

        let rgb_data = match self.format {
            PixelFormat::RGB24 => self.data.clone(),
            PixelFormat::RGBA => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::BGRA => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };

        RgbImage::from_raw(self.width, self.height, rgb_data)
            .ok_or_else(|| GuidanceError::EncodeFailure("raw frame buffer too small".to_string()))
    }
}
