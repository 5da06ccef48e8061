//! Frame data structures for captured screen content

use image::{GrayImage, RgbaImage};
use std::time::Instant;

/// A captured frame from the screen
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Wrap a decoded RGBA image
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the frame holds no usable pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Grayscale copy of the frame, the form handed to the OCR engine
    pub fn to_grayscale(&self) -> Option<GrayImage> {
        let rgba = RgbaImage::from_raw(self.width, self.height, self.data.clone())?;
        Some(image::DynamicImage::ImageRgba8(rgba).into_luma8())
    }
}
