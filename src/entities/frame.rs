//! Decoded frame buffers and decode errors
//!
//! **Why**: The frame store holds raw decoded pixels and must account for
//! their size. Frames are immutable once decoded, so sharing the buffer via
//! `Arc` makes a clone cheap and a reader can never observe a half-written
//! buffer.
//!
//! **Used by**: Media items (decode), Cache worker (insert), Frame store (budget)
//!
//! # Pixel Formats
//!
//! Planar 8-bit YUV as read from raw files:
//! - `Yuv420p`: full luma, chroma halved in both directions (1.5 bytes/pixel)
//! - `Yuv422p`: full luma, chroma halved horizontally (2 bytes/pixel)
//! - `Yuv444p`: no subsampling (3 bytes/pixel)

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Planar pixel format of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
}

impl PixelFormat {
    /// Horizontal and vertical chroma subsampling factors
    pub fn subsampling(&self) -> (usize, usize) {
        match self {
            PixelFormat::Yuv420p => (2, 2),
            PixelFormat::Yuv422p => (2, 1),
            PixelFormat::Yuv444p => (1, 1),
        }
    }

    /// Bytes needed for one frame of `width` x `height`, None on overflow
    pub fn checked_frame_bytes(&self, width: usize, height: usize) -> Option<usize> {
        let (sub_x, sub_y) = self.subsampling();
        let chroma = width.div_ceil(sub_x).checked_mul(height.div_ceil(sub_y))?;
        width.checked_mul(height)?.checked_add(chroma.checked_mul(2)?)
    }

    /// Bytes needed for one frame of `width` x `height` (saturating)
    pub fn frame_bytes(&self, width: usize, height: usize) -> usize {
        self.checked_frame_bytes(width, height).unwrap_or(usize::MAX)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "420" | "yuv420" | "yuv420p" | "i420" => Some(PixelFormat::Yuv420p),
            "422" | "yuv422" | "yuv422p" => Some(PixelFormat::Yuv422p),
            "444" | "yuv444" | "yuv444p" => Some(PixelFormat::Yuv444p),
            _ => None,
        }
    }
}

/// Decoded frame held by the frame store
///
/// Immutable after creation. Clones share the pixel buffer.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pixels: Arc<[u8]>,
    width: usize,
    height: usize,
    format: PixelFormat,
}

impl CachedFrame {
    pub fn new(pixels: Vec<u8>, width: usize, height: usize, format: PixelFormat) -> Self {
        Self {
            pixels: pixels.into(),
            width,
            height,
            format,
        }
    }

    /// Size used for budget accounting
    pub fn bytes(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// True if both frames share the same pixel buffer
    pub fn same_buffer(&self, other: &CachedFrame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// Frame decoding errors
///
/// `Frame` only loses one frame, the caching job goes on.
/// `Source` and `Io` mean the underlying source is unusable and the job is aborted.
#[derive(Debug)]
pub enum DecodeError {
    Frame { frame: usize, reason: String },
    Source(String),
    Io(std::io::Error),
}

impl DecodeError {
    /// Whether the failure concerns the whole source rather than one frame
    pub fn is_source_failure(&self) -> bool {
        matches!(self, DecodeError::Source(_) | DecodeError::Io(_))
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Frame { frame, reason } => write!(f, "Frame {} decode error: {}", frame, reason),
            DecodeError::Source(e) => write!(f, "Source error: {}", e),
            DecodeError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Io(e)
    }
}
