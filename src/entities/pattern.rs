//! Synthetic media item producing generated frames
//!
//! Used by the demo binary and tests. Frames are flat luma ramps whose value
//! depends on the frame index. Failures, panics and decode latency can be
//! injected to exercise the worker's error paths.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::frame::{CachedFrame, DecodeError, PixelFormat};
use super::traits::MediaItem;

/// Generated frames, optionally failing or slow
pub struct TestPattern {
    id: Uuid,
    name: String,
    frame_count: usize,
    width: usize,
    height: usize,
    frame_bytes: usize,
    delay: Duration,
    failing_frames: HashSet<usize>,
    source_failure_at: Option<usize>,
    panic_at: Option<usize>,
    /// Frame indices in the order they were decoded
    decoded: Mutex<Vec<usize>>,
}

impl TestPattern {
    /// YUV 4:2:0 pattern of `width` x `height`
    pub fn new(name: &str, frame_count: usize, width: usize, height: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            frame_count,
            width,
            height,
            frame_bytes: PixelFormat::Yuv420p.frame_bytes(width, height),
            delay: Duration::ZERO,
            failing_frames: HashSet::new(),
            source_failure_at: None,
            panic_at: None,
            decoded: Mutex::new(Vec::new()),
        }
    }

    /// Pattern whose frames are exactly `bytes` long (single row)
    pub fn sized(name: &str, frame_count: usize, bytes: usize) -> Self {
        let mut pattern = Self::new(name, frame_count, bytes, 1);
        pattern.frame_bytes = bytes;
        pattern
    }

    /// Sleep this long inside every decode
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// These frames fail with a single-frame decode error
    pub fn with_failing_frames(mut self, frames: &[usize]) -> Self {
        self.failing_frames.extend(frames.iter().copied());
        self
    }

    /// Frames at or after `frame` fail with a source error
    pub fn with_source_failure_at(mut self, frame: usize) -> Self {
        self.source_failure_at = Some(frame);
        self
    }

    /// Decoding `frame` panics
    pub fn with_panic_at(mut self, frame: usize) -> Self {
        self.panic_at = Some(frame);
        self
    }

    /// Frame indices decoded so far, in decode order
    pub fn decoded(&self) -> Vec<usize> {
        self.decoded.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn decode_count(&self) -> usize {
        self.decoded.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl MediaItem for TestPattern {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    fn decode_frame(&self, frame_idx: usize) -> Result<CachedFrame, DecodeError> {
        self.decoded.lock().unwrap_or_else(|e| e.into_inner()).push(frame_idx);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panic_at == Some(frame_idx) {
            panic!("test pattern {} panicked at frame {}", self.name, frame_idx);
        }
        if frame_idx >= self.frame_count {
            return Err(DecodeError::Frame {
                frame: frame_idx,
                reason: format!("out of range (0..{})", self.frame_count),
            });
        }
        if matches!(self.source_failure_at, Some(at) if frame_idx >= at) {
            return Err(DecodeError::Source(format!("{}: source unavailable", self.name)));
        }
        if self.failing_frames.contains(&frame_idx) {
            return Err(DecodeError::Frame {
                frame: frame_idx,
                reason: "corrupt data".to_string(),
            });
        }

        let value = (frame_idx % 256) as u8;
        Ok(CachedFrame::new(
            vec![value; self.frame_bytes],
            self.width,
            self.height,
            PixelFormat::Yuv420p,
        ))
    }
}
