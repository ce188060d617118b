//! Raw planar YUV file source
//!
//! **Why**: Uncompressed YUV files are the common input of a video analysis
//! player. Every frame has the same size, so frame `n` lives at byte offset
//! `n * frame_bytes` and can be read without any index.
//!
//! Resolution and subsampling are given explicitly or guessed from the file
//! name (`foreman_352x288_420.yuv`, `clip_1920x1080.yuv`).
//!
//! # Errors
//!
//! - frame index past the end of file: single-frame error
//! - seek/read failure: I/O error, the caching job for this item is aborted

use anyhow::{Context, Result, bail};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use super::frame::{CachedFrame, DecodeError, PixelFormat};
use super::traits::MediaItem;

static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)x(\d+)").expect("valid size regex"));
static FORMAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[_.\-])(420|422|444)(?:$|[_.\-p])").expect("valid format regex"));

/// Raw YUV file opened for frame reads
pub struct RawYuvFile {
    id: Uuid,
    path: PathBuf,
    width: usize,
    height: usize,
    format: PixelFormat,
    frame_count: AtomicUsize,
    file: Mutex<File>,
}

impl RawYuvFile {
    /// Open file with explicit geometry
    pub fn open(path: &Path, width: usize, height: usize, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 || format.checked_frame_bytes(width, height).is_none() {
            bail!("Invalid frame size {}x{} for {}", width, height, path.display());
        }
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

        let raw = Self {
            id: Uuid::new_v4(),
            path: path.to_path_buf(),
            width,
            height,
            format,
            frame_count: AtomicUsize::new(0),
            file: Mutex::new(file),
        };
        raw.refresh_frame_count()?;

        debug!(
            "Opened {}: {}x{} {:?}, {} frames",
            path.display(),
            width,
            height,
            format,
            raw.frame_count()
        );
        Ok(raw)
    }

    /// Open file, taking geometry from its name
    pub fn open_guessed(path: &Path) -> Result<Self> {
        let (width, height, format) = Self::guess_format(path)
            .with_context(|| format!("Cannot guess frame size from name: {}", path.display()))?;
        Self::open(path, width, height, format)
    }

    /// Parse `WxH` and an optional `420/422/444` token from the file name.
    /// Subsampling defaults to 4:2:0.
    pub fn guess_format(path: &Path) -> Option<(usize, usize, PixelFormat)> {
        let name = path.file_name()?.to_str()?;
        let caps = SIZE_RE.captures(name)?;
        let width = caps[1].parse::<usize>().ok()?;
        let height = caps[2].parse::<usize>().ok()?;
        if width == 0 || height == 0 {
            return None;
        }

        let format = FORMAT_RE
            .captures(name)
            .and_then(|c| PixelFormat::from_name(&c[1]))
            .unwrap_or(PixelFormat::Yuv420p);

        format.checked_frame_bytes(width, height)?;
        Some((width, height, format))
    }

    /// Re-read file length (the file may still be growing)
    pub fn refresh_frame_count(&self) -> Result<usize> {
        let len = std::fs::metadata(&self.path)
            .with_context(|| format!("Failed to stat {}", self.path.display()))?
            .len() as usize;
        let count = len / self.format.frame_bytes(self.width, self.height);
        self.frame_count.store(count, Ordering::Relaxed);
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

impl MediaItem for RawYuvFile {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    fn frame_count(&self) -> usize {
        self.frame_count.load(Ordering::Relaxed)
    }

    fn frame_bytes(&self) -> usize {
        self.format.frame_bytes(self.width, self.height)
    }

    fn decode_frame(&self, frame_idx: usize) -> Result<CachedFrame, DecodeError> {
        let count = self.frame_count();
        if frame_idx >= count {
            return Err(DecodeError::Frame {
                frame: frame_idx,
                reason: format!("past end of file ({} frames)", count),
            });
        }

        let size = self.frame_bytes();
        let mut buf = vec![0u8; size];
        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            file.seek(SeekFrom::Start((frame_idx * size) as u64))?;
            file.read_exact(&mut buf)?;
        }

        Ok(CachedFrame::new(buf, self.width, self.height, self.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_frames(dir: &Path, name: &str, frame_size: usize, frames: usize) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for i in 0..frames {
            file.write_all(&vec![i as u8; frame_size]).unwrap();
        }
        // Trailing partial frame must not count
        file.write_all(&[0xff; 3]).unwrap();
        path
    }

    #[test]
    fn test_guess_format_from_name() {
        assert_eq!(
            RawYuvFile::guess_format(Path::new("foreman_352x288_444.yuv")),
            Some((352, 288, PixelFormat::Yuv444p))
        );
        assert_eq!(
            RawYuvFile::guess_format(Path::new("/tmp/clip_1920x1080.yuv")),
            Some((1920, 1080, PixelFormat::Yuv420p))
        );
        assert_eq!(
            RawYuvFile::guess_format(Path::new("kimono_8x4_422p.yuv")),
            Some((8, 4, PixelFormat::Yuv422p))
        );
        assert_eq!(RawYuvFile::guess_format(Path::new("noinfo.yuv")), None);
        // Sizes whose frame length does not fit in usize
        assert_eq!(
            RawYuvFile::guess_format(Path::new("huge_99999999999x99999999999.yuv")),
            None
        );
    }

    #[test]
    fn test_frame_count_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        // 4x2 4:2:0 = 8 + 2*2 = 12 bytes
        let path = write_frames(dir.path(), "seq_4x2.yuv", 12, 5);

        let raw = RawYuvFile::open_guessed(&path).unwrap();
        assert_eq!(raw.frame_bytes(), 12);
        assert_eq!(raw.frame_count(), 5);

        let frame = raw.decode_frame(3).unwrap();
        assert_eq!(frame.bytes(), 12);
        assert!(frame.pixels().iter().all(|&b| b == 3));

        let err = raw.decode_frame(5).unwrap_err();
        assert!(!err.is_source_failure());
    }

    #[test]
    fn test_open_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing_4x4.yuv");
        assert!(RawYuvFile::open_guessed(&missing).is_err());
        assert!(RawYuvFile::open(&missing, 0, 4, PixelFormat::Yuv420p).is_err());
    }

    #[test]
    fn test_truncated_file_is_source_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_frames(dir.path(), "grow_4x2.yuv", 12, 4);
        let raw = RawYuvFile::open_guessed(&path).unwrap();

        // Shrink the file behind the reader's back
        File::create(&path).unwrap().write_all(&[0u8; 12]).unwrap();
        let err = raw.decode_frame(2).unwrap_err();
        assert!(err.is_source_failure());

        assert_eq!(raw.refresh_frame_count().unwrap(), 1);
    }
}
