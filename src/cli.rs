use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;

use crate::config::CacheConfig;
use crate::entities::PixelFormat;

/// Background frame cache demo: plays through a playlist and prints what got cached
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Raw planar YUV files (size and format guessed from the name, e.g. clip_1920x1080_420.yuv)
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Cache configuration JSON (default: $PRECACHE_CONFIG, else built-in defaults)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of synthetic items when no files are given
    #[arg(long = "items", value_name = "N", default_value = "3")]
    pub items: usize,

    /// Frames per synthetic item
    #[arg(long = "frames", value_name = "N", default_value = "240")]
    pub frames: usize,

    /// Synthetic frame size (WIDTHxHEIGHT, 4:2:0)
    #[arg(long = "size", value_name = "WxH", default_value = "640x360")]
    pub size: String,

    /// Simulated decode time per synthetic frame (ms)
    #[arg(long = "decode-ms", value_name = "MS", default_value = "2")]
    pub decode_ms: u64,

    /// Playback ticks to simulate
    #[arg(long = "ticks", value_name = "N", default_value = "60")]
    pub ticks: usize,

    /// Frames advanced per tick
    #[arg(long = "step", value_name = "N", default_value = "1")]
    pub step: usize,

    /// Cache budget override (MB, 0 = share of system memory)
    #[arg(long = "mem-mb", value_name = "MB")]
    pub mem_mb: Option<usize>,

    /// Lookahead override (frames)
    #[arg(long = "lookahead", value_name = "N")]
    pub lookahead: Option<usize>,

    /// Lookbehind override (frames)
    #[arg(long = "lookbehind", value_name = "N")]
    pub lookbehind: Option<usize>,

    /// Print the final status as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Write the log to a file instead of stderr
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl Args {
    /// Apply command-line overrides on top of a loaded config
    pub fn apply_overrides(&self, config: &mut CacheConfig) -> Result<()> {
        if let Some(mb) = self.mem_mb {
            let Some(bytes) = mb.checked_mul(1024 * 1024) else {
                bail!("--mem-mb {} is out of range", mb);
            };
            config.max_cache_bytes = bytes;
        }
        if let Some(n) = self.lookahead {
            config.lookahead_frames = n;
        }
        if let Some(n) = self.lookbehind {
            config.lookbehind_frames = n;
        }
        Ok(())
    }

    /// Parse `--size` as WIDTHxHEIGHT
    pub fn frame_size(&self) -> Option<(usize, usize)> {
        let (w, h) = self.size.split_once(['x', 'X'])?;
        let w = w.trim().parse().ok()?;
        let h = h.trim().parse().ok()?;
        let fits = PixelFormat::Yuv420p.checked_frame_bytes(w, h).is_some();
        (w > 0 && h > 0 && fits).then_some((w, h))
    }
}
