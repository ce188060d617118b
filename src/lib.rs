//! precache - background frame cache scheduler
//!
//! Decides which decoded frames of a playlist to keep in memory, decodes
//! them on one background worker and restarts that work whenever playback,
//! selection or the playlist changes.

// Cache engine (store, planner, worker, scheduler)
pub mod core;

// Media sources, playlist and playback stand-ins
pub mod entities;

pub mod cli;
pub mod config;
pub mod status;

// Re-export commonly used types
pub use config::CacheConfig;
pub use core::frame_store::{CacheKey, FrameStore};
pub use core::scheduler::Scheduler;
pub use core::state::WorkerState;
pub use entities::{CachedFrame, DecodeError, MediaItem, PlaybackPosition, PlaybackSource, Playlist};
pub use status::{CacheStatus, ItemCacheStatus};
