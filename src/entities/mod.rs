//! Entities module - frames, media items and the collaborator interfaces
//!
//! The cache core only sees the traits in [`traits`]. The concrete types here
//! (playlist model, playback tracker, raw YUV files, test patterns) are small
//! reference implementations used by the demo binary and tests.

pub mod frame;
pub mod pattern;
pub mod playback;
pub mod playlist;
pub mod raw_file;
pub mod traits;

pub use frame::{CachedFrame, DecodeError, PixelFormat};
pub use pattern::TestPattern;
pub use playback::PlaybackTracker;
pub use playlist::PlaylistModel;
pub use raw_file::RawYuvFile;
pub use traits::{MediaItem, PlaybackPosition, PlaybackSource, Playlist};
