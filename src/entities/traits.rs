//! Abstract traits for dependency inversion.
//!
//! These traits define what the cache scheduler needs from the rest of the
//! player (playlist, playback position, per-item decoding), so `core` never
//! depends on concrete UI or file types.
//!
//! Reference implementations live next to this file.

use std::sync::Arc;
use uuid::Uuid;

use super::frame::{CachedFrame, DecodeError};

/// One playlist item that can produce decoded frames.
///
/// The item id doubles as the source identifier of its cached frames.
pub trait MediaItem: Send + Sync {
    fn id(&self) -> Uuid;

    /// Display name (status output, logs)
    fn name(&self) -> String;

    /// Total number of frames
    fn frame_count(&self) -> usize;

    /// Expected size of one decoded frame in bytes (used for budget planning)
    fn frame_bytes(&self) -> usize;

    /// Decode one frame. Called from the background worker.
    fn decode_frame(&self, frame_idx: usize) -> Result<CachedFrame, DecodeError>;
}

/// Playlist contents as seen by the cache.
pub trait Playlist: Send + Sync {
    /// Items in playback order
    fn items(&self) -> Vec<Arc<dyn MediaItem>>;

    /// Selected items (pinned for caching even when not playing), in selection order
    fn selected(&self) -> Vec<Uuid>;
}

/// Snapshot of the playback position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackPosition {
    /// Item under the playhead (None = nothing loaded)
    pub item: Option<Uuid>,
    /// Frame index within `item`
    pub frame: usize,
    pub playing: bool,
}

/// Playback position tracker, queried on demand.
pub trait PlaybackSource: Send + Sync {
    fn position(&self) -> PlaybackPosition;
}

/// Blanket impls: Arc<T> implements traits if T does
impl<T: Playlist + ?Sized> Playlist for Arc<T> {
    fn items(&self) -> Vec<Arc<dyn MediaItem>> {
        (**self).items()
    }

    fn selected(&self) -> Vec<Uuid> {
        (**self).selected()
    }
}

impl<T: PlaybackSource + ?Sized> PlaybackSource for Arc<T> {
    fn position(&self) -> PlaybackPosition {
        (**self).position()
    }
}
