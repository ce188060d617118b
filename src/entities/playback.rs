//! Playback position tracker
//!
//! Minimal stand-in for the player's transport: current item, current frame,
//! play/stop flag. `advance()` walks across item boundaries in playlist order
//! and stops at the end of the playlist.

use log::trace;
use std::sync::Mutex;
use uuid::Uuid;

use super::traits::{PlaybackPosition, PlaybackSource, Playlist};

#[derive(Debug, Default)]
pub struct PlaybackTracker {
    position: Mutex<PlaybackPosition>,
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to `frame` of `item` (keeps play/stop state)
    pub fn seek(&self, item: Uuid, frame: usize) {
        let mut pos = self.position.lock().unwrap_or_else(|e| e.into_inner());
        pos.item = Some(item);
        pos.frame = frame;
        trace!("Playback seek: {}:{}", item, frame);
    }

    /// Unload current item
    pub fn clear(&self) {
        let mut pos = self.position.lock().unwrap_or_else(|e| e.into_inner());
        pos.item = None;
        pos.frame = 0;
        pos.playing = false;
    }

    pub fn play(&self) {
        self.position.lock().unwrap_or_else(|e| e.into_inner()).playing = true;
    }

    pub fn stop(&self) {
        self.position.lock().unwrap_or_else(|e| e.into_inner()).playing = false;
    }

    /// Step forward `frames`, continuing into the next playlist items.
    ///
    /// Stops playback at the last frame of the last item. Returns the new position.
    pub fn advance(&self, frames: usize, playlist: &dyn Playlist) -> PlaybackPosition {
        let mut pos = self.position.lock().unwrap_or_else(|e| e.into_inner());
        let Some(current) = pos.item else {
            return *pos;
        };

        let items = playlist.items();
        let Some(mut idx) = items.iter().position(|i| i.id() == current) else {
            return *pos;
        };

        let mut frame = pos.frame + frames;
        loop {
            let count = items[idx].frame_count();
            if frame < count {
                break;
            }
            if idx + 1 >= items.len() {
                frame = count.saturating_sub(1);
                pos.playing = false;
                break;
            }
            frame -= count;
            idx += 1;
        }

        pos.item = Some(items[idx].id());
        pos.frame = frame;
        *pos
    }
}

impl PlaybackSource for PlaybackTracker {
    fn position(&self) -> PlaybackPosition {
        *self.position.lock().unwrap_or_else(|e| e.into_inner())
    }
}
