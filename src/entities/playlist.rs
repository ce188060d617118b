//! In-memory playlist model
//!
//! Ordered list of media items plus the current selection. The cache only
//! reads it through the [`Playlist`] trait; the owner mutates it and then
//! notifies the scheduler (`notify_playlist_changed`, or
//! `notify_item_about_to_be_deleted` *before* `remove`).

use log::debug;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::traits::{MediaItem, Playlist};

#[derive(Default)]
struct PlaylistInner {
    items: Vec<Arc<dyn MediaItem>>,
    selected: Vec<Uuid>,
}

/// Thread-safe playlist (RwLock: many readers, rare writers)
#[derive(Default)]
pub struct PlaylistModel {
    inner: RwLock<PlaylistInner>,
}

impl PlaylistModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append item at the end of the playlist
    pub fn push(&self, item: Arc<dyn MediaItem>) -> Uuid {
        let id = item.id();
        debug!("Playlist: added {} ({} frames)", item.name(), item.frame_count());
        self.inner.write().unwrap_or_else(|e| e.into_inner()).items.push(item);
        id
    }

    /// Remove item by id. Also drops it from the selection.
    pub fn remove(&self, id: Uuid) -> Option<Arc<dyn MediaItem>> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.selected.retain(|s| *s != id);
        let pos = inner.items.iter().position(|i| i.id() == id)?;
        let item = inner.items.remove(pos);
        debug!("Playlist: removed {}", item.name());
        Some(item)
    }

    /// Replace the selection (unknown ids are ignored)
    pub fn select(&self, ids: &[Uuid]) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let known: Vec<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| inner.items.iter().any(|i| i.id() == *id))
            .collect();
        inner.selected = known;
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<dyn MediaItem>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.items.iter().find(|i| i.id() == id).cloned()
    }

    /// Item at playlist position
    pub fn at(&self, index: usize) -> Option<Arc<dyn MediaItem>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).items.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Playlist for PlaylistModel {
    fn items(&self) -> Vec<Arc<dyn MediaItem>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).items.clone()
    }

    fn selected(&self) -> Vec<Uuid> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).selected.clone()
    }
}
