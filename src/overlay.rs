use std::sync::Arc;

use crate::config::MapConfig;
use crate::region::TileKey;
use crate::tile_cache::{PlaneStatus, TileCache};
use crate::viewport::{self, Viewport};

pub const STATUS_LOADING: &str = "Loading...";
pub const STATUS_UNAVAILABLE: &str = "Database unavailable";
pub const STATUS_ZOOM_IN: &str = "Zoom in to see tiles";

/// Tiles to draw plus the status line shown next to the overlay toggle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayUpdate {
    pub tiles: Vec<TileKey>,
    pub total: usize,
    pub status: String,
}

impl OverlayUpdate {
    fn empty(status: &str) -> Self {
        Self { tiles: Vec::new(), total: 0, status: status.to_string() }
    }
}

/// Walkable-tile overlay: owns the enable flag and tile budget, reads through a shared cache.
pub struct WalkableOverlay {
    cache: Arc<TileCache>,
    enabled: bool,
    tile_limit: usize,
    min_tile_limit: usize,
    max_tile_limit: usize,
    min_zoom: i32,
}

impl WalkableOverlay {
    pub fn new(cache: Arc<TileCache>, cfg: &MapConfig) -> Self {
        Self {
            cache,
            enabled: false,
            tile_limit: cfg.clamp_tile_limit(cfg.tile_limit),
            min_tile_limit: cfg.min_tile_limit,
            max_tile_limit: cfg.max_tile_limit,
            min_zoom: cfg.min_zoom,
        }
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn tile_limit(&self) -> usize {
        self.tile_limit
    }

    /// Clamps into the configured range. Returns true when the effective limit changed,
    /// meaning the caller should refresh.
    pub fn set_tile_limit(&mut self, limit: usize) -> bool {
        let clamped = limit.clamp(self.min_tile_limit, self.max_tile_limit);
        if clamped == self.tile_limit {
            return false;
        }
        self.tile_limit = clamped;
        true
    }

    /// Status to show while [`refresh`](Self::refresh) may block on a plane load.
    pub fn pending_status(&self, plane: i32) -> &'static str {
        match self.cache.status(plane) {
            PlaneStatus::Unavailable(_) => STATUS_UNAVAILABLE,
            PlaneStatus::Ready { .. } => "",
            _ => STATUS_LOADING,
        }
    }

    pub fn refresh(&self, view: &Viewport) -> OverlayUpdate {
        if !self.enabled {
            return OverlayUpdate::default();
        }
        if view.zoom < self.min_zoom {
            return OverlayUpdate::empty(STATUS_ZOOM_IN);
        }
        let index = match self.cache.ensure_plane(view.plane) {
            Ok(index) => index,
            Err(e) => {
                log::warn!("walkable overlay: {}", e);
                return OverlayUpdate::empty(STATUS_UNAVAILABLE);
            }
        };
        let (cx, cy) = view.center;
        let sel = viewport::select(&index, &view.bounds, cx, cy, self.tile_limit);
        let status = tile_status(sel.tiles.len(), sel.total);
        OverlayUpdate { tiles: sel.tiles, total: sel.total, status }
    }
}

/// "<shown> / <total> tiles" when truncated, otherwise "<shown> tiles".
pub fn tile_status(shown: usize, total: usize) -> String {
    if shown < total {
        format!("{} / {} tiles", group_thousands(shown), group_thousands(total))
    } else {
        format!("{} tiles", group_thousands(shown))
    }
}

pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn status_text() {
        assert_eq!(tile_status(100_000, 250_000), "100,000 / 250,000 tiles");
        assert_eq!(tile_status(12, 12), "12 tiles");
    }
}
