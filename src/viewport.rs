use std::collections::HashSet;

use crate::bounds::TileBounds;
use crate::region::{PlaneIndex, TileKey};

/// What the map widget reports about its current view.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub bounds: TileBounds,
    pub plane: i32,
    pub center: (f64, f64),
    pub zoom: i32,
}

impl Viewport {
    /// Viewport from raw world-space edges; the centre is the middle of the unsnapped box.
    pub fn from_world(west: f64, east: f64, south: f64, north: f64, plane: i32, zoom: i32) -> Self {
        Self {
            bounds: TileBounds::from_world(west, east, south, north),
            plane,
            center: ((west + east) / 2.0, (south + north) / 2.0),
            zoom,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// Nearest-first, at most `limit` long.
    pub tiles: Vec<TileKey>,
    /// Every indexed tile inside the box, before truncation.
    pub total: usize,
}

impl Selection {
    pub fn is_truncated(&self) -> bool {
        self.tiles.len() < self.total
    }
}

/// Region rectangle `(start_rx, end_rx, start_ry, end_ry)` to scan for `bounds`. The box is
/// first cut down to the tiles the index holds, and rows stay inside the id stride so no
/// two scanned regions share an id.
fn region_range(index: &PlaneIndex, bounds: &TileBounds) -> Option<(i32, i32, i32, i32)> {
    let clipped = bounds.intersect(&index.span()?)?;
    let grid = index.grid();
    let (start_rx, start_ry) = grid.region_coords(clipped.min_x, clipped.min_y);
    let (end_rx, end_ry) = grid.region_coords(clipped.max_x, clipped.max_y);
    let start_ry = start_ry.max(0);
    let end_ry = end_ry.min(grid.stride - 1);
    (start_ry <= end_ry).then_some((start_rx, end_rx, start_ry, end_ry))
}

/// Region ids overlapping the box, nearest region centre first.
pub fn regions_by_distance(index: &PlaneIndex, bounds: &TileBounds, center_x: f64, center_y: f64) -> Vec<i64> {
    let Some((start_rx, end_rx, start_ry, end_ry)) = region_range(index, bounds) else {
        return Vec::new();
    };
    let grid = index.grid();
    let mut regions: Vec<(f64, i64)> = Vec::new();
    for rx in start_rx..=end_rx {
        for ry in start_ry..=end_ry {
            let (cx, cy) = grid.region_center(rx, ry);
            let dx = cx - center_x;
            let dy = cy - center_y;
            regions.push((dx * dx + dy * dy, grid.pack(rx, ry)));
        }
    }
    regions.sort_by(|a, b| a.0.total_cmp(&b.0));
    regions.into_iter().map(|(_, id)| id).collect()
}

/// Walkable tiles inside `bounds`, nearest to the centre first, truncated to `limit`.
pub fn select(
    index: &PlaneIndex,
    bounds: &TileBounds,
    center_x: f64,
    center_y: f64,
    limit: usize,
) -> Selection {
    if bounds.min_x > bounds.max_x || bounds.min_y > bounds.max_y {
        return Selection::default();
    }

    let mut in_bounds: Vec<(f64, TileKey)> = Vec::new();
    for region_id in regions_by_distance(index, bounds, center_x, center_y) {
        let Some(entry) = index.region(region_id) else { continue };
        for tile in entry.iter() {
            if !bounds.contains(tile.x, tile.y) {
                continue;
            }
            let dx = tile.x as f64 - center_x;
            let dy = tile.y as f64 - center_y;
            in_bounds.push((dx * dx + dy * dy, tile));
        }
    }

    // stable: ties keep region-scan order
    in_bounds.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total = in_bounds.len();
    let tiles = in_bounds.into_iter().take(limit).map(|(_, t)| t).collect();
    Selection { tiles, total }
}

/// Membership set of every indexed tile inside `bounds`, for path queries.
pub fn tiles_in_bounds(index: &PlaneIndex, bounds: &TileBounds) -> HashSet<TileKey> {
    let mut set = HashSet::new();
    let Some((start_rx, end_rx, start_ry, end_ry)) = region_range(index, bounds) else {
        return set;
    };
    let grid = index.grid();
    for rx in start_rx..=end_rx {
        for ry in start_ry..=end_ry {
            let Some(entry) = index.region(grid.pack(rx, ry)) else { continue };
            set.extend(entry.iter().filter(|t| bounds.contains(t.x, t.y)));
        }
    }
    log::debug!(
        "tile set for plane {}: regions x[{}..={}] y[{}..={}] -> {} tiles",
        index.plane(),
        start_rx,
        end_rx,
        start_ry,
        end_ry,
        set.len()
    );
    set
}
