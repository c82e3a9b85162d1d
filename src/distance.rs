use std::sync::Arc;

use crate::bounds::TileBounds;
use crate::config::MapConfig;
use crate::neighbor_policy::MovementPolicy;
use crate::pathfinder::{self, PathOptions};
use crate::region::TileKey;
use crate::tile_cache::TileCache;
use crate::viewport;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FallbackReason {
    /// Walkable tiles for the plane have not been loaded yet.
    PlaneNotCached,
    NoTilesInRange,
    NoPath,
}

impl FallbackReason {
    pub fn message(self) -> &'static str {
        match self {
            FallbackReason::PlaneNotCached => "Enable \"Show Walkable\" first",
            FallbackReason::NoTilesInRange => "No walkable tiles in range",
            FallbackReason::NoPath => "No walkable path found",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Measurement {
    Path { tiles: Vec<TileKey>, distance: usize },
    /// Straight-line estimate used when no walkable path is available.
    Fallback { from: TileKey, to: TileKey, distance: u32, reason: FallbackReason },
}

impl Measurement {
    pub fn distance(&self) -> usize {
        match self {
            Measurement::Path { distance, .. } => *distance,
            Measurement::Fallback { distance, .. } => *distance as usize,
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, Measurement::Path { .. })
    }
}

/// Tile distance between two points, following walkable tiles when possible.
pub struct DistanceTool {
    cache: Arc<TileCache>,
    margin: i32,
    opts: PathOptions,
}

impl DistanceTool {
    pub fn new(cache: Arc<TileCache>, cfg: &MapConfig) -> Self {
        Self {
            cache,
            margin: cfg.path_margin,
            opts: PathOptions { policy: MovementPolicy::default(), max_iterations: cfg.max_iterations },
        }
    }

    /// Only reads planes that are already cached; never triggers a load.
    pub fn measure(&self, plane: i32, start: TileKey, end: TileKey) -> Measurement {
        let fallback = |reason: FallbackReason| Measurement::Fallback { from: start, to: end, distance: chebyshev(start, end), reason };

        let Some(index) = self.cache.cached(plane) else {
            return fallback(FallbackReason::PlaneNotCached);
        };
        if index.is_empty() {
            return fallback(FallbackReason::PlaneNotCached);
        }

        let bounds = TileBounds::around((start.x, start.y), (end.x, end.y), self.margin);
        let tiles = viewport::tiles_in_bounds(&index, &bounds);
        if tiles.is_empty() {
            return fallback(FallbackReason::NoTilesInRange);
        }

        match pathfinder::find_path_in_set(&tiles, start, end, &self.opts) {
            Some(path) => {
                let distance = path.len() - 1;
                Measurement::Path { tiles: path, distance }
            }
            None => fallback(FallbackReason::NoPath),
        }
    }
}

pub fn chebyshev(a: TileKey, b: TileKey) -> u32 {
    a.x.abs_diff(b.x).max(a.y.abs_diff(b.y))
}
