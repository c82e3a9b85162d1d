use anyhow::{bail, Result};
use std::{env, path::PathBuf};

use crate::pathfinder::DEFAULT_MAX_ITERATIONS;
use crate::region::RegionGrid;

pub const DEFAULT_TILE_LIMIT: usize = 100_000;
pub const MIN_TILE_LIMIT: usize = 10_000;
pub const MAX_TILE_LIMIT: usize = 500_000;
pub const DEFAULT_PATH_MARGIN: i32 = 100;
pub const MIN_ZOOM_FOR_TILES: i32 = -1;

/// Inclusive coordinate ranges that hold real map data.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WorldExtent {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub min_plane: i32,
    pub max_plane: i32,
}

impl Default for WorldExtent {
    fn default() -> Self {
        Self { min_x: 0, max_x: 6399, min_y: 0, max_y: 12799, min_plane: 0, max_plane: 3 }
    }
}

impl WorldExtent {
    pub fn contains(&self, x: i64, y: i64, plane: i64) -> bool {
        x >= self.min_x as i64
            && x <= self.max_x as i64
            && y >= self.min_y as i64
            && y <= self.max_y as i64
            && plane >= self.min_plane as i64
            && plane <= self.max_plane as i64
    }
}

#[derive(Clone, Debug)]
pub struct MapConfig {
    pub tiles_db: Option<PathBuf>,
    pub features_db: Option<PathBuf>,
    /// JSON export of transport links.
    pub links_file: Option<PathBuf>,
    pub grid: RegionGrid,
    pub extent: WorldExtent,
    pub tile_limit: usize,
    pub min_tile_limit: usize,
    pub max_tile_limit: usize,
    pub max_iterations: usize,
    /// Tiles added around both path endpoints when building the search set.
    pub path_margin: i32,
    pub min_zoom: i32,
    pub log_level: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            tiles_db: None,
            features_db: None,
            links_file: None,
            grid: RegionGrid::default(),
            extent: WorldExtent::default(),
            tile_limit: DEFAULT_TILE_LIMIT,
            min_tile_limit: MIN_TILE_LIMIT,
            max_tile_limit: MAX_TILE_LIMIT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            path_margin: DEFAULT_PATH_MARGIN,
            min_zoom: MIN_ZOOM_FOR_TILES,
            log_level: None,
        }
    }
}

/// Values found in `WORLDMAP_*` environment variables. Unset or unparsable ones stay `None`.
#[derive(Clone, Debug, Default)]
pub struct EnvOverrides {
    pub tiles_db: Option<PathBuf>,
    pub features_db: Option<PathBuf>,
    pub links_file: Option<PathBuf>,
    pub tile_limit: Option<usize>,
    pub max_iterations: Option<usize>,
    pub path_margin: Option<i32>,
    pub log_level: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            tiles_db: env::var("WORLDMAP_TILES_DB").ok().map(PathBuf::from),
            features_db: env::var("WORLDMAP_FEATURES_DB").ok().map(PathBuf::from),
            links_file: env::var("WORLDMAP_LINKS_FILE").ok().map(PathBuf::from),
            tile_limit: env::var("WORLDMAP_TILE_LIMIT").ok().and_then(|s| parse_count(&s)),
            max_iterations: env::var("WORLDMAP_MAX_ITERATIONS").ok().and_then(|s| parse_count(&s)),
            path_margin: env::var("WORLDMAP_PATH_MARGIN").ok().and_then(|s| s.trim().parse::<i32>().ok()),
            log_level: env::var("WORLDMAP_LOG_LEVEL").ok(),
        }
    }
}

impl MapConfig {
    pub fn from_env_defaults() -> Self {
        let mut cfg = Self::default();
        cfg.apply(EnvOverrides::from_env());
        cfg
    }

    /// Overlays every value that is set; env wins over whatever is already in `self`.
    pub fn apply(&mut self, env: EnvOverrides) {
        if env.tiles_db.is_some() { self.tiles_db = env.tiles_db; }
        if env.features_db.is_some() { self.features_db = env.features_db; }
        if env.links_file.is_some() { self.links_file = env.links_file; }
        if let Some(n) = env.tile_limit { self.tile_limit = n; }
        if let Some(n) = env.max_iterations { self.max_iterations = n; }
        if let Some(m) = env.path_margin { self.path_margin = m; }
        if env.log_level.is_some() { self.log_level = env.log_level; }
    }

    pub fn clamp_tile_limit(&self, limit: usize) -> usize {
        limit.clamp(self.min_tile_limit, self.max_tile_limit)
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.grid;
        if g.width <= 0 || g.height <= 0 || g.stride <= 0 {
            bail!("region grid dimensions must be positive: {:?}", g);
        }
        let e = &self.extent;
        if e.min_x > e.max_x || e.min_y > e.max_y || e.min_plane > e.max_plane {
            bail!("world extent is inverted: {:?}", e);
        }
        let (_, lo) = g.region_coords(e.min_x, e.min_y);
        let (_, hi) = g.region_coords(e.max_x, e.max_y);
        if lo < 0 || hi >= g.stride {
            bail!(
                "region rows {}..={} do not fit the region id stride {}; ids would collide",
                lo, hi, g.stride
            );
        }
        if self.min_tile_limit > self.max_tile_limit {
            bail!("min tile limit {} exceeds max {}", self.min_tile_limit, self.max_tile_limit);
        }
        if self.max_iterations == 0 {
            bail!("pathfinding iteration cap must be at least 1");
        }
        if self.path_margin < 0 {
            bail!("path margin must not be negative");
        }
        Ok(())
    }
}

fn parse_count(input: &str) -> Option<usize> {
    input.trim().replace('_', "").parse::<usize>().ok()
}

/// Parses "x,y" as typed on the command line.
pub fn parse_point(input: &str) -> Option<(i32, i32)> {
    let (x, y) = input.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}
