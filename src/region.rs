use std::collections::HashMap;

use crate::bounds::TileBounds;

pub const REGION_WIDTH: i32 = 64;
pub const REGION_HEIGHT: i32 = 64;
/// Multiplier applied to regionX when packing a region id.
pub const REGION_STRIDE: i32 = 256;

/// Tile coordinate inside a single plane. Used as the hash key for tile sets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
}

impl TileKey {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    pub plane: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32, plane: i32) -> Self {
        Self { x, y, plane }
    }

    pub fn key(self) -> TileKey {
        TileKey::new(self.x, self.y)
    }
}

/// Fixed partition of the world into rectangular regions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegionGrid {
    pub width: i32,
    pub height: i32,
    pub stride: i32,
}

impl Default for RegionGrid {
    fn default() -> Self {
        Self { width: REGION_WIDTH, height: REGION_HEIGHT, stride: REGION_STRIDE }
    }
}

impl RegionGrid {
    /// Region coordinates of a tile. Floors toward negative infinity.
    pub fn region_coords(&self, x: i32, y: i32) -> (i32, i32) {
        (x.div_euclid(self.width), y.div_euclid(self.height))
    }

    pub fn pack(&self, region_x: i32, region_y: i32) -> i64 {
        region_x as i64 * self.stride as i64 + region_y as i64
    }

    pub fn region_id(&self, x: i32, y: i32) -> i64 {
        let (rx, ry) = self.region_coords(x, y);
        self.pack(rx, ry)
    }

    /// Geometric centre of a region in world coordinates.
    pub fn region_center(&self, region_x: i32, region_y: i32) -> (f64, f64) {
        (
            (region_x as f64 + 0.5) * self.width as f64,
            (region_y as f64 + 0.5) * self.height as f64,
        )
    }
}

/// Region id on the default 64x64 grid.
pub fn region_id(x: i32, y: i32) -> i64 {
    RegionGrid::default().region_id(x, y)
}

/// Walkable tiles of one region on one plane, stored as parallel arrays.
#[derive(Clone, Debug, Default)]
pub struct RegionEntry {
    xs: Box<[i32]>,
    ys: Box<[i32]>,
}

impl RegionEntry {
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &[i32] {
        &self.xs
    }

    pub fn ys(&self) -> &[i32] {
        &self.ys
    }

    pub fn iter(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.xs.iter().zip(self.ys.iter()).map(|(&x, &y)| TileKey::new(x, y))
    }
}

/// Read-only region index of all walkable tiles on a plane.
#[derive(Clone, Debug)]
pub struct PlaneIndex {
    plane: i32,
    grid: RegionGrid,
    regions: HashMap<i64, RegionEntry>,
    tile_count: usize,
    span: Option<TileBounds>,
}

impl PlaneIndex {
    pub fn plane(&self) -> i32 {
        self.plane
    }

    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    pub fn region(&self, region_id: i64) -> Option<&RegionEntry> {
        self.regions.get(&region_id)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn is_empty(&self) -> bool {
        self.tile_count == 0
    }

    /// Smallest box holding every indexed tile; `None` for an empty plane.
    pub fn span(&self) -> Option<TileBounds> {
        self.span
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.region(self.grid.region_id(key.x, key.y))
            .map(|entry| entry.iter().any(|t| t == key))
            .unwrap_or(false)
    }
}

/// Accumulates tiles per region, then freezes them into a [`PlaneIndex`].
#[derive(Debug)]
pub struct PlaneIndexBuilder {
    plane: i32,
    grid: RegionGrid,
    groups: HashMap<i64, (Vec<i32>, Vec<i32>)>,
    span: Option<TileBounds>,
}

impl PlaneIndexBuilder {
    pub fn new(plane: i32, grid: RegionGrid) -> Self {
        Self { plane, grid, groups: HashMap::new(), span: None }
    }

    pub fn push(&mut self, region_id: i64, x: i32, y: i32) {
        let (xs, ys) = self.groups.entry(region_id).or_default();
        xs.push(x);
        ys.push(y);
        self.span = Some(match self.span {
            Some(mut span) => {
                span.include(x, y);
                span
            }
            None => TileBounds::new(x, x, y, y),
        });
    }

    /// Files the tile under its computed region id.
    pub fn push_tile(&mut self, x: i32, y: i32) {
        let id = self.grid.region_id(x, y);
        self.push(id, x, y);
    }

    pub fn finish(self) -> PlaneIndex {
        let mut tile_count = 0usize;
        let regions: HashMap<i64, RegionEntry> = self
            .groups
            .into_iter()
            .map(|(id, (xs, ys))| {
                tile_count += xs.len();
                (id, RegionEntry { xs: xs.into_boxed_slice(), ys: ys.into_boxed_slice() })
            })
            .collect();
        PlaneIndex { plane: self.plane, grid: self.grid, regions, tile_count, span: self.span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_id_groups_cells() {
        assert_eq!(region_id(0, 0), 0);
        assert_eq!(region_id(63, 63), 0);
        assert_eq!(region_id(64, 0), 256);
        assert_eq!(region_id(0, 64), 1);
        assert_eq!(region_id(3200, 3200), 50 * 256 + 50);
        assert_eq!(region_id(3201, 3263), region_id(3200, 3200));
    }

    #[test]
    fn region_id_matches_shift_packing() {
        for &(x, y) in &[(0, 0), (3222, 3218), (1, 12799), (6399, 5)] {
            let shifted = ((x as i64 >> 6) << 8) + (y as i64 >> 6);
            assert_eq!(region_id(x, y), shifted);
        }
    }

    #[test]
    fn negative_coordinates_floor() {
        let grid = RegionGrid::default();
        assert_eq!(grid.region_coords(-1, -64), (-1, -1));
        assert_eq!(grid.region_coords(-65, 0), (-2, 0));
    }

    #[test]
    fn builder_freezes_groups() {
        let mut b = PlaneIndexBuilder::new(1, RegionGrid::default());
        b.push_tile(1, 1);
        b.push_tile(2, 3);
        b.push_tile(70, 1);
        let index = b.finish();
        assert_eq!(index.plane(), 1);
        assert_eq!(index.tile_count(), 3);
        assert_eq!(index.region_count(), 2);
        let first = index.region(0).unwrap();
        assert_eq!(first.xs(), &[1, 2]);
        assert_eq!(first.ys(), &[1, 3]);
        assert!(index.contains(Tile::new(70, 1, 1).key()));
        assert_eq!(index.span(), Some(TileBounds::new(1, 70, 1, 3)));
        assert_eq!(PlaneIndexBuilder::new(0, RegionGrid::default()).finish().span(), None);
        assert!(!index.contains(TileKey::new(71, 1)));
    }
}
