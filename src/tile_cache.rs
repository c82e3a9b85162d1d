//! Per-plane walkable tile cache.
//!
//! Each plane is loaded once from a [`TileSource`] and kept for the lifetime of
//! the cache. Concurrent requests for a plane that is still loading wait on the
//! same slot, so a plane is never scanned twice. Failed loads are remembered as
//! well and returned until the slot is reset.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::config::WorldExtent;
use crate::error::CacheError;
use crate::region::{PlaneIndex, PlaneIndexBuilder, RegionGrid};

/// One walkable tile as delivered by a source. Fields are raw; validation happens on ingest.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TileRow {
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub region_id: Option<i64>,
}

impl TileRow {
    pub fn new(x: i64, y: i64, region_id: i64) -> Self {
        Self { x: Some(x), y: Some(y), region_id: Some(region_id) }
    }
}

/// External tile database.
pub trait TileSource: Send + Sync {
    /// Streams every walkable tile on `plane`. An `Err` means the source itself could not be read.
    fn scan_plane(&self, plane: i32, visit: &mut dyn FnMut(TileRow)) -> Result<()>;
}

/// Reads the `tiles` table of a SQLite tile database.
#[derive(Clone, Debug)]
pub struct SqliteTileSource {
    path: PathBuf,
}

impl SqliteTileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TileSource for SqliteTileSource {
    fn scan_plane(&self, plane: i32, visit: &mut dyn FnMut(TileRow)) -> Result<()> {
        let conn = crate::db::open_ro(&self.path)
            .with_context(|| format!("open tile database {}", self.path.display()))?;
        let mut stmt = conn
            .prepare("SELECT x, y, RegionID FROM tiles WHERE plane = ?1")
            .context("prepare tile query")?;
        let mut rows = stmt.query([plane])?;
        while let Some(row) = rows.next()? {
            visit(TileRow {
                x: as_integer(row.get::<_, Value>(0)?),
                y: as_integer(row.get::<_, Value>(1)?),
                region_id: as_integer(row.get::<_, Value>(2)?),
            });
        }
        Ok(())
    }
}

/// Integral value of a SQLite cell; NULL, text, blobs and fractional or non-finite reals are `None`.
fn as_integer(v: Value) -> Option<i64> {
    match v {
        Value::Integer(i) => Some(i),
        Value::Real(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IngestStats {
    pub accepted: usize,
    pub skipped: usize,
}

/// Validates and groups raw rows into a [`PlaneIndex`].
pub fn build_plane_index<S: TileSource + ?Sized>(
    source: &S,
    plane: i32,
    grid: RegionGrid,
    extent: &WorldExtent,
) -> Result<(PlaneIndex, IngestStats)> {
    let mut builder = PlaneIndexBuilder::new(plane, grid);
    let mut stats = IngestStats::default();
    source.scan_plane(plane, &mut |row| {
        let (Some(x), Some(y)) = (row.x, row.y) else {
            stats.skipped += 1;
            return;
        };
        if !extent.contains(x, y, plane as i64) {
            stats.skipped += 1;
            return;
        }
        let (x, y) = (x as i32, y as i32);
        let computed = grid.region_id(x, y);
        if row.region_id.is_some_and(|stored| stored != computed) {
            stats.skipped += 1;
            return;
        }
        builder.push(computed, x, y);
        stats.accepted += 1;
    })?;
    Ok((builder.finish(), stats))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaneStatus {
    NotLoaded,
    Loading,
    Ready { tiles: usize, regions: usize },
    Unavailable(String),
}

type PlaneSlot = Arc<OnceLock<Result<Arc<PlaneIndex>, CacheError>>>;

/// Owns every loaded [`PlaneIndex`] for the session.
pub struct TileCache {
    source: Box<dyn TileSource>,
    grid: RegionGrid,
    extent: WorldExtent,
    slots: Mutex<HashMap<i32, PlaneSlot>>,
    loads: AtomicUsize,
}

impl TileCache {
    pub fn new(source: Box<dyn TileSource>, grid: RegionGrid, extent: WorldExtent) -> Self {
        Self { source, grid, extent, slots: Mutex::new(HashMap::new()), loads: AtomicUsize::new(0) }
    }

    pub fn with_defaults(source: Box<dyn TileSource>) -> Self {
        Self::new(source, RegionGrid::default(), WorldExtent::default())
    }

    pub fn grid(&self) -> &RegionGrid {
        &self.grid
    }

    /// Index for `plane`, loading it on first use. Later calls never touch the source,
    /// including after a failure.
    pub fn ensure_plane(&self, plane: i32) -> Result<Arc<PlaneIndex>, CacheError> {
        let slot = self.slot(plane);
        slot.get_or_init(|| self.load(plane)).clone()
    }

    /// Index for `plane` only if it is already loaded.
    pub fn cached(&self, plane: i32) -> Option<Arc<PlaneIndex>> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(&plane)?.get()? {
            Ok(index) => Some(Arc::clone(index)),
            Err(_) => None,
        }
    }

    pub fn status(&self, plane: i32) -> PlaneStatus {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get(&plane).map(|slot| slot.get()) {
            None => PlaneStatus::NotLoaded,
            Some(None) => PlaneStatus::Loading,
            Some(Some(Ok(index))) => PlaneStatus::Ready { tiles: index.tile_count(), regions: index.region_count() },
            Some(Some(Err(CacheError::DataSourceUnavailable(reason)))) => PlaneStatus::Unavailable(reason.clone()),
        }
    }

    /// Number of source scans issued so far.
    pub fn loads_issued(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Forgets one plane, so the next request reloads it.
    pub fn reset_plane(&self, plane: i32) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.remove(&plane);
    }

    pub fn reset(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.clear();
    }

    fn slot(&self, plane: i32) -> PlaneSlot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(plane).or_default())
    }

    fn load(&self, plane: i32) -> Result<Arc<PlaneIndex>, CacheError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        log::info!("loading walkable tiles for plane {}", plane);
        match build_plane_index(self.source.as_ref(), plane, self.grid, &self.extent) {
            Ok((index, stats)) => {
                if stats.skipped > 0 {
                    log::warn!("plane {}: skipped {} malformed tile rows", plane, stats.skipped);
                }
                log::info!(
                    "plane {}: {} tiles in {} regions",
                    plane,
                    index.tile_count(),
                    index.region_count()
                );
                Ok(Arc::new(index))
            }
            Err(e) => {
                log::error!("plane {}: tile source unavailable: {:#}", plane, e);
                Err(CacheError::unavailable(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::TileKey;

    struct RowsSource(Vec<TileRow>);

    impl TileSource for RowsSource {
        fn scan_plane(&self, _plane: i32, visit: &mut dyn FnMut(TileRow)) -> Result<()> {
            self.0.iter().copied().for_each(|r| visit(r));
            Ok(())
        }
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let grid = RegionGrid::default();
        let rows = vec![
            TileRow::new(10, 10, grid.region_id(10, 10)),
            TileRow { x: None, y: Some(1), region_id: None },
            TileRow { x: Some(-4), y: Some(1), region_id: None },
            TileRow { x: Some(100), y: Some(100), region_id: Some(7) },
            TileRow { x: Some(70), y: Some(5), region_id: None },
        ];
        let (index, stats) = build_plane_index(&RowsSource(rows), 0, grid, &WorldExtent::default()).unwrap();
        assert_eq!(stats, IngestStats { accepted: 2, skipped: 3 });
        assert!(index.contains(TileKey::new(10, 10)));
        assert!(index.contains(TileKey::new(70, 5)));
    }

    #[test]
    fn sqlite_integers_only() {
        assert_eq!(as_integer(Value::Integer(5)), Some(5));
        assert_eq!(as_integer(Value::Real(6.0)), Some(6));
        assert_eq!(as_integer(Value::Real(6.5)), None);
        assert_eq!(as_integer(Value::Real(f64::NAN)), None);
        assert_eq!(as_integer(Value::Null), None);
        assert_eq!(as_integer(Value::Text("7".into())), None);
    }

    #[test]
    fn status_follows_lifecycle() {
        let cache = TileCache::with_defaults(Box::new(RowsSource(vec![TileRow::new(1, 1, 0)])));
        assert_eq!(cache.status(0), PlaneStatus::NotLoaded);
        assert!(cache.cached(0).is_none());
        cache.ensure_plane(0).unwrap();
        assert_eq!(cache.status(0), PlaneStatus::Ready { tiles: 1, regions: 1 });
        assert!(cache.cached(0).is_some());
        cache.reset();
        assert_eq!(cache.status(0), PlaneStatus::NotLoaded);
    }
}
