use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bounds::{Bounds, TileBounds};
use crate::config::{parse_point, MapConfig};
use crate::distance::{DistanceTool, Measurement};
use crate::features::{FeatureSource, SqliteFeatureSource, WorkbookFeatureSource};
use crate::links::{JsonLinkSource, LinkCache, LinkCategory};
use crate::overlay::{OverlayUpdate, WalkableOverlay};
use crate::pathfinder::compress_path;
use crate::region::TileKey;
use crate::tile_cache::{SqliteTileSource, TileCache};
use crate::transport::{FeatureCache, TransportKind};
use crate::viewport::Viewport;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewArgs {
    pub plane: i32,
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

fn tiles_db(cfg: &MapConfig) -> Result<PathBuf> {
    match cfg.tiles_db.clone() {
        Some(path) => Ok(path),
        None => bail!("no tile database configured"),
    }
}

/// A missing or unreadable database surfaces through the cache as an unavailable plane.
fn open_cache(cfg: &MapConfig) -> Result<Arc<TileCache>> {
    let source = SqliteTileSource::new(tiles_db(cfg)?);
    Ok(Arc::new(TileCache::new(Box::new(source), cfg.grid, cfg.extent)))
}

pub fn tiles_update(cfg: &MapConfig, view: ViewArgs, zoom: i32, limit: Option<usize>) -> Result<OverlayUpdate> {
    let mut overlay = WalkableOverlay::new(open_cache(cfg)?, cfg);
    overlay.set_enabled(true);
    if let Some(limit) = limit {
        if overlay.set_tile_limit(limit) && overlay.tile_limit() != limit {
            log::warn!("tile limit {} clamped to {}", limit, overlay.tile_limit());
        }
    }

    let viewport = Viewport::from_world(view.west, view.east, view.south, view.north, view.plane, zoom);
    if zoom >= cfg.min_zoom {
        let pending = overlay.pending_status(view.plane);
        if !pending.is_empty() {
            println!("{}", pending);
        }
    }
    Ok(overlay.refresh(&viewport))
}

pub fn cmd_tiles(cfg: &MapConfig, view: ViewArgs, zoom: i32, limit: Option<usize>, list: bool) -> Result<()> {
    let update = tiles_update(cfg, view, zoom, limit)?;
    println!("{}", update.status);
    if list {
        for t in &update.tiles {
            println!("{},{}", t.x, t.y);
        }
    }
    Ok(())
}

pub fn cmd_path(cfg: &MapConfig, plane: i32, from: &str, to: &str, breakpoints: bool) -> Result<()> {
    let (sx, sy) = parse_point(from).with_context(|| format!("invalid start point '{}', expected x,y", from))?;
    let (ex, ey) = parse_point(to).with_context(|| format!("invalid end point '{}', expected x,y", to))?;

    let cache = open_cache(cfg)?;
    if let Err(e) = cache.ensure_plane(plane) {
        log::warn!("plane {}: {}", plane, e);
    }
    let tool = DistanceTool::new(cache, cfg);
    match tool.measure(plane, TileKey::new(sx, sy), TileKey::new(ex, ey)) {
        Measurement::Path { tiles, distance } => {
            println!("Distance: {} tiles", distance);
            let shown = if breakpoints { compress_path(&tiles) } else { tiles };
            for t in shown {
                println!("{},{}", t.x, t.y);
            }
        }
        Measurement::Fallback { distance, reason, .. } => {
            println!("Distance: {} tiles (straight line; {})", distance, reason.message());
        }
    }
    Ok(())
}

pub fn parse_kinds(kinds: &[String]) -> Result<BTreeSet<TransportKind>> {
    if kinds.is_empty() {
        return Ok(TransportKind::ALL.into_iter().collect());
    }
    kinds
        .iter()
        .flat_map(|k| k.split(','))
        .filter(|k| !k.trim().is_empty())
        .map(|k| k.parse::<TransportKind>())
        .collect()
}

pub fn cmd_transports(cfg: &MapConfig, view: ViewArgs, kinds: &[String], workbook: Option<&str>) -> Result<()> {
    let kinds = parse_kinds(kinds)?;
    let source: Box<dyn FeatureSource> = match workbook {
        Some(location) => Box::new(WorkbookFeatureSource::new(location)),
        None => {
            let path = match cfg.features_db.clone() {
                Some(p) => p,
                None => tiles_db(cfg)?,
            };
            Box::new(SqliteFeatureSource::new(path))
        }
    };
    let features = FeatureCache::new(source);
    let bounds = Bounds::new(view.west, view.east, view.south, view.north);
    let out = features.view(view.plane, &bounds, &kinds);
    println!("{}", out.status);

    if let Ok(index) = features.ensure() {
        for group in &out.groups {
            println!("({}, {}) {:?}", group.x, group.y, group.anchor);
            for &node in &group.nodes {
                let rec = index.record(node);
                let marker = if node.shadow { " [dest]" } else { "" };
                println!("  {} {} #{} {}: {}{}", rec.kind.color(), rec.kind, rec.id, rec.name, rec.action, marker);
            }
        }
    }
    Ok(())
}

pub fn parse_categories(categories: &[String]) -> Result<BTreeSet<LinkCategory>> {
    if categories.is_empty() {
        return Ok(LinkCategory::ALL.into_iter().collect());
    }
    categories
        .iter()
        .flat_map(|c| c.split(','))
        .filter(|c| !c.trim().is_empty())
        .map(|c| c.parse::<LinkCategory>())
        .collect()
}

pub fn cmd_links(cfg: &MapConfig, view: ViewArgs, categories: &[String]) -> Result<()> {
    let categories = parse_categories(categories)?;
    let path = cfg.links_file.clone().unwrap_or_else(crate::util::default_links_file);
    let links = LinkCache::new(Box::new(JsonLinkSource::new(path)));
    let bounds = TileBounds::from_world(view.west, view.east, view.south, view.north);
    let out = links.view(view.plane, &bounds, &categories);
    println!("{}", out.status);

    if let Ok(index) = links.ensure() {
        for group in &out.groups {
            println!("({}, {}) {:?}", group.x, group.y, group.anchor);
            for &node in &group.nodes {
                let e = index.entry(node);
                let arrow = if e.oneway { "->" } else { "<->" };
                let dest = e
                    .dest_xy()
                    .map(|(x, y)| format!("({}, {}, {})", x, y, e.dest_plane()))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "  {} {} #{} {} {} {}",
                    node.category.color(),
                    node.category.label(),
                    e.row_number.unwrap_or_default(),
                    e.group_name,
                    arrow,
                    dest
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_region(cfg: &MapConfig, x: i32, y: i32) -> Result<()> {
    let (rx, ry) = cfg.grid.region_coords(x, y);
    let (cx, cy) = cfg.grid.region_center(rx, ry);
    println!("Tile ({}, {}) -> region {} (x {}, y {}), centre ({}, {})", x, y, cfg.grid.pack(rx, ry), rx, ry, cx, cy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_default_to_all() -> Result<()> {
        assert_eq!(parse_kinds(&[])?.len(), TransportKind::ALL.len());
        let picked = parse_kinds(&["door,npcs".to_string(), "fairy-ring".to_string()])?;
        assert_eq!(
            picked.into_iter().collect::<Vec<_>>(),
            vec![TransportKind::Door, TransportKind::Npc, TransportKind::FairyRing]
        );
        assert!(parse_kinds(&["boat".to_string()]).is_err());
        Ok(())
    }

    #[test]
    fn missing_database_reports_unavailable_status() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cfg = MapConfig { tiles_db: Some(dir.path().join("absent.db")), ..MapConfig::default() };
        let view = ViewArgs { plane: 0, west: 0.0, east: 10.0, south: 0.0, north: 10.0 };
        let update = tiles_update(&cfg, view, 0, None)?;
        assert_eq!(update.status, crate::overlay::STATUS_UNAVAILABLE);
        assert!(update.tiles.is_empty());
        Ok(())
    }

    #[test]
    fn categories_default_to_all() -> Result<()> {
        assert_eq!(parse_categories(&[])?.len(), LinkCategory::ALL.len());
        let picked = parse_categories(&["doors,fairy_rings".to_string()])?;
        assert_eq!(picked.into_iter().collect::<Vec<_>>(), vec![LinkCategory::Doors, LinkCategory::FairyRings]);
        Ok(())
    }
}
