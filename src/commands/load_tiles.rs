use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use rusqlite::Connection;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use crate::config::WorldExtent;
use crate::region::RegionGrid;

#[derive(Deserialize, Debug)]
struct WalkFile {
    #[serde(default)]
    tiles: Vec<RawTile>,
}

#[derive(Deserialize, Debug)]
struct RawTile {
    x: Option<i64>,
    y: Option<i64>,
    #[serde(default)]
    plane: Option<i64>,
    #[serde(rename = "walkMask", default)]
    walk_mask: Option<i64>,
}

/// x, y, plane, walk_mask, RegionID
type TileRow = (i64, i64, i64, Option<i64>, i64);

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadStats {
    pub files: usize,
    pub failed_files: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub overrides: usize,
}

struct FileBatch {
    tile_rows: Vec<TileRow>,
    skipped: usize,
}

pub fn cmd_load_tiles(json_folder: &Path, db_path: &Path, overrides_path: Option<&Path>) -> Result<()> {
    println!("Using JSON folder: {}", json_folder.display());
    println!("Using DB file    : {}", db_path.display());

    let stats = load_tiles(json_folder, db_path, overrides_path, RegionGrid::default(), &WorldExtent::default())?;

    println!(
        "Loaded {} tiles from {} files into {} ({} skipped, {} overrides)",
        stats.inserted,
        stats.files,
        db_path.display(),
        stats.skipped,
        stats.overrides
    );
    if stats.failed_files > 0 {
        println!("{} files could not be read; see log for details", stats.failed_files);
    }
    Ok(())
}

pub fn load_tiles(
    json_folder: &Path,
    db_path: &Path,
    overrides_path: Option<&Path>,
    grid: RegionGrid,
    extent: &WorldExtent,
) -> Result<LoadStats> {
    let mut conn = crate::db::open_rw(db_path)
        .with_context(|| format!("Failed to open DB at {}", db_path.display()))?;

    crate::db::create_tables(&mut conn)?;
    let mut stats = load_json_files(json_folder, &mut conn, grid, extent)?;

    if let Some(overrides_path) = overrides_path {
        stats.overrides = apply_overrides_file(overrides_path, &mut conn, grid, extent)?;
    }
    Ok(stats)
}

fn load_json_files(folder: &Path, conn: &mut Connection, grid: RegionGrid, extent: &WorldExtent) -> Result<LoadStats> {
    if !folder.exists() {
        bail!("JSON folder not found: {}", folder.display());
    }

    let mut file_entries: Vec<_> = fs::read_dir(folder)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    file_entries.sort();

    let mut stats = LoadStats { files: file_entries.len(), ..LoadStats::default() };

    // Files are parsed in parallel; a single writer drains the channel.
    let (tx_msg, rx_msg) = mpsc::channel::<FileBatch>();
    let extent = *extent;
    let producer = {
        let tx_msg = tx_msg.clone();
        thread::spawn(move || {
            file_entries
                .into_par_iter()
                .map_with(tx_msg, |s, path| match parse_file_and_stream(&path, s, grid, &extent) {
                    Ok(()) => 0usize,
                    Err(e) => {
                        log::error!("Error processing {}: {:#}", path.display(), e);
                        1
                    }
                })
                .sum::<usize>()
        })
    };
    drop(tx_msg);

    let txw = conn.transaction()?;
    {
        let mut tiles_stmt = txw.prepare(
            "INSERT OR REPLACE INTO tiles (x, y, plane, walk_mask, RegionID) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for batch in rx_msg {
            stats.skipped += batch.skipped;
            for (x, y, plane, walk_mask, region_id) in batch.tile_rows {
                tiles_stmt.execute(rusqlite::params![x, y, plane, walk_mask, region_id])?;
                stats.inserted += 1;
            }
        }
    }
    txw.commit()?;

    stats.failed_files = producer
        .join()
        .map_err(|_| anyhow::anyhow!("tile parser thread panicked"))?;
    Ok(stats)
}

fn parse_file_and_stream(
    path: &Path,
    sender: &mpsc::Sender<FileBatch>,
    grid: RegionGrid,
    extent: &WorldExtent,
) -> Result<()> {
    log::debug!("Loading {}...", path.display());
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let data: WalkFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse JSON {}", path.display()))?;
    if data.tiles.is_empty() {
        return Ok(());
    }

    const SUB_BATCH: usize = 1_000_000;
    let mut rows: Vec<TileRow> = Vec::with_capacity(data.tiles.len().min(SUB_BATCH));
    let mut skipped = 0usize;
    for t in data.tiles {
        let (Some(x), Some(y)) = (t.x, t.y) else {
            skipped += 1;
            continue;
        };
        let plane = t.plane.unwrap_or(0);
        if !extent.contains(x, y, plane) {
            skipped += 1;
            continue;
        }
        rows.push((x, y, plane, t.walk_mask, grid.region_id(x as i32, y as i32)));
        if rows.len() >= SUB_BATCH {
            sender
                .send(FileBatch { tile_rows: std::mem::take(&mut rows), skipped: std::mem::take(&mut skipped) })
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
    }
    if !rows.is_empty() || skipped > 0 {
        sender
            .send(FileBatch { tile_rows: rows, skipped })
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }
    Ok(())
}

/// Lines of `x,y,plane,walk_mask`; each one upserts a tile.
fn apply_overrides_file(path: &Path, conn: &mut Connection, grid: RegionGrid, extent: &WorldExtent) -> Result<usize> {
    if !path.exists() {
        bail!("Overrides file not found: {}", path.display());
    }
    log::info!("Applying overrides from {}", path.display());
    let file = File::open(path).with_context(|| format!("open overrides file {}", path.display()))?;
    let reader = BufReader::new(file);

    crate::db::with_tx(conn, |tx| {
        let mut stmt = tx.prepare(
            "INSERT INTO tiles (x, y, plane, walk_mask, RegionID) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(x, y, plane) DO UPDATE SET walk_mask=excluded.walk_mask, RegionID=excluded.RegionID",
        )?;
        let mut applied = 0usize;
        for (idx, line_res) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line_res.with_context(|| format!("read overrides line {}", line_no))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = trimmed.split(',').map(|s| s.trim()).collect();
            if parts.len() != 4 {
                bail!(
                    "Invalid overrides line {} in {}: expected 4 comma-separated values (x,y,plane,walk_mask)",
                    line_no,
                    path.display()
                );
            }
            let x: i64 = parts[0].parse().with_context(|| format!("parse x on line {}", line_no))?;
            let y: i64 = parts[1].parse().with_context(|| format!("parse y on line {}", line_no))?;
            let plane: i64 = parts[2].parse().with_context(|| format!("parse plane on line {}", line_no))?;
            let walk_mask: i64 = parts[3].parse().with_context(|| format!("parse walk_mask on line {}", line_no))?;
            if !extent.contains(x, y, plane) {
                log::warn!("overrides line {}: ({}, {}, {}) is outside the map; ignored", line_no, x, y, plane);
                continue;
            }
            let region_id = grid.region_id(x as i32, y as i32);
            stmt.execute(rusqlite::params![x, y, plane, walk_mask, region_id])?;
            applied += 1;
        }
        Ok(applied)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_json_and_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let json_dir = dir.path().join("walk");
        fs::create_dir(&json_dir)?;
        fs::write(
            json_dir.join("a.json"),
            r#"{"tiles":[{"x":3200,"y":3200,"plane":0,"walkMask":1},
                         {"x":-1,"y":5,"plane":0},
                         {"x":64,"y":64,"plane":1}]}"#,
        )?;
        fs::write(json_dir.join("broken.json"), "{ not json")?;
        fs::write(json_dir.join("notes.txt"), "ignored")?;

        let mut overrides = tempfile::NamedTempFile::new()?;
        writeln!(overrides, "# extra")?;
        writeln!(overrides, "3201,3200,0,1")?;
        writeln!(overrides, "3200,3200,0,5")?;

        let db_path = dir.path().join("tiles.db");
        let stats = load_tiles(&json_dir, &db_path, Some(overrides.path()), RegionGrid::default(), &WorldExtent::default())?;
        assert_eq!(stats.files, 2);
        assert_eq!(stats.failed_files, 1);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.overrides, 2);

        let conn = Connection::open(&db_path)?;
        let (mask, region): (i64, i64) = conn.query_row(
            "SELECT walk_mask, RegionID FROM tiles WHERE x = 3200 AND y = 3200 AND plane = 0",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        assert_eq!(mask, 5);
        assert_eq!(region, (50 << 8) + 50);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tiles", [], |r| r.get(0))?;
        assert_eq!(count, 3);
        Ok(())
    }

    #[test]
    fn bad_override_line_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let json_dir = dir.path().join("walk");
        fs::create_dir(&json_dir)?;
        let mut overrides = tempfile::NamedTempFile::new()?;
        writeln!(overrides, "1,2,3")?;
        let err = load_tiles(&json_dir, &dir.path().join("t.db"), Some(overrides.path()), RegionGrid::default(), &WorldExtent::default())
            .unwrap_err();
        assert!(err.to_string().contains("Invalid overrides line 1"));
        Ok(())
    }
}
