use anyhow::Result;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Transport node tables, one per sheet of the transport workbook.
pub const TELEPORT_NODE_TABLES: &[&str] = &[
    "teleports_door_nodes",
    "teleports_item_nodes",
    "teleports_npc_nodes",
    "teleports_object_nodes",
    "teleports_lodestone_nodes",
    "teleports_fairy_rings_nodes",
];

pub fn open_ro<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    // Wait a bit for locks to clear when a loader holds the DB
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(conn)
}

pub fn open_rw<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA temp_store=MEMORY;")?;
    Ok(conn)
}

pub fn with_tx<T, F: FnOnce(&Transaction) -> Result<T>>(conn: &mut Connection, f: F) -> Result<T> {
    // IMMEDIATE to acquire a reserved lock up-front, reducing mid-transaction lock errors
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

pub fn create_tables(conn: &mut Connection) -> Result<()> {
    if table_exists(conn, "tiles")? {
        let required: BTreeSet<&'static str> = ["x", "y", "plane"].into_iter().collect();
        if !table_has_columns(conn, "tiles", &required)? {
            conn.execute("DROP TABLE tiles", [])?;
        } else {
            ensure_region_column(conn)?;
        }
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tiles (
            x INTEGER NOT NULL,
            y INTEGER NOT NULL,
            plane INTEGER NOT NULL,
            walk_mask INTEGER,
            RegionID INTEGER,
            PRIMARY KEY (x, y, plane)
        );

        CREATE INDEX IF NOT EXISTS idx_tiles_plane ON tiles(plane);

        CREATE TABLE IF NOT EXISTS teleports_door_nodes (
            id	INTEGER PRIMARY KEY,
            direction	TEXT,
            real_id_open	INTEGER,
            real_id_closed	INTEGER,
            tile_inside_x	INTEGER,
            tile_inside_y	INTEGER,
            tile_inside_plane	INTEGER,
            tile_outside_x	INTEGER,
            tile_outside_y	INTEGER,
            tile_outside_plane	INTEGER,
            open_action	TEXT
        );

        CREATE TABLE IF NOT EXISTS teleports_item_nodes (
            id	INTEGER PRIMARY KEY,
            item_id	INTEGER,
            name	TEXT,
            action	TEXT,
            dest_min_x	INTEGER,
            dest_max_x	INTEGER,
            dest_min_y	INTEGER,
            dest_max_y	INTEGER,
            dest_plane	INTEGER
        );

        CREATE TABLE IF NOT EXISTS teleports_npc_nodes (
            id	INTEGER PRIMARY KEY,
            npc_id	INTEGER,
            npc_name	TEXT,
            action	TEXT,
            dest_min_x	INTEGER,
            dest_max_x	INTEGER,
            dest_min_y	INTEGER,
            dest_max_y	INTEGER,
            dest_plane	INTEGER,
            orig_min_x	INTEGER,
            orig_max_x	INTEGER,
            orig_min_y	INTEGER,
            orig_max_y	INTEGER,
            orig_plane	INTEGER
        );

        CREATE TABLE IF NOT EXISTS teleports_object_nodes (
            id	INTEGER PRIMARY KEY,
            object_id	INTEGER,
            object_name	TEXT,
            action	TEXT,
            dest_min_x	INTEGER,
            dest_max_x	INTEGER,
            dest_min_y	INTEGER,
            dest_max_y	INTEGER,
            dest_plane	INTEGER,
            orig_min_x	INTEGER,
            orig_max_x	INTEGER,
            orig_min_y	INTEGER,
            orig_max_y	INTEGER,
            orig_plane	INTEGER
        );

        CREATE TABLE IF NOT EXISTS teleports_lodestone_nodes (
            id	INTEGER PRIMARY KEY,
            lodestone	TEXT,
            dest_x	INTEGER,
            dest_y	INTEGER,
            dest_plane	INTEGER
        );

        CREATE TABLE IF NOT EXISTS teleports_fairy_rings_nodes (
            id	INTEGER PRIMARY KEY,
            object_id	INTEGER,
            x	INTEGER,
            y	INTEGER,
            plane	INTEGER,
            code	TEXT,
            action	TEXT
        );
    "#,
    )?;

    Ok(())
}

/// Older tile databases carry no RegionID column; add it and backfill from x/y.
fn ensure_region_column(conn: &Connection) -> Result<()> {
    let required: BTreeSet<&'static str> = ["RegionID"].into_iter().collect();
    if table_has_columns(conn, "tiles", &required)? {
        return Ok(());
    }
    log::info!("tiles table has no RegionID column; adding and backfilling");
    conn.execute_batch(
        "ALTER TABLE tiles ADD COLUMN RegionID INTEGER;
         UPDATE tiles SET RegionID = ((x >> 6) << 8) + (y >> 6);",
    )?;
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn table_has_columns(conn: &Connection, table: &str, required: &BTreeSet<&str>) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    let mut present = BTreeSet::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        present.insert(name.to_ascii_lowercase());
    }
    Ok(required.iter().all(|c| present.contains(&c.to_ascii_lowercase())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn create_tables_creates_required_tables() -> Result<()> {
        let tmp = NamedTempFile::new().unwrap();
        let mut conn = open_rw(tmp.path())?;
        create_tables(&mut conn)?;

        assert!(table_exists(&conn, "tiles")?);
        for t in TELEPORT_NODE_TABLES {
            assert!(table_exists(&conn, t)?, "expected table {} to exist", t);
        }
        // idempotent
        create_tables(&mut conn)?;
        Ok(())
    }

    #[test]
    fn legacy_tiles_table_gets_region_ids() -> Result<()> {
        let tmp = NamedTempFile::new().unwrap();
        let mut conn = open_rw(tmp.path())?;
        conn.execute_batch(
            "CREATE TABLE tiles (x INTEGER, y INTEGER, plane INTEGER, walk_mask INTEGER);
             INSERT INTO tiles VALUES (3200, 3200, 0, 1);
             INSERT INTO tiles VALUES (63, 64, 0, 1);",
        )?;
        create_tables(&mut conn)?;

        let ids: Vec<i64> = conn
            .prepare("SELECT RegionID FROM tiles ORDER BY x")?
            .query_map([], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        assert_eq!(ids, vec![crate::region::region_id(63, 64), crate::region::region_id(3200, 3200)]);
        Ok(())
    }

    #[test]
    fn open_ro_fails_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_ro(dir.path().join("nope.db")).is_err());
    }
}
