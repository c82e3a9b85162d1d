//! Transport feature sources: the `teleports_*` tables of a SQLite database, or
//! the same sheets in an `.xlsx` workbook (local file or Google Sheets export).

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, DataType, Reader};
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use url::Url;

use crate::bounds::Rect;
use crate::db::{open_ro, table_exists, TELEPORT_NODE_TABLES};
use crate::transport::{DestArea, Point, TransportKind, TransportRecord};

/// One source row, keyed by lower-cased column name.
pub type RawRow = BTreeMap<String, Value>;

pub trait FeatureSource: Send + Sync {
    fn load_records(&self) -> Result<Vec<TransportRecord>>;
}

pub fn kind_for_table(table: &str) -> Option<TransportKind> {
    match table.to_ascii_lowercase().trim_start_matches("teleports_") {
        "door_nodes" => Some(TransportKind::Door),
        "item_nodes" => Some(TransportKind::Item),
        "npc_nodes" => Some(TransportKind::Npc),
        "object_nodes" => Some(TransportKind::Object),
        "lodestone_nodes" => Some(TransportKind::Lodestone),
        "fairy_rings_nodes" => Some(TransportKind::FairyRing),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct SqliteFeatureSource {
    path: PathBuf,
}

impl SqliteFeatureSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl FeatureSource for SqliteFeatureSource {
    fn load_records(&self) -> Result<Vec<TransportRecord>> {
        let conn = open_ro(&self.path).with_context(|| format!("open feature database {}", self.path.display()))?;
        let mut out = Vec::new();
        for table in TELEPORT_NODE_TABLES {
            let Some(kind) = kind_for_table(table) else { continue };
            if !table_exists(&conn, table)? {
                log::debug!("feature table {} missing; skipping", table);
                continue;
            }
            let mut stmt = conn.prepare(&format!("SELECT * FROM {}", table))?;
            let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_ascii_lowercase()).collect();
            let mut rows = stmt.query([])?;
            let mut raw_rows = Vec::new();
            while let Some(row) = rows.next()? {
                let mut map = RawRow::new();
                for (i, name) in names.iter().enumerate() {
                    map.insert(name.clone(), row.get::<_, Value>(i)?);
                }
                raw_rows.push(map);
            }
            out.extend(records_from_rows(kind, &raw_rows));
        }
        Ok(out)
    }
}

/// Reads node sheets from an `.xlsx` file or a Google Sheets document URL.
#[derive(Clone, Debug)]
pub struct WorkbookFeatureSource {
    location: String,
}

impl WorkbookFeatureSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self { location: location.into() }
    }
}

impl FeatureSource for WorkbookFeatureSource {
    fn load_records(&self) -> Result<Vec<TransportRecord>> {
        if is_google_sheets_url(&self.location) {
            let tmp = download_google_sheet_as_xlsx(&self.location)?;
            read_workbook(tmp.path())
        } else {
            let p = PathBuf::from(&self.location);
            if !p.exists() {
                bail!("workbook not found: {}", p.display());
            }
            read_workbook(&p)
        }
    }
}

fn read_workbook(path: &Path) -> Result<Vec<TransportRecord>> {
    let mut wb = open_workbook_auto(path).with_context(|| format!("open workbook {}", path.display()))?;
    let sheet_names: Vec<String> = wb.sheet_names().into_iter().cloned().collect();
    let mut out = Vec::new();
    for sheet in sheet_names {
        let Some(kind) = kind_for_table(&sheet) else {
            log::debug!("skipping worksheet '{}' (not a transport sheet)", sheet);
            continue;
        };
        match wb.worksheet_range(&sheet) {
            Some(Ok(range)) => {
                let rows = read_worksheet(&range);
                log::debug!("worksheet '{}': {} rows", sheet, rows.len());
                out.extend(records_from_rows(kind, &rows));
            }
            _ => log::warn!("skipping worksheet '{}' (unable to read range)", sheet),
        }
    }
    Ok(out)
}

fn read_worksheet(range: &calamine::Range<DataType>) -> Vec<RawRow> {
    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else { return Vec::new() };
    let headers: Vec<Option<String>> = header_row
        .iter()
        .map(|h| {
            let s = h.to_string();
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_ascii_lowercase()) }
        })
        .collect();

    let mut out = Vec::new();
    for data_row in rows_iter {
        let mut map = RawRow::new();
        for (cell, header) in data_row.iter().zip(headers.iter()) {
            let Some(header) = header else { continue };
            let value = cell_value(cell);
            if value != Value::Null {
                map.insert(header.clone(), value);
            }
        }
        if !map.is_empty() {
            out.push(map);
        }
    }
    out
}

fn cell_value(cell: &DataType) -> Value {
    match cell {
        DataType::Int(i) => Value::Integer(*i),
        DataType::Float(f) | DataType::DateTime(f) => Value::Real(*f),
        DataType::Bool(b) => Value::Integer(*b as i64),
        DataType::String(s) => {
            let t = s.trim();
            if t.is_empty() { Value::Null } else { Value::Text(t.to_string()) }
        }
        _ => Value::Null,
    }
}

fn is_google_sheets_url(s: &str) -> bool {
    if let Ok(url) = Url::parse(s) {
        (url.scheme() == "http" || url.scheme() == "https")
            && url.domain().map(|d| d.contains("docs.google.com")).unwrap_or(false)
            && url.path().contains("/spreadsheets/")
    } else {
        false
    }
}

fn build_gsheet_export_url(doc_url: &str) -> Result<String> {
    let url = Url::parse(doc_url)?;
    // /spreadsheets/d/<sheet_id>/edit
    let parts: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    let sheet_id = parts
        .windows(2)
        .find(|w| w[0] == "d")
        .map(|w| w[1]);
    let Some(sheet_id) = sheet_id else { bail!("Unable to parse Google Sheets ID from URL") };
    Ok(format!("https://docs.google.com/spreadsheets/d/{}/export?format=xlsx", sheet_id))
}

fn download_google_sheet_as_xlsx(doc_url: &str) -> Result<tempfile::NamedTempFile> {
    let export = build_gsheet_export_url(doc_url)?;
    log::info!("downloading transport workbook from {}", export);
    let resp = reqwest::blocking::get(&export).with_context(|| format!("Download {}", export))?;
    if !resp.status().is_success() {
        bail!("Failed to download Google Sheet: HTTP {}", resp.status());
    }
    let bytes = resp.bytes()?;
    // calamine picks the reader from the extension
    let mut tmp = tempfile::Builder::new().suffix(".xlsx").tempfile()?;
    tmp.as_file_mut().write_all(&bytes)?;
    Ok(tmp)
}

fn num(row: &RawRow, col: &str) -> Option<f64> {
    match row.get(col)? {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(f) if f.is_finite() => Some(*f),
        Value::Text(t) => t.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn text(row: &RawRow, col: &str) -> Option<String> {
    match row.get(col)? {
        Value::Text(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
        Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn plane(row: &RawRow, col: &str) -> i32 {
    num(row, col).map(|p| p as i32).unwrap_or(0)
}

fn point(row: &RawRow, x: &str, y: &str, p: &str) -> Option<Point> {
    Some(Point::new(num(row, x)?, num(row, y)?, plane(row, p)))
}

fn area(row: &RawRow, prefix: &str, plane_col: &str) -> Option<DestArea> {
    let rect = Rect::new(
        num(row, &format!("{}_min_x", prefix))?,
        num(row, &format!("{}_max_x", prefix))?,
        num(row, &format!("{}_min_y", prefix))?,
        num(row, &format!("{}_max_y", prefix))?,
    );
    Some(DestArea { rect, plane: plane(row, plane_col) })
}

fn area_center(a: Option<DestArea>) -> Option<Point> {
    a.map(|a| {
        let (x, y) = a.rect.center();
        Point::new(x, y, a.plane)
    })
}

/// Converts raw rows of one node table into records. Rows without an id or a usable
/// location are dropped.
pub fn records_from_rows(kind: TransportKind, rows: &[RawRow]) -> Vec<TransportRecord> {
    let mut out = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;
    for row in rows {
        match record_from_row(kind, row) {
            Some(rec) => out.push(rec),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::debug!("{}: skipped {} malformed rows", kind, skipped);
    }
    out
}

fn record_from_row(kind: TransportKind, row: &RawRow) -> Option<TransportRecord> {
    let id = num(row, "id").map(|v| v as i64).filter(|&v| v != 0)?;
    let mut rec = TransportRecord {
        id,
        kind,
        name: String::new(),
        action: String::new(),
        source: None,
        destination: None,
        dest_area: None,
        destination_only: false,
    };

    match kind {
        TransportKind::Door => {
            rec.source = Some(point(row, "tile_inside_x", "tile_inside_y", "tile_inside_plane")?);
            rec.destination = point(row, "tile_outside_x", "tile_outside_y", "tile_outside_plane");
            let direction = text(row, "direction").unwrap_or_default();
            rec.name = if direction.is_empty() { "Door".to_string() } else { format!("Door ({})", direction) };
            rec.action = text(row, "open_action").unwrap_or_else(|| "Open".to_string());
        }
        TransportKind::Item => {
            rec.dest_area = area(row, "dest", "dest_plane");
            let center = area_center(rec.dest_area).filter(|p| p.x != 0.0 && p.y != 0.0)?;
            rec.destination = Some(center);
            rec.destination_only = true;
            rec.name = text(row, "name").unwrap_or_else(|| {
                format!("Item #{}", text(row, "item_id").unwrap_or_default())
            });
            rec.action = text(row, "action").unwrap_or_else(|| "Teleport".to_string());
        }
        TransportKind::Npc | TransportKind::Object => {
            let origin = area_center(area(row, "orig", "orig_plane")).filter(|p| p.x != 0.0 && p.y != 0.0)?;
            rec.source = Some(origin);
            rec.dest_area = area(row, "dest", "dest_plane");
            rec.destination = area_center(rec.dest_area);
            if kind == TransportKind::Npc {
                rec.name = text(row, "npc_name")
                    .unwrap_or_else(|| format!("NPC #{}", text(row, "npc_id").unwrap_or_default()));
                rec.action = text(row, "action").unwrap_or_else(|| "Talk-to".to_string());
            } else {
                rec.name = text(row, "object_name")
                    .unwrap_or_else(|| format!("Object #{}", text(row, "object_id").unwrap_or_default()));
                rec.action = text(row, "action").unwrap_or_else(|| "Use".to_string());
            }
        }
        TransportKind::FairyRing => {
            let p = point(row, "x", "y", "plane")?;
            rec.source = Some(p);
            rec.destination = Some(p);
            rec.name = text(row, "code").map(|c| format!("Fairy ring {}", c)).unwrap_or_else(|| "Fairy ring".to_string());
            rec.action = text(row, "action").unwrap_or_else(|| "Use".to_string());
        }
        TransportKind::Lodestone => {
            rec.destination = Some(point(row, "dest_x", "dest_y", "dest_plane")?);
            rec.destination_only = true;
            rec.name = text(row, "lodestone").unwrap_or_else(|| "Lodestone".to_string());
            rec.action = "Teleport".to_string();
        }
    }
    Some(rec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> RawRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn table_names_map_to_kinds() {
        assert_eq!(kind_for_table("teleports_door_nodes"), Some(TransportKind::Door));
        assert_eq!(kind_for_table("Fairy_Rings_Nodes"), Some(TransportKind::FairyRing));
        assert_eq!(kind_for_table("teleports_requirements"), None);
    }

    #[test]
    fn door_row_uses_inside_as_source() {
        let r = row(&[
            ("id", Value::Integer(4)),
            ("direction", Value::Text("IN".into())),
            ("tile_inside_x", Value::Integer(3200)),
            ("tile_inside_y", Value::Integer(3201)),
            ("tile_outside_x", Value::Integer(3200)),
            ("tile_outside_y", Value::Integer(3202)),
            ("tile_outside_plane", Value::Integer(1)),
        ]);
        let rec = record_from_row(TransportKind::Door, &r).unwrap();
        assert_eq!(rec.source, Some(Point::new(3200.0, 3201.0, 0)));
        assert_eq!(rec.destination, Some(Point::new(3200.0, 3202.0, 1)));
        assert_eq!(rec.action, "Open");
        assert_eq!(rec.name, "Door (IN)");
    }

    #[test]
    fn npc_row_centers_rects() {
        let r = row(&[
            ("id", Value::Integer(1)),
            ("npc_name", Value::Text("Captain".into())),
            ("orig_min_x", Value::Integer(10)),
            ("orig_max_x", Value::Integer(12)),
            ("orig_min_y", Value::Integer(20)),
            ("orig_max_y", Value::Integer(20)),
            ("dest_min_x", Value::Integer(100)),
            ("dest_max_x", Value::Integer(104)),
            ("dest_min_y", Value::Integer(200)),
            ("dest_max_y", Value::Integer(202)),
            ("dest_plane", Value::Integer(2)),
        ]);
        let rec = record_from_row(TransportKind::Npc, &r).unwrap();
        assert_eq!(rec.source, Some(Point::new(11.0, 20.0, 0)));
        assert_eq!(rec.dest_point(), Some(Point::new(102.0, 201.0, 2)));
        assert_eq!(rec.action, "Talk-to");
    }

    #[test]
    fn malformed_rows_are_dropped() {
        let rows = vec![
            row(&[("id", Value::Integer(0)), ("x", Value::Integer(1)), ("y", Value::Integer(1))]),
            row(&[("id", Value::Integer(2)), ("x", Value::Text("north".into())), ("y", Value::Integer(1))]),
            row(&[("id", Value::Integer(3)), ("x", Value::Real(5.0)), ("y", Value::Text("6".into()))]),
        ];
        let recs = records_from_rows(TransportKind::FairyRing, &rows);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id, 3);
        assert_eq!(recs[0].source, Some(Point::new(5.0, 6.0, 0)));
    }

    #[test]
    fn item_rows_are_destination_only() {
        let r = row(&[
            ("id", Value::Integer(7)),
            ("item_id", Value::Integer(8007)),
            ("dest_min_x", Value::Integer(3210)),
            ("dest_max_x", Value::Integer(3214)),
            ("dest_min_y", Value::Integer(3420)),
            ("dest_max_y", Value::Integer(3424)),
        ]);
        let rec = record_from_row(TransportKind::Item, &r).unwrap();
        assert!(rec.destination_only);
        assert_eq!(rec.name, "Item #8007");
        assert_eq!(rec.dest_point(), Some(Point::new(3212.0, 3422.0, 0)));
    }

    #[test]
    fn google_sheet_urls() {
        let url = "https://docs.google.com/spreadsheets/d/abc123/edit#gid=0";
        assert!(is_google_sheets_url(url));
        assert!(!is_google_sheets_url("/tmp/transports.xlsx"));
        assert_eq!(
            build_gsheet_export_url(url).unwrap(),
            "https://docs.google.com/spreadsheets/d/abc123/export?format=xlsx"
        );
    }
}
