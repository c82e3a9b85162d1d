//! Transport overlay: nodes per plane, shadow copies for cross-plane links, and
//! the viewport visibility filter.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{bail, Result};

use crate::bounds::{point_in_bounds, rect_intersects_bounds, segment_intersects_bounds, Bounds, Rect};
use crate::error::CacheError;
use crate::features::FeatureSource;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TransportKind {
    Door,
    Item,
    Npc,
    Object,
    FairyRing,
    Lodestone,
}

impl TransportKind {
    pub const ALL: [TransportKind; 6] = [
        TransportKind::Door,
        TransportKind::Item,
        TransportKind::Npc,
        TransportKind::Object,
        TransportKind::FairyRing,
        TransportKind::Lodestone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Door => "door",
            TransportKind::Item => "item",
            TransportKind::Npc => "npc",
            TransportKind::Object => "object",
            TransportKind::FairyRing => "fairy_ring",
            TransportKind::Lodestone => "lodestone",
        }
    }

    /// Marker colour used by the map front end.
    pub fn color(self) -> &'static str {
        match self {
            TransportKind::Door => "#e67e22",
            TransportKind::Item => "#3498db",
            TransportKind::Npc => "#1abc9c",
            TransportKind::Object => "#9b59b6",
            TransportKind::FairyRing => "#ff6ad5",
            TransportKind::Lodestone => "#f1c40f",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "door" | "doors" => Ok(TransportKind::Door),
            "item" | "items" => Ok(TransportKind::Item),
            "npc" | "npcs" => Ok(TransportKind::Npc),
            "object" | "objects" => Ok(TransportKind::Object),
            "fairy_ring" | "fairy_rings" => Ok(TransportKind::FairyRing),
            "lodestone" | "lodestones" => Ok(TransportKind::Lodestone),
            _ => bail!("unknown transport kind '{}'", s),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub plane: i32,
}

impl Point {
    pub fn new(x: f64, y: f64, plane: i32) -> Self {
        Self { x, y, plane }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DestArea {
    pub rect: Rect,
    pub plane: i32,
}

/// One transport link as read from the feature source.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRecord {
    pub id: i64,
    pub kind: TransportKind,
    pub name: String,
    pub action: String,
    pub source: Option<Point>,
    pub destination: Option<Point>,
    pub dest_area: Option<DestArea>,
    /// Drawn only at the destination (inventory teleports have no fixed origin).
    pub destination_only: bool,
}

impl TransportRecord {
    /// Destination marker: centre of the destination area if there is one.
    pub fn dest_point(&self) -> Option<Point> {
        match self.dest_area {
            Some(area) => {
                let (x, y) = area.rect.center();
                Some(Point::new(x, y, area.plane))
            }
            None => self.destination,
        }
    }

    fn placement_plane(&self) -> Option<i32> {
        if self.destination_only {
            self.dest_point().map(|p| p.plane)
        } else {
            self.source.map(|p| p.plane)
        }
    }
}

/// A record as placed on one plane.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NodeRef {
    pub record: usize,
    pub plane: i32,
    /// Shown only at its destination on this plane.
    pub shadow: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Anchor {
    Source,
    Destination,
}

/// Visible nodes sharing one floored map location.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationGroup {
    pub x: i64,
    pub y: i64,
    pub anchor: Anchor,
    pub nodes: Vec<NodeRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransportView {
    pub groups: Vec<LocationGroup>,
    pub visible: usize,
    pub status: String,
}

#[derive(Clone, Debug, Default)]
pub struct TransportIndex {
    records: Vec<TransportRecord>,
    by_plane: HashMap<i32, Vec<NodeRef>>,
}

impl TransportIndex {
    pub fn build(records: Vec<TransportRecord>) -> Self {
        let mut by_plane: HashMap<i32, Vec<NodeRef>> = HashMap::new();
        for (i, rec) in records.iter().enumerate() {
            let Some(plane) = rec.placement_plane() else { continue };
            by_plane.entry(plane).or_default().push(NodeRef { record: i, plane, shadow: rec.destination_only });
            if rec.destination_only {
                continue;
            }
            if let Some(dst) = rec.dest_point() {
                if dst.plane != plane {
                    by_plane
                        .entry(dst.plane)
                        .or_default()
                        .push(NodeRef { record: i, plane: dst.plane, shadow: true });
                }
            }
        }
        Self { records, by_plane }
    }

    pub fn records(&self) -> &[TransportRecord] {
        &self.records
    }

    pub fn record(&self, node: NodeRef) -> &TransportRecord {
        &self.records[node.record]
    }

    pub fn nodes_on(&self, plane: i32) -> &[NodeRef] {
        self.by_plane.get(&plane).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_visible(&self, node: NodeRef, bounds: &Bounds) -> bool {
        is_node_visible(self.record(node), node, bounds)
    }

    /// Visible nodes of the enabled kinds, grouped by location in first-seen order.
    pub fn view(&self, plane: i32, bounds: &Bounds, kinds: &BTreeSet<TransportKind>) -> TransportView {
        let mut groups: Vec<LocationGroup> = Vec::new();
        let mut slots: HashMap<(i64, i64, bool), usize> = HashMap::new();
        let mut visible = 0usize;

        for &node in self.nodes_on(plane) {
            let rec = self.record(node);
            if !kinds.contains(&rec.kind) || !is_node_visible(rec, node, bounds) {
                continue;
            }
            let anchor_point = if node.shadow { rec.dest_point() } else { rec.source };
            let Some(p) = anchor_point else { continue };
            let key = (p.x.floor() as i64, p.y.floor() as i64, node.shadow);
            let slot = *slots.entry(key).or_insert_with(|| {
                groups.push(LocationGroup {
                    x: key.0,
                    y: key.1,
                    anchor: if node.shadow { Anchor::Destination } else { Anchor::Source },
                    nodes: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].nodes.push(node);
            visible += 1;
        }

        TransportView { groups, visible, status: format!("{} visible", visible) }
    }
}

fn is_node_visible(rec: &TransportRecord, node: NodeRef, bounds: &Bounds) -> bool {
    let dest = rec.dest_point().filter(|p| p.plane == node.plane);
    let area = rec.dest_area.filter(|a| a.plane == node.plane);

    if node.shadow {
        if dest.is_some_and(|p| point_in_bounds(p.x, p.y, bounds)) {
            return true;
        }
        return area.is_some_and(|a| rect_intersects_bounds(&a.rect, bounds));
    }

    let src = rec.source;
    if src.is_some_and(|p| point_in_bounds(p.x, p.y, bounds)) {
        return true;
    }
    if let Some(d) = dest {
        if point_in_bounds(d.x, d.y, bounds) {
            return true;
        }
        if let Some(s) = src {
            if segment_intersects_bounds(s.x, s.y, d.x, d.y, bounds) {
                return true;
            }
        }
    }
    area.is_some_and(|a| rect_intersects_bounds(&a.rect, bounds))
}

type IndexSlot = OnceLock<Result<Arc<TransportIndex>, CacheError>>;

/// Loads transport records once. A failed load is kept until [`reset`](Self::reset).
pub struct FeatureCache {
    source: Box<dyn FeatureSource>,
    slot: Mutex<Arc<IndexSlot>>,
}

impl FeatureCache {
    pub fn new(source: Box<dyn FeatureSource>) -> Self {
        Self { source, slot: Mutex::new(Arc::new(OnceLock::new())) }
    }

    pub fn ensure(&self) -> Result<Arc<TransportIndex>, CacheError> {
        let slot = Arc::clone(&self.slot.lock().unwrap_or_else(|e| e.into_inner()));
        slot.get_or_init(|| match self.source.load_records() {
            Ok(records) => {
                log::info!("transport data loaded: {} records", records.len());
                Ok(Arc::new(TransportIndex::build(records)))
            }
            Err(e) => {
                log::error!("failed to load transport data: {:#}", e);
                Err(CacheError::unavailable(&e))
            }
        })
        .clone()
    }

    /// View for the overlay; a failed source yields an empty view with status "Failed to load".
    pub fn view(&self, plane: i32, bounds: &Bounds, kinds: &BTreeSet<TransportKind>) -> TransportView {
        if kinds.is_empty() {
            return TransportView::default();
        }
        match self.ensure() {
            Ok(index) => index.view(plane, bounds, kinds),
            Err(_) => TransportView { status: "Failed to load".to_string(), ..TransportView::default() },
        }
    }

    pub fn reset(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(OnceLock::new());
    }
}
