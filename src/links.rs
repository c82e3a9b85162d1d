//! Transport links exported as a flat JSON list (origin, destination and a
//! group name), classified into display categories by group name.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use crate::bounds::{point_in_bounds, Bounds, TileBounds};
use crate::error::CacheError;
use crate::transport::Anchor;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum LinkCategory {
    Agility,
    Doors,
    StairsLadders,
    Transport,
    FairyRings,
    Dungeons,
    Portals,
    Interactive,
}

impl LinkCategory {
    /// Classification order; the first category with a matching pattern wins.
    pub const ALL: [LinkCategory; 8] = [
        LinkCategory::Agility,
        LinkCategory::Doors,
        LinkCategory::StairsLadders,
        LinkCategory::Transport,
        LinkCategory::FairyRings,
        LinkCategory::Dungeons,
        LinkCategory::Portals,
        LinkCategory::Interactive,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LinkCategory::Agility => "agility",
            LinkCategory::Doors => "doors",
            LinkCategory::StairsLadders => "stairs_ladders",
            LinkCategory::Transport => "transport",
            LinkCategory::FairyRings => "fairy_rings",
            LinkCategory::Dungeons => "dungeons",
            LinkCategory::Portals => "portals",
            LinkCategory::Interactive => "interactive",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LinkCategory::Agility => "Agility",
            LinkCategory::Doors => "Doors & Gates",
            LinkCategory::StairsLadders => "Stairs & Ladders",
            LinkCategory::Transport => "Transport",
            LinkCategory::FairyRings => "Fairy Rings",
            LinkCategory::Dungeons => "Dungeons",
            LinkCategory::Portals => "Portals",
            LinkCategory::Interactive => "Interactive",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            LinkCategory::Agility => "#2ecc71",
            LinkCategory::Doors => "#e67e22",
            LinkCategory::StairsLadders => "#9b59b6",
            LinkCategory::Transport => "#3498db",
            LinkCategory::FairyRings => "#ff6ad5",
            LinkCategory::Dungeons => "#e74c3c",
            LinkCategory::Portals => "#f1c40f",
            LinkCategory::Interactive => "#1abc9c",
        }
    }

    /// Case-sensitive substrings of a group name that select this category.
    fn patterns(self) -> &'static [&'static str] {
        match self {
            LinkCategory::Agility => &[
                "Agility shortcuts",
                "Agility Pyramid",
                "Agility Course",
                "Agility Arena",
                "Runespan obstacles",
                "Gully",
            ],
            LinkCategory::Doors => &["Door", "Gate", "Large door", "Combat barrier", "Wilderness wall"],
            LinkCategory::StairsLadders => &["Stairs", "Ladder", "Staircase"],
            LinkCategory::Transport => &[
                "Boats",
                "Charter ship",
                "Balloons",
                "Gnome gliders",
                "Magic carpet",
                "Spirit tree",
                "Portmaster Kags",
            ],
            LinkCategory::FairyRings => &["Fairy ring", "fairy ring"],
            LinkCategory::Dungeons => &["Dungeon entrances", "Resource Dungeons", "Underground Pass", "Abyss"],
            LinkCategory::Portals => &["portal", "Portal", "obelisks", "Jennica"],
            LinkCategory::Interactive => &[
                "NPCs",
                "Interactive scenery",
                "Misc items",
                "Prifddinas",
                "Player owned",
                "Temple of Light",
                "Poison Waste",
            ],
        }
    }

    /// Unmatched groups fall back to [`LinkCategory::Interactive`].
    pub fn classify(group_name: &str) -> LinkCategory {
        LinkCategory::ALL
            .into_iter()
            .find(|c| c.patterns().iter().any(|p| group_name.contains(p)))
            .unwrap_or(LinkCategory::Interactive)
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        match LinkCategory::ALL.into_iter().find(|c| c.as_str() == norm) {
            Some(c) => Ok(c),
            None => bail!("unknown link category '{}'", s),
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
pub struct LinkPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
    #[serde(default)]
    pub plane: Option<i32>,
}

impl LinkPoint {
    fn xy(&self) -> Option<(f64, f64)> {
        Some((self.x?, self.y?))
    }

    fn plane(&self) -> i32 {
        self.plane.unwrap_or(0)
    }
}

/// One row of the link export.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    #[serde(default)]
    pub row_number: Option<i64>,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub oneway: bool,
    #[serde(default)]
    pub origin: Option<LinkPoint>,
    #[serde(default)]
    pub destination: Option<LinkPoint>,
}

impl LinkEntry {
    pub fn source_xy(&self) -> Option<(f64, f64)> {
        self.origin.as_ref().and_then(LinkPoint::xy)
    }

    pub fn dest_xy(&self) -> Option<(f64, f64)> {
        self.destination.as_ref().and_then(LinkPoint::xy)
    }

    pub fn source_plane(&self) -> i32 {
        self.origin.as_ref().map(LinkPoint::plane).unwrap_or(0)
    }

    pub fn dest_plane(&self) -> i32 {
        self.destination.as_ref().map(LinkPoint::plane).unwrap_or(0)
    }
}

pub trait LinkSource: Send + Sync {
    fn load_entries(&self) -> Result<Vec<LinkEntry>>;
}

#[derive(Clone, Debug)]
pub struct JsonLinkSource {
    path: PathBuf,
}

impl JsonLinkSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl LinkSource for JsonLinkSource {
    fn load_entries(&self) -> Result<Vec<LinkEntry>> {
        let file = File::open(&self.path).with_context(|| format!("open link file {}", self.path.display()))?;
        let entries: Vec<LinkEntry> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse JSON {}", self.path.display()))?;
        Ok(entries)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkNode {
    pub entry: usize,
    pub category: LinkCategory,
    pub plane: i32,
    pub shadow: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkGroup {
    pub x: i64,
    pub y: i64,
    pub anchor: Anchor,
    pub nodes: Vec<LinkNode>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkView {
    /// Source groups first, then destination groups, each in first-seen order.
    pub groups: Vec<LinkGroup>,
    pub visible: usize,
    pub status: String,
}

#[derive(Clone, Debug, Default)]
pub struct LinkIndex {
    entries: Vec<LinkEntry>,
    by_plane: HashMap<i32, Vec<LinkNode>>,
}

impl LinkIndex {
    pub fn build(entries: Vec<LinkEntry>) -> Self {
        let mut by_plane: HashMap<i32, Vec<LinkNode>> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            let category = LinkCategory::classify(&e.group_name);
            let (src_plane, dst_plane) = (e.source_plane(), e.dest_plane());
            if e.source_xy().is_some() {
                by_plane.entry(src_plane).or_default().push(LinkNode { entry: i, category, plane: src_plane, shadow: false });
            }
            if dst_plane != src_plane && e.destination.and_then(|d| d.x).is_some() {
                by_plane.entry(dst_plane).or_default().push(LinkNode { entry: i, category, plane: dst_plane, shadow: true });
            }
        }
        Self { entries, by_plane }
    }

    pub fn entries(&self) -> &[LinkEntry] {
        &self.entries
    }

    pub fn entry(&self, node: LinkNode) -> &LinkEntry {
        &self.entries[node.entry]
    }

    pub fn nodes_on(&self, plane: i32) -> &[LinkNode] {
        self.by_plane.get(&plane).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Regular nodes show when their origin is in view, shadows when their destination is.
    pub fn view(&self, plane: i32, bounds: &TileBounds, categories: &BTreeSet<LinkCategory>) -> LinkView {
        let b = Bounds::from(*bounds);
        let mut sources: Vec<LinkGroup> = Vec::new();
        let mut dests: Vec<LinkGroup> = Vec::new();
        let mut slots: HashMap<(i64, i64, bool), usize> = HashMap::new();

        for &node in self.nodes_on(plane) {
            if !categories.contains(&node.category) {
                continue;
            }
            let e = self.entry(node);
            let point = if node.shadow { e.dest_xy() } else { e.source_xy() };
            let Some((x, y)) = point.filter(|&(x, y)| point_in_bounds(x, y, &b)) else { continue };

            let key = (x.floor() as i64, y.floor() as i64, node.shadow);
            let groups = if node.shadow { &mut dests } else { &mut sources };
            let slot = *slots.entry(key).or_insert_with(|| {
                groups.push(LinkGroup {
                    x: key.0,
                    y: key.1,
                    anchor: if node.shadow { Anchor::Destination } else { Anchor::Source },
                    nodes: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].nodes.push(node);
        }

        let visible = sources.iter().chain(dests.iter()).map(|g| g.nodes.len()).sum::<usize>();
        let locations = sources.len() + dests.len();
        sources.extend(dests);
        LinkView { groups: sources, visible, status: format!("{} nodes at {} locations", visible, locations) }
    }
}

type LinkSlot = OnceLock<Result<Arc<LinkIndex>, CacheError>>;

/// Loads the link list once; a failure is kept until [`reset`](Self::reset).
pub struct LinkCache {
    source: Box<dyn LinkSource>,
    slot: Mutex<Arc<LinkSlot>>,
}

impl LinkCache {
    pub fn new(source: Box<dyn LinkSource>) -> Self {
        Self { source, slot: Mutex::new(Arc::new(OnceLock::new())) }
    }

    pub fn ensure(&self) -> Result<Arc<LinkIndex>, CacheError> {
        let slot = Arc::clone(&self.slot.lock().unwrap_or_else(|e| e.into_inner()));
        slot.get_or_init(|| match self.source.load_entries() {
            Ok(entries) => {
                log::info!("transport links loaded: {} entries", entries.len());
                Ok(Arc::new(LinkIndex::build(entries)))
            }
            Err(e) => {
                log::error!("failed to load transport links: {:#}", e);
                Err(CacheError::unavailable(&e))
            }
        })
        .clone()
    }

    /// Empty status when no category is enabled; "Failed to load" when the source failed.
    pub fn view(&self, plane: i32, bounds: &TileBounds, categories: &BTreeSet<LinkCategory>) -> LinkView {
        if categories.is_empty() {
            return LinkView::default();
        }
        match self.ensure() {
            Ok(index) => index.view(plane, bounds, categories),
            Err(_) => LinkView { status: "Failed to load".to_string(), ..LinkView::default() },
        }
    }

    pub fn reset(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Arc::new(OnceLock::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(group: &str, src: (f64, f64, i32), dst: (f64, f64, i32)) -> LinkEntry {
        LinkEntry {
            row_number: Some(1),
            group_name: group.to_string(),
            oneway: false,
            origin: Some(LinkPoint { x: Some(src.0), y: Some(src.1), plane: Some(src.2) }),
            destination: Some(LinkPoint { x: Some(dst.0), y: Some(dst.1), plane: Some(dst.2) }),
        }
    }

    fn all() -> BTreeSet<LinkCategory> {
        LinkCategory::ALL.into_iter().collect()
    }

    #[test]
    fn classification_by_group_name() {
        assert_eq!(LinkCategory::classify("Agility shortcuts (Wilderness)"), LinkCategory::Agility);
        assert_eq!(LinkCategory::classify("Large door"), LinkCategory::Doors);
        assert_eq!(LinkCategory::classify("Staircase"), LinkCategory::StairsLadders);
        assert_eq!(LinkCategory::classify("Gnome gliders"), LinkCategory::Transport);
        assert_eq!(LinkCategory::classify("Fairy ring network"), LinkCategory::FairyRings);
        assert_eq!(LinkCategory::classify("Wilderness obelisks"), LinkCategory::Portals);
        assert_eq!(LinkCategory::classify("Something new"), LinkCategory::Interactive);
        // first matching category wins
        assert_eq!(LinkCategory::classify("Gate to the Abyss"), LinkCategory::Doors);
    }

    #[test]
    fn parse_category_names() {
        assert_eq!("stairs-ladders".parse::<LinkCategory>().unwrap(), LinkCategory::StairsLadders);
        assert!("boats".parse::<LinkCategory>().is_err());
    }

    #[test]
    fn deserializes_export_rows() {
        let json = r#"[
            {"rowNumber": 7, "groupName": "Ladder", "oneway": true,
             "origin": {"x": 3200, "y": 3200, "plane": 0},
             "destination": {"x": 3200, "y": 3200, "plane": 1}},
            {"rowNumber": 8, "groupName": "Boats", "origin": {"x": 1.5, "y": 2}}
        ]"#;
        let entries: Vec<LinkEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].oneway);
        assert_eq!(entries[0].dest_plane(), 1);
        assert_eq!(entries[1].destination, None);
        assert_eq!(entries[1].source_xy(), Some((1.5, 2.0)));
    }

    #[test]
    fn shadow_on_other_plane_and_grouping() {
        let index = LinkIndex::build(vec![
            entry("Ladder", (10.0, 10.0, 0), (10.0, 10.0, 1)),
            entry("Door", (10.4, 10.6, 0), (11.0, 10.0, 0)),
            entry("Boats", (40.0, 40.0, 0), (90.0, 90.0, 0)),
        ]);
        assert_eq!(index.nodes_on(0).len(), 3);
        assert_eq!(index.nodes_on(1).len(), 1);

        let ground = index.view(0, &TileBounds::new(0, 50, 0, 50), &all());
        assert_eq!(ground.visible, 3);
        assert_eq!(ground.status, "3 nodes at 2 locations");
        assert_eq!(ground.groups[0].nodes.len(), 2);

        let upstairs = index.view(1, &TileBounds::new(0, 20, 0, 20), &all());
        assert_eq!(upstairs.status, "1 nodes at 1 locations");
        assert_eq!(upstairs.groups[0].anchor, Anchor::Destination);

        let doors: BTreeSet<_> = [LinkCategory::Doors].into_iter().collect();
        assert_eq!(index.view(0, &TileBounds::new(0, 50, 0, 50), &doors).visible, 1);
    }

    struct Flaky(std::sync::atomic::AtomicUsize);

    impl LinkSource for Flaky {
        fn load_entries(&self) -> Result<Vec<LinkEntry>> {
            if self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                bail!("not there yet");
            }
            Ok(vec![entry("Door", (1.0, 1.0, 0), (2.0, 1.0, 0))])
        }
    }

    #[test]
    fn failure_is_cached_until_reset() {
        let cache = LinkCache::new(Box::new(Flaky(Default::default())));
        let bounds = TileBounds::new(0, 5, 0, 5);
        assert_eq!(cache.view(0, &bounds, &all()).status, "Failed to load");
        assert_eq!(cache.view(0, &bounds, &all()).status, "Failed to load");
        assert_eq!(cache.view(0, &bounds, &BTreeSet::new()), LinkView::default());
        cache.reset();
        assert_eq!(cache.view(0, &bounds, &all()).status, "1 nodes at 1 locations");
    }
}
