use anyhow::Result;
use rusqlite::Connection;
use std::collections::BTreeSet;
use tempfile::NamedTempFile;

use worldmap_overlay::bounds::Bounds;
use worldmap_overlay::features::{FeatureSource, SqliteFeatureSource};
use worldmap_overlay::transport::{Anchor, FeatureCache, TransportKind};

fn seed_features(conn: &mut Connection) -> Result<()> {
    worldmap_overlay::db::create_tables(conn)?;
    conn.execute_batch(
        "INSERT INTO teleports_door_nodes (id, direction, tile_inside_x, tile_inside_y, tile_inside_plane,
                                           tile_outside_x, tile_outside_y, tile_outside_plane, open_action)
         VALUES (1, 'N', 3200, 3200, 0, 3200, 3201, 0, 'Open'),
                (2, 'S', 3300, 3300, 0, 3300, 3300, 1, NULL);
         INSERT INTO teleports_npc_nodes (id, npc_id, npc_name, action,
                                          orig_min_x, orig_max_x, orig_min_y, orig_max_y, orig_plane,
                                          dest_min_x, dest_max_x, dest_min_y, dest_max_y, dest_plane)
         VALUES (3, 44, 'Sailor', 'Travel', 3000, 3000, 3600, 3600, 0, 3500, 3510, 3600, 3610, 0);
         INSERT INTO teleports_lodestone_nodes (id, lodestone, dest_x, dest_y, dest_plane)
         VALUES (4, 'Lumbridge', 3233, 3221, 0),
                (5, 'Broken', NULL, NULL, 0);
         INSERT INTO teleports_fairy_rings_nodes (id, object_id, x, y, plane, code, action)
         VALUES (6, 12128, 3129, 3496, 0, 'AIQ', 'Use');",
    )?;
    Ok(())
}

fn all_kinds() -> BTreeSet<TransportKind> {
    TransportKind::ALL.into_iter().collect()
}

#[test]
fn sqlite_source_reads_every_table() -> Result<()> {
    let db = NamedTempFile::new()?;
    let mut conn = Connection::open(db.path())?;
    seed_features(&mut conn)?;

    let records = SqliteFeatureSource::new(db.path()).load_records()?;
    assert_eq!(records.len(), 5);
    let lode = records.iter().find(|r| r.id == 4).expect("lodestone record");
    assert_eq!(lode.kind, TransportKind::Lodestone);
    assert!(lode.destination_only);
    assert_eq!(lode.name, "Lumbridge");
    Ok(())
}

#[test]
fn view_filters_by_bounds_and_kind() -> Result<()> {
    let db = NamedTempFile::new()?;
    let mut conn = Connection::open(db.path())?;
    seed_features(&mut conn)?;
    let cache = FeatureCache::new(Box::new(SqliteFeatureSource::new(db.path())));

    let around_lumbridge = Bounds::new(3190.0, 3240.0, 3190.0, 3240.0);
    let view = cache.view(0, &around_lumbridge, &all_kinds());
    assert_eq!(view.visible, 2);
    assert_eq!(view.status, "2 visible");
    assert!(view.groups.iter().any(|g| g.anchor == Anchor::Destination && (g.x, g.y) == (3233, 3221)));

    let doors: BTreeSet<_> = [TransportKind::Door].into_iter().collect();
    assert_eq!(cache.view(0, &around_lumbridge, &doors).visible, 1);

    // Sailor's route crosses this box without either end inside it.
    let mid_route = Bounds::new(3240.0, 3260.0, 3590.0, 3610.0);
    let crossing = cache.view(0, &mid_route, &all_kinds());
    assert_eq!(crossing.visible, 1);
    assert_eq!(crossing.groups[0].anchor, Anchor::Source);
    assert_eq!((crossing.groups[0].x, crossing.groups[0].y), (3000, 3600));

    // The stair door to plane 1 shows up there as a shadow at its destination.
    let upstairs = cache.view(1, &Bounds::new(3290.0, 3310.0, 3290.0, 3310.0), &all_kinds());
    assert_eq!(upstairs.visible, 1);
    assert!(upstairs.groups[0].nodes[0].shadow);
    Ok(())
}

#[test]
fn missing_database_fails_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = FeatureCache::new(Box::new(SqliteFeatureSource::new(dir.path().join("nope.db"))));
    let bounds = Bounds::new(0.0, 10.0, 0.0, 10.0);
    assert_eq!(cache.view(0, &bounds, &all_kinds()).status, "Failed to load");
    assert!(cache.ensure().is_err());
    assert!(cache.view(0, &bounds, &BTreeSet::new()).groups.is_empty());
    Ok(())
}
