use std::path::PathBuf;
use std::sync::Arc;

use bevy::math::Affine3A;
use bevy::prelude::*;
use chunknav::chunk::{Chunk, ChunkId};
use chunknav::config::NavConfig;
use chunknav::math::BoundingBox;
use chunknav::navigation::{Adjacency, NavSpace, NavigationPlugin, WaypointSetBuilder, WaypointSetData, DEFAULT_GIRTH};
use chunknav::navmesh::{AuthoredVertex, AuthoredWaypoint, AuthoredWaypointSet, NavmeshError, NavmeshResource};

fn bounds() -> BoundingBox {
    BoundingBox::new(Vec3::new(0.0, -50.0, 0.0), Vec3::new(100.0, 50.0, 100.0))
}

fn square_set(girth: f32) -> WaypointSetData {
    let wall = Adjacency::vista(0);
    let mut builder = WaypointSetBuilder::new(girth);
    builder.polygon(0.0, 1.0, &[(10.0, 10.0, wall), (10.0, 90.0, wall), (90.0, 90.0, wall), (90.0, 10.0, wall)]);
    builder.build()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("chunknav_{}_{}", std::process::id(), name))
}

fn space_with_chunk() -> NavSpace {
    let mut space = NavSpace::default();
    space.add_chunk(Chunk::outdoor(ChunkId(0), "field", bounds()));
    space
}

#[test]
fn test_binary_navmesh_file_loads_every_girth() {
    let path = temp_path("field.nav");
    let resource = NavmeshResource::from_sets([&square_set(DEFAULT_GIRTH), &square_set(2.0)]);
    std::fs::write(&path, resource.encode().unwrap()).unwrap();

    let mut space = space_with_chunk();
    let ids = space.load_navmesh(ChunkId(0), &path).expect("navmesh loads");
    assert_eq!(ids.len(), 2);

    let point = Vec3::new(50.0, 0.5, 50.0);
    assert_eq!(space.find(ChunkId(0), point, DEFAULT_GIRTH, false).map(|f| f.set), Some(ids[0]));
    assert_eq!(space.find(ChunkId(0), point, 2.0, false).map(|f| f.set), Some(ids[1]));
    assert_eq!(space.set(ids[0]).unwrap().data().source(), path.display().to_string());

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_ron_navmesh_file_loads() {
    let path = temp_path("field.ron");
    let resource = NavmeshResource::from_sets([&square_set(DEFAULT_GIRTH)]);
    std::fs::write(&path, resource.to_ron_string().unwrap()).unwrap();

    let mut space = space_with_chunk();
    let ids = space.load_navmesh(ChunkId(0), &path).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(space.set(ids[0]).unwrap().waypoint_count(), 1);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_missing_file_reports_path() {
    let mut space = space_with_chunk();
    let path = temp_path("missing.nav");
    match space.load_navmesh(ChunkId(0), &path) {
        Err(NavmeshError::Io { path: reported, .. }) => assert_eq!(reported, path.display().to_string()),
        other => panic!("expected an io error, got {:?}", other),
    }
    assert!(space.sets().next().is_none());
}

#[test]
fn test_unknown_chunk_is_rejected() {
    let mut space = space_with_chunk();
    let resource = NavmeshResource::from_sets([&square_set(DEFAULT_GIRTH)]);
    assert!(matches!(
        space.load_navmesh_resource(ChunkId(9), "mesh/nowhere", resource),
        Err(NavmeshError::UnknownChunk(ChunkId(9)))
    ));
    assert!(matches!(
        space.add_set_data(ChunkId(9), square_set(DEFAULT_GIRTH)),
        Err(NavmeshError::UnknownChunk(ChunkId(9)))
    ));
}

#[test]
fn test_same_source_shares_set_data_until_tossed() {
    let mut space = space_with_chunk();
    let resource = NavmeshResource::from_sets([&square_set(DEFAULT_GIRTH)]);

    let first = space.load_navmesh_resource(ChunkId(0), "mesh/field", resource.clone()).unwrap();
    let second = space.load_navmesh_resource(ChunkId(0), "mesh/field", resource.clone()).unwrap();
    assert_ne!(first[0], second[0]);
    assert!(Arc::ptr_eq(space.set(first[0]).unwrap().data(), space.set(second[0]).unwrap().data()));
    assert!(space.population().contains("mesh/field"));

    space.toss_set(first[0]);
    assert!(space.population().contains("mesh/field"), "still used by the second set");
    space.toss_set(second[0]);
    assert!(!space.population().contains("mesh/field"), "last user gone");
}

#[test]
fn test_authored_set_in_local_frame_moves_with_chunk() {
    let mut space = NavSpace::default();
    let local = BoundingBox::new(Vec3::new(0.0, -5.0, 0.0), Vec3::new(10.0, 5.0, 10.0));
    let placed = Affine3A::from_translation(Vec3::new(1000.0, 20.0, 0.0));
    space.add_chunk(Chunk::new(ChunkId(3), "cabin", local, placed, false));

    let vertex = |x: f32, z: f32| AuthoredVertex { x, z, code: 0, adjacent_chunk: false };
    let authored = AuthoredWaypointSet {
        girth: DEFAULT_GIRTH,
        waypoints: vec![AuthoredWaypoint {
            id: 1,
            height: 0.0,
            min_height: None,
            max_height: None,
            vertices: vec![vertex(1.0, 1.0), vertex(1.0, 9.0), vertex(9.0, 9.0), vertex(9.0, 1.0)],
        }],
    };
    let set = space.load_authored_set(ChunkId(3), &authored, true).unwrap();

    let found = space.find(ChunkId(3), Vec3::new(1005.0, 20.0, 5.0), DEFAULT_GIRTH, false).unwrap();
    assert_eq!((found.set, found.waypoint, found.exact_match), (set, 0, true));
    assert_eq!(space.find_chunk_from_point(Vec3::new(1005.0, 20.0, 5.0)), Some(ChunkId(3)));
}

#[test]
fn test_navigation_plugin_builds_space_from_config() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(AssetPlugin::default());
    app.add_plugins(NavigationPlugin);

    // Runs Startup: config is read, then the space is created from it.
    app.update();

    let config = app.world().resource::<NavConfig>().clone();
    let space = app.world().resource::<NavSpace>();
    assert_eq!(space.settings().girth_grid_size, config.girth_grid_size);
    assert_eq!(space.settings().search.max_iterations, config.max_search_iterations);
    assert!(space.sets().next().is_none());
}
