use std::sync::Arc;

use bevy::math::Affine3A;
use bevy::prelude::*;

use super::*;
use crate::navigation::{Adjacency, WaypointSetBuilder, WaypointSetData, AUTHORED_CHUNK_ADJACENT};

fn vertex(x: f32, z: f32, code: i32) -> AuthoredVertex {
    AuthoredVertex { x, z, code, adjacent_chunk: false }
}

/// Two unit squares side by side along X, ids 7 and 3 (deliberately not
/// matching their positions).
fn two_squares() -> AuthoredWaypointSet {
    AuthoredWaypointSet {
        girth: 0.5,
        waypoints: vec![
            AuthoredWaypoint {
                id: 7,
                height: 1.0,
                min_height: None,
                max_height: Some(2.0),
                vertices: vec![vertex(0.0, 0.0, -5), vertex(0.0, 1.0, 0), vertex(1.0, 1.0, 3), vertex(1.0, 0.0, 0)],
            },
            AuthoredWaypoint {
                id: 3,
                height: 1.0,
                min_height: None,
                max_height: None,
                vertices: vec![
                    vertex(1.0, 0.0, 7),
                    vertex(1.0, 1.0, 0),
                    vertex(2.0, 1.0, AUTHORED_CHUNK_ADJACENT),
                    vertex(2.0, 0.0, 0),
                ],
            },
        ],
    }
}

fn square_set(girth: f32) -> WaypointSetData {
    let mut builder = WaypointSetBuilder::new(girth);
    builder.polygon(
        0.0,
        1.0,
        &[
            (0.0, 0.0, Adjacency::vista(2)),
            (0.0, 4.0, Adjacency::CHUNK_BOUNDARY),
            (4.0, 4.0, Adjacency::vista(0)),
            (4.0, 0.0, Adjacency::vista(0)),
        ],
    );
    builder.build()
}

#[test]
fn test_authored_ids_are_remapped_to_indices() {
    let data = two_squares().build("fixture", None).expect("fixture builds");
    assert_eq!(data.waypoint_count(), 2);

    let first = data.waypoint(0).unwrap();
    assert_eq!(first.min_height(), 1.0, "missing min falls back to height");
    assert_eq!(first.max_height(), 2.0);
    assert_eq!(first.edges()[2].neighbour.neighbouring_waypoint(), Some(1), "id 3 is the second waypoint");
    assert_eq!(first.edges()[0].neighbour.neighbouring_vista(), 5);
    assert!(first.edges()[1].neighbour.neighbouring_waypoint().is_none());

    let second = data.waypoint(1).unwrap();
    assert_eq!(second.edges()[0].neighbour.neighbouring_waypoint(), Some(0));
    assert!(second.edges()[2].neighbour.is_unbound_boundary());
}

#[test]
fn test_legacy_adjacent_chunk_flag() {
    let mut set = two_squares();
    set.waypoints[0].vertices[1].adjacent_chunk = true;
    let data = set.build("fixture", None).unwrap();
    assert!(data.waypoint(0).unwrap().edges()[1].neighbour.is_unbound_boundary());
}

#[test]
fn test_unknown_neighbour_is_an_error() {
    let mut set = two_squares();
    set.waypoints[1].vertices[0].code = 42;
    match set.build("fixture", None) {
        Err(NavmeshError::UnknownNeighbour { neighbour, edge, waypoint }) => {
            assert_eq!((neighbour, edge, waypoint), (42, 0, 1));
        }
        other => panic!("expected unknown neighbour, got {:?}", other.map(|d| d.waypoint_count())),
    }
}

#[test]
fn test_authored_transform_moves_vertices_and_heights() {
    let to_world = Affine3A::from_translation(Vec3::new(100.0, 5.0, -20.0));
    let data = two_squares().build("fixture", Some(&to_world)).unwrap();
    let first = data.waypoint(0).unwrap();
    assert_eq!(first.edges()[0].start, Vec2::new(100.0, -20.0));
    assert_eq!(first.min_height(), 6.0);
    assert_eq!(first.max_height(), 7.0);
}

#[test]
fn test_json_fixture_parses() {
    let json = r#"{
        "girth": 2.0,
        "waypoints": [
            { "id": 1, "height": 0.0, "vertices": [
                { "x": 0.0, "z": 0.0, "code": 0 },
                { "x": 0.0, "z": 5.0, "code": 30000 },
                { "x": 5.0, "z": 5.0, "code": 0 }
            ] }
        ]
    }"#;
    let authored: AuthoredWaypointSet = serde_json::from_str(json).expect("json fixture parses");
    let data = authored.build("json", None).unwrap();
    assert_eq!(data.girth(), 2.0);
    assert!(data.waypoint(0).unwrap().edges()[1].neighbour.is_unbound_boundary());
}

#[test]
fn test_degenerate_polygon_rejected() {
    let mut resource = NavmeshResource::from_sets([&square_set(0.5)]);
    resource.sets[0].polys[0].edges.truncate(2);
    assert!(matches!(
        resource.into_set_data("bad"),
        Err(NavmeshError::DegeneratePolygon { waypoint: 0, edges: 2 })
    ));
}

#[test]
fn test_unsupported_version_rejected() {
    let mut resource = NavmeshResource::from_sets([&square_set(0.5)]);
    resource.sets[0].version = 3;
    assert!(matches!(resource.into_set_data("bad"), Err(NavmeshError::UnsupportedVersion(3))));
}

#[test]
fn test_binary_resource_survives_encoding() {
    let resource = NavmeshResource::from_sets([&square_set(0.5), &square_set(2.0)]);
    let bytes = resource.encode().unwrap();
    let decoded = NavmeshResource::decode(&bytes).unwrap();
    assert_eq!(decoded, resource);

    let sets = decoded.into_set_data("mesh").unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[1].girth(), 2.0);
    assert_eq!(sets[0].source(), "mesh");
}

#[test]
fn test_garbage_binary_is_an_error() {
    assert!(NavmeshResource::decode(b"definitely not gzip").is_err());
}

#[test]
fn test_ron_resource_text() {
    let resource = NavmeshResource::from_sets([&square_set(0.5)]);
    let text = resource.to_ron_string().unwrap();
    assert_eq!(NavmeshResource::from_ron_str(&text).unwrap(), resource);
}

#[test]
fn test_population_shares_loaded_sets() {
    let population = NavmeshPopulation::new();
    let mut loads = 0;
    let first = population
        .load_with("mesh/a", || {
            loads += 1;
            Ok(vec![square_set(0.5)])
        })
        .unwrap();
    let second = population
        .load_with("mesh/a", || {
            loads += 1;
            Ok(vec![square_set(0.5)])
        })
        .unwrap();

    assert_eq!(loads, 1, "second load is served from the cache");
    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert!(population.contains("mesh/a"));
}

#[test]
fn test_population_evicts_when_last_user_drops() {
    let population = NavmeshPopulation::new();
    let sets = population.load_with("mesh/b", || Ok(vec![square_set(0.5), square_set(1.0)])).unwrap();
    assert_eq!(population.len(), 1);

    let keep = Arc::clone(&sets[1]);
    drop(sets);
    assert!(population.contains("mesh/b"), "a sibling set is still in use");
    assert!(population.cached("mesh/b").is_none());

    let reloaded = population.load_with("mesh/b", || Ok(vec![square_set(0.5), square_set(1.0)])).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(Arc::ptr_eq(&keep, &reloaded[1]), "live sibling is reused");
    assert_eq!(reloaded[0].girth(), 0.5);

    drop(keep);
    assert!(population.contains("mesh/b"));
    drop(reloaded);
    assert!(!population.contains("mesh/b"));
    assert!(population.is_empty());
}

#[test]
fn test_population_reload_of_evicted_resource_is_independent() {
    let population = NavmeshPopulation::new();
    let first = population.load_with("mesh/c", || Ok(vec![square_set(0.5)])).unwrap();
    drop(first);
    assert!(!population.contains("mesh/c"));

    let second = population.load_with("mesh/c", || Ok(vec![square_set(0.5)])).unwrap();
    assert!(population.contains("mesh/c"));
    drop(second);
    assert!(!population.contains("mesh/c"));
}

#[test]
fn test_population_skips_empty_resources() {
    let population = NavmeshPopulation::new();
    let sets = population.load_with("mesh/empty", || Ok(Vec::new())).unwrap();
    assert!(sets.is_empty());
    assert!(population.is_empty());
}

#[test]
fn test_population_propagates_load_errors() {
    let population = NavmeshPopulation::new();
    let result = population.load_with("mesh/bad", || Err(NavmeshError::UnsupportedVersion(9)));
    assert!(matches!(result, Err(NavmeshError::UnsupportedVersion(9))));
    assert!(!population.contains("mesh/bad"));
}
