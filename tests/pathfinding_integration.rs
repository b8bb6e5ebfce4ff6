use bevy::prelude::*;
use chunknav::chunk::{ActivatedPortals, BoxFace, Chunk, ChunkId, Portal, PortalRef};
use chunknav::math::BoundingBox;
use chunknav::navigation::{Adjacency, NavLoc, NavSpace, Navigator, PathStep, SetId, WaypointSetBuilder, DEFAULT_GIRTH};

const WALL: Adjacency = Adjacency(!0);

fn chunk_bounds(x0: f32) -> BoundingBox {
    BoundingBox::new(Vec3::new(x0, -50.0, 0.0), Vec3::new(x0 + 100.0, 50.0, 100.0))
}

/// Clockwise rectangle: west, north, east, south edges.
fn rect(builder: &mut WaypointSetBuilder, x0: f32, z0: f32, x1: f32, z1: f32, codes: [Adjacency; 4]) -> usize {
    builder.polygon(0.0, 0.0, &[(x0, z0, codes[0]), (x0, z1, codes[1]), (x1, z1, codes[2]), (x1, z0, codes[3])])
}

/// A row of outdoor chunks along X, 100 units each. Every chunk carries one set
/// split into a west and an east half.
fn row_space(count: u32, first_portal_non_permissive: bool) -> (NavSpace, Vec<SetId>) {
    let mut space = NavSpace::default();
    let mut sets = Vec::new();

    for i in 0..count {
        let x0 = i as f32 * 100.0;
        let bounds = chunk_bounds(x0);
        let mut chunk = Chunk::outdoor(ChunkId(i), format!("row_{}", i), bounds);
        if i > 0 {
            chunk = chunk.with_face_portal(BoxFace::NegX, ChunkId(i - 1));
        }
        if i + 1 < count {
            let portal = Portal::on_box_face(&bounds, BoxFace::PosX).with_neighbour(ChunkId(i + 1));
            let portal = if i == 0 && first_portal_non_permissive { portal.non_permissive() } else { portal };
            chunk = chunk.with_portal(portal);
        }
        space.add_chunk(chunk);

        let west = if i > 0 { Adjacency::CHUNK_BOUNDARY } else { WALL };
        let east = if i + 1 < count { Adjacency::CHUNK_BOUNDARY } else { WALL };
        let mut builder = WaypointSetBuilder::new(DEFAULT_GIRTH);
        rect(&mut builder, x0, 0.0, x0 + 50.0, 100.0, [west, WALL, Adjacency::waypoint(1), WALL]);
        rect(&mut builder, x0 + 50.0, 0.0, x0 + 100.0, 100.0, [Adjacency::waypoint(0), WALL, east, WALL]);
        sets.push(space.add_set_data(ChunkId(i), builder.build()).unwrap());
    }

    space.bind_all();
    (space, sets)
}

fn loc(space: &NavSpace, x: f32, z: f32) -> NavLoc {
    let loc = NavLoc::from_space(space, Vec3::new(x, 0.0, z), DEFAULT_GIRTH);
    assert!(loc.valid(space), "({}, {}) should resolve", x, z);
    loc
}

/// Jump from hop to hop until `find_path` hands back the destination.
fn walk(space: &NavSpace, navigator: &mut Navigator, from: NavLoc, to: &NavLoc, max_steps: usize) -> Option<Vec<PathStep>> {
    let mut here = from;
    let mut steps = Vec::new();
    for _ in 0..max_steps {
        let step = navigator.find_path(space, &here, to, None, false)?;
        let arrived = step.way == *to;
        here = step.way.clone();
        steps.push(step);
        if arrived {
            return Some(steps);
        }
    }
    None
}

#[test]
fn test_shared_edge_between_triangles() {
    let mut space = NavSpace::default();
    space.add_chunk(Chunk::outdoor(ChunkId(0), "triangles", chunk_bounds(0.0)));
    let mut builder = WaypointSetBuilder::new(DEFAULT_GIRTH);
    builder.polygon(0.0, 0.0, &[(0.0, 0.0, WALL), (0.0, 10.0, Adjacency::waypoint(1)), (10.0, 0.0, WALL)]);
    builder.polygon(0.0, 0.0, &[(0.0, 10.0, WALL), (10.0, 10.0, WALL), (10.0, 0.0, Adjacency::waypoint(0))]);
    let set = space.add_set_data(ChunkId(0), builder.build()).unwrap();

    let src = loc(&space, 2.0, 2.0);
    let dst = loc(&space, 8.0, 8.0);
    assert_eq!((src.set(), src.waypoint()), (Some(set), Some(0)));
    assert_eq!(dst.waypoint(), Some(1));

    let mut navigator = Navigator::new();
    let step = navigator.find_path(&space, &src, &dst, None, false).expect("path across the shared edge");
    assert_eq!(step.way.waypoint(), Some(1));
    assert!((step.way.point() - Vec3::new(5.0, 0.0, 5.0)).length() < 1e-3, "crossing at {:?}", step.way.point());
    assert!(!step.passed_activated_portal);

    let last = navigator.find_path(&space, &step.way, &dst, None, false).unwrap();
    assert_eq!(last.way, dst, "same waypoint returns the destination");
}

#[test]
fn test_path_crosses_chunk_portal() {
    let (space, sets) = row_space(2, false);
    let src = loc(&space, 10.0, 50.0);
    let dst = loc(&space, 180.0, 50.0);

    let mut navigator = Navigator::new();
    let first = navigator.find_path(&space, &src, &dst, None, false).unwrap();
    assert_eq!((first.way.set(), first.way.waypoint()), (Some(sets[0]), Some(1)), "first hop stays in the source set");
    assert!((first.way.point() - Vec3::new(50.0, 0.0, 50.0)).length() < 1e-3);
    assert_eq!(navigator.way_set_path_len(), 2);

    let second = navigator.find_path(&space, &first.way, &dst, None, false).unwrap();
    assert_eq!(second.way.set(), Some(sets[1]));
    assert_eq!(second.way.waypoint(), None, "boundary hop lands just across the portal");
    assert!((second.way.point() - Vec3::new(100.2, 0.0, 50.0)).length() < 1e-3, "crossing at {:?}", second.way.point());
    assert!(!second.passed_activated_portal);
}

#[test]
fn test_walk_reaches_goal_across_several_chunks() {
    let (space, sets) = row_space(3, false);
    let src = loc(&space, 5.0, 20.0);
    let dst = loc(&space, 290.0, 80.0);

    let mut navigator = Navigator::new();
    let steps = walk(&space, &mut navigator, src, &dst, 32).expect("walk arrives");
    let visited: Vec<SetId> = steps.iter().filter_map(|s| s.way.set()).collect();
    assert!(visited.contains(&sets[1]), "route passes through the middle chunk");
    assert_eq!(steps.last().map(|s| s.way.clone()), Some(dst.clone()));

    // And back again with the same navigator.
    let back = walk(&space, &mut navigator, dst, &loc(&space, 5.0, 20.0), 32);
    assert!(back.is_some());
    assert!(!navigator.infinite_loop_problem());
}

#[test]
fn test_disconnected_chunks_have_no_path() {
    let mut space = NavSpace::default();
    for (id, x0) in [(0, 0.0), (1, 500.0)] {
        space.add_chunk(Chunk::outdoor(ChunkId(id), format!("island_{}", id), chunk_bounds(x0)));
        let mut builder = WaypointSetBuilder::new(DEFAULT_GIRTH);
        rect(&mut builder, x0, 0.0, x0 + 100.0, 100.0, [WALL; 4]);
        space.add_set_data(ChunkId(id), builder.build()).unwrap();
    }
    space.bind_all();

    let mut navigator = Navigator::new();
    let src = loc(&space, 50.0, 50.0);
    let dst = loc(&space, 550.0, 50.0);
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_none());
    assert!(!navigator.infinite_loop_problem(), "an exhausted search is not a loop");
}

#[test]
fn test_unresolved_ends_fail() {
    let (space, _) = row_space(1, false);
    let mut navigator = Navigator::new();
    let inside = loc(&space, 50.0, 50.0);
    let nowhere = NavLoc::unresolved(Vec3::new(50.0, 0.0, 50.0), DEFAULT_GIRTH);
    assert!(navigator.find_path(&space, &inside, &nowhere, None, false).is_none());
    assert!(navigator.find_path(&space, &nowhere, &inside, None, false).is_none());
}

#[test]
fn test_non_permissive_portal_blocks_when_asked() {
    let (space, _) = row_space(2, true);
    let src = loc(&space, 10.0, 50.0);
    let dst = loc(&space, 180.0, 50.0);

    let mut navigator = Navigator::new();
    assert!(navigator.find_path(&space, &src, &dst, None, true).is_none());
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_some());
    assert!(navigator.find_path(&space, &src, &dst, None, true).is_none(), "changing the flag drops the cached route");
}

#[test]
fn test_max_distance_bounds_search() {
    let (space, _) = row_space(2, false);
    let src = loc(&space, 10.0, 50.0);
    let dst = loc(&space, 180.0, 50.0);

    let mut navigator = Navigator::new();
    assert!(navigator.find_path(&space, &src, &dst, Some(20.0), false).is_none());
    assert!(navigator.find_path(&space, &src, &dst, Some(500.0), false).is_some());

    // Inside one set a bound only applies when it is below a chunk length.
    let near = loc(&space, 90.0, 50.0);
    assert!(Navigator::new().find_path(&space, &src, &near, Some(10.0), false).is_none());
    assert!(Navigator::new().find_path(&space, &src, &near, Some(5000.0), false).is_some());
}

#[test]
fn test_cached_route_survives_until_a_set_is_tossed() {
    let (mut space, sets) = row_space(2, false);
    let src = loc(&space, 10.0, 50.0);
    let dst = loc(&space, 180.0, 50.0);

    let mut navigator = Navigator::new();
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_some());
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_some(), "served from the cache");

    assert!(space.toss_set(sets[1]));
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_none(), "destination set is gone");
}

/// Outdoor chunk 0 with a door on its east face into a small indoor room.
fn space_with_room() -> NavSpace {
    let outdoor_bounds = chunk_bounds(0.0);
    let room_bounds = BoundingBox::new(Vec3::new(100.0, -50.0, 40.0), Vec3::new(120.0, 50.0, 60.0));

    let mut space = NavSpace::default();
    space.add_chunk(Chunk::outdoor(ChunkId(0), "yard", outdoor_bounds).with_face_portal(BoxFace::PosX, ChunkId(1)));
    space.add_chunk(Chunk::indoor(ChunkId(1), "room", room_bounds).with_face_portal(BoxFace::NegX, ChunkId(0)));

    let mut yard = WaypointSetBuilder::new(DEFAULT_GIRTH);
    rect(&mut yard, 0.0, 0.0, 50.0, 100.0, [WALL, WALL, Adjacency::waypoint(1), WALL]);
    rect(&mut yard, 50.0, 0.0, 100.0, 100.0, [Adjacency::waypoint(0), WALL, Adjacency::CHUNK_BOUNDARY, WALL]);
    space.add_set_data(ChunkId(0), yard.build()).unwrap();

    let mut room = WaypointSetBuilder::new(DEFAULT_GIRTH);
    rect(&mut room, 100.0, 40.0, 120.0, 60.0, [Adjacency::CHUNK_BOUNDARY, WALL, WALL, WALL]);
    space.add_set_data(ChunkId(1), room.build()).unwrap();

    space.bind_all();
    space
}

#[test]
fn test_activated_portal_is_reported_when_leaving_the_set() {
    let mut space = space_with_room();
    let mut doors = ActivatedPortals::default();
    doors.activate(PortalRef { chunk: ChunkId(0), index: 0 });
    space.set_named_objects(doors);

    let src = loc(&space, 10.0, 50.0);
    let dst = loc(&space, 110.0, 50.0);
    assert_eq!(space.find_chunk_from_point(dst.point()), Some(ChunkId(1)), "indoor chunk wins");

    let mut navigator = Navigator::new();
    let first = navigator.find_path(&space, &src, &dst, None, false).unwrap();
    assert!(!first.passed_activated_portal, "still inside the yard");
    assert_eq!(navigator.way_set_path_len(), 0, "routes through a shell are not cached");

    let second = navigator.find_path(&space, &first.way, &dst, None, false).unwrap();
    assert_eq!(second.way.set(), dst.set());
    assert!(second.passed_activated_portal);
}

#[test]
fn test_shell_crossing_without_door_is_plain() {
    let space = space_with_room();
    let src = loc(&space, 60.0, 50.0);
    let dst = loc(&space, 110.0, 50.0);

    let mut navigator = Navigator::new();
    let step = navigator.find_path(&space, &src, &dst, None, false).unwrap();
    assert_eq!(step.way.set(), dst.set());
    assert!(!step.passed_activated_portal);
}

#[test]
fn test_loop_flag_is_per_query() {
    let (mut space, sets) = row_space(4, false);
    let src = loc(&space, 10.0, 50.0);
    let dst = loc(&space, 390.0, 50.0);
    let limits = space.settings().search.clone();

    let mut navigator = Navigator::new();
    space.settings_mut().search.max_iterations = 1;
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_none());
    assert!(navigator.infinite_loop_problem(), "iteration cap hit while routing across sets");

    space.settings_mut().search = limits;
    let steps = walk(&space, &mut navigator, src.clone(), &dst, 32).expect("route exists once the cap is lifted");
    assert!(!steps.is_empty());
    assert!(!navigator.infinite_loop_problem(), "a clean query clears the flag");

    // A goal cut off from the start is unreachable, not looping.
    space.toss_set(sets[1]);
    assert!(navigator.find_path(&space, &src, &dst, None, false).is_none());
    assert!(!navigator.infinite_loop_problem());
}

#[test]
fn test_max_distance_bounds_leg_toward_next_set() {
    let mut space = NavSpace::default();
    space.add_chunk(Chunk::outdoor(ChunkId(0), "u_bend", chunk_bounds(0.0)).with_face_portal(BoxFace::PosX, ChunkId(1)));
    space.add_chunk(Chunk::outdoor(ChunkId(1), "yard", chunk_bounds(100.0)).with_face_portal(BoxFace::NegX, ChunkId(0)));

    // A U around a wall: down the west column, across the top, up the east column.
    let link = Adjacency::waypoint;
    let exit = Adjacency::CHUNK_BOUNDARY;
    let mut builder = WaypointSetBuilder::new(DEFAULT_GIRTH);
    rect(&mut builder, 0.0, 0.0, 20.0, 80.0, [WALL, link(1), WALL, WALL]);
    rect(&mut builder, 0.0, 80.0, 20.0, 100.0, [WALL, WALL, link(2), link(0)]);
    rect(&mut builder, 20.0, 80.0, 80.0, 100.0, [link(1), WALL, link(3), WALL]);
    rect(&mut builder, 80.0, 80.0, 100.0, 100.0, [link(2), WALL, exit, link(4)]);
    rect(&mut builder, 80.0, 0.0, 100.0, 80.0, [WALL, link(3), exit, WALL]);
    space.add_set_data(ChunkId(0), builder.build()).unwrap();

    let mut builder = WaypointSetBuilder::new(DEFAULT_GIRTH);
    rect(&mut builder, 100.0, 0.0, 200.0, 100.0, [exit, WALL, WALL, WALL]);
    space.add_set_data(ChunkId(1), builder.build()).unwrap();
    space.bind_all();

    let src = loc(&space, 10.0, 10.0);
    let dst = loc(&space, 110.0, 10.0);
    // The straight line to the next chunk fits in the bound; the walk around the wall does not.
    assert!(Navigator::new().find_path(&space, &src, &dst, Some(100.0), false).is_none());
    let step = Navigator::new().find_path(&space, &src, &dst, None, false).expect("unbounded route");
    assert_eq!(step.way.waypoint(), Some(1), "first hop heads up the west column");
}
