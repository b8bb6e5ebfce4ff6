use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;

use super::nav_loc::NavLoc;
use super::space::NavSpace;
use super::types::SetId;
use crate::math::{cross2, flat};

/// How far the side wedges reach across the edge.
const SWEEP_CROSS_DISTANCE: f32 = 30.0;
/// Candidates are pulled this far back from the edge.
const EDGE_INSET: f32 = 0.25;

fn in_front_of(a: Vec2, b: Vec2, p: Vec2) -> bool {
    cross2(b - a, p - a) > 0.0
}

/// Waypoints already visited, per set.
#[derive(Default)]
struct Visited {
    sets: FxHashMap<SetId, FixedBitSet>,
}

impl Visited {
    /// Mark a waypoint; false if it was already marked.
    fn insert(&mut self, space: &NavSpace, set: SetId, waypoint: usize) -> bool {
        let bits = self.sets.entry(set).or_insert_with(|| {
            FixedBitSet::with_capacity(space.set(set).map_or(0, |s| s.waypoint_count()))
        });
        if waypoint >= bits.len() {
            bits.grow(waypoint + 1);
        }
        !bits.put(waypoint)
    }
}

/// Find a spot near `src` with an impassable edge between it and `target`
/// whose vista flags show `situation` in the wedge facing the target.
///
/// Searches every waypoint reachable from `src` whose clip distance to the
/// source point is under `radius`, and returns the candidate closest to the
/// source.
pub fn find_situation_ahead(
    space: &NavSpace,
    situation: u32,
    src: &NavLoc,
    radius: f32,
    target: Vec3,
) -> Option<Vec3> {
    let (Some(src_set), Some(src_waypoint)) = (src.set(), src.waypoint()) else {
        return None;
    };
    if !src.valid(space) {
        return None;
    }

    let radius_squared = radius * radius;
    let src_point = src.point();
    let src_flat = flat(src_point);
    let target_flat = flat(target);

    let mut visited = Visited::default();
    visited.insert(space, src_set, src_waypoint);
    let mut stack = vec![(src_set, src_waypoint)];
    let mut best: Option<(f32, Vec3)> = None;

    while let Some((set_id, index)) = stack.pop() {
        let (Some(set), Some(chunk)) = (space.set(set_id), space.set_chunk(set_id)) else {
            continue;
        };
        let Some(waypoint) = set.waypoint(index) else {
            continue;
        };

        for (i, edge) in waypoint.edges().iter().enumerate() {
            if let Some(n) = edge.neighbour.neighbouring_waypoint() {
                if !visited.insert(space, set_id, n) {
                    continue;
                }
                let near = set
                    .waypoint(n)
                    .is_some_and(|w| w.distance_squared(chunk.bounding_box(), src_point) < radius_squared);
                if near {
                    stack.push((set_id, n));
                }
                continue;
            }

            if edge.neighbour.adjacent_to_chunk() {
                let Some(other_id) = space.edge_label(set_id, waypoint.absolute_edge_index(i)) else {
                    continue;
                };
                let (Some(other), Some(other_chunk)) = (space.set(other_id), space.set_chunk(other_id)) else {
                    warn!("[NAVIGATOR] Situation search crossed into {} which has no chunk", other_id);
                    continue;
                };
                let Some(n) = other.data().find(src_point, false) else {
                    continue;
                };
                if !visited.insert(space, other_id, n) {
                    continue;
                }
                let near = other
                    .waypoint(n)
                    .is_some_and(|w| w.distance_squared(other_chunk.bounding_box(), src_point) < radius_squared);
                if near {
                    stack.push((other_id, n));
                }
                continue;
            }

            let vista = edge.neighbour.neighbouring_vista();
            let p1 = edge.start;
            let p2 = waypoint.edge_end(i);
            if !in_front_of(p1, p2, target_flat) {
                continue;
            }

            let along = p2 - p1;
            let normal = along.perp().normalize_or_zero();
            let ortho = along.normalize_or_zero() * 0.5;
            let dir = Vec2::new(normal.y, -normal.x);
            let mid = (p1 + p2) * 0.5;

            for wedge in 0..3 {
                if (vista >> (wedge * 4)) & 0xF != situation {
                    continue;
                }
                let t = match wedge {
                    0 if in_front_of(p2, p2 + normal + ortho, target_flat)
                        && in_front_of(p1 + normal - ortho, p1, target_flat) =>
                    {
                        0.5
                    }
                    1 if in_front_of(p2, p2 + normal + dir, target_flat)
                        && in_front_of(p2 + normal * SWEEP_CROSS_DISTANCE, mid, target_flat) =>
                    {
                        0.25
                    }
                    2 if in_front_of(p1 + normal + dir, p1, target_flat)
                        && in_front_of(mid, p1 + normal * SWEEP_CROSS_DISTANCE, target_flat) =>
                    {
                        0.75
                    }
                    _ => continue,
                };

                let candidate = p1 * (1.0 - t) + p2 * t - normal * EDGE_INSET;
                let d = (candidate - src_flat).length_squared();
                if best.is_none_or(|(best_d, _)| d < best_d) {
                    best = Some((d, Vec3::new(candidate.x, waypoint.max_height(), candidate.y)));
                }
            }
        }
    }

    best.map(|(_, point)| point)
}
