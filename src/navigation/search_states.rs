use bevy::prelude::*;

use super::astar::SearchState;
use super::space::NavSpace;
use super::types::SetId;
use crate::chunk::PortalRef;
use crate::math::{cross2, flat, BoundingBox};

/// Step past a set boundary so the crossing point lands in the next set.
const BOUNDARY_NUDGE: f32 = 0.2;
/// Inset when clamping a crossing point into the neighbour chunk.
const CHUNK_INSET: f32 = 0.01;

/// Inputs shared by every set-level expansion.
pub struct SetSearchContext<'a> {
    pub space: &'a NavSpace,
    pub block_non_permissive: bool,
}

/// Node of the coarse search over connected waypoint sets.
#[derive(Clone, Debug)]
pub struct SetState {
    pub set: SetId,
    /// Representative world position inside the set.
    pub position: Vec3,
    distance_from_parent: f32,
    /// The step into this set crossed between an indoor chunk and another chunk.
    pub passed_shell_boundary: bool,
    /// As above, through a portal carrying an activated object such as a door.
    pub passed_activated_portal: bool,
}

impl SetState {
    pub fn new(set: SetId, position: Vec3) -> Self {
        Self {
            set,
            position,
            distance_from_parent: 0.0,
            passed_shell_boundary: false,
            passed_activated_portal: false,
        }
    }
}

impl SearchState for SetState {
    type Key = SetId;
    type Context<'a> = SetSearchContext<'a>;

    fn key(&self) -> SetId {
        self.set
    }

    fn is_goal(&self, goal: &Self) -> bool {
        self.set == goal.set
    }

    fn adjacencies(&self, ctx: &SetSearchContext<'_>, goal: &Self, out: &mut Vec<Self>) {
        let space = ctx.space;
        let Some(from_chunk) = space.set_chunk(self.set) else {
            return;
        };

        for (to, portal_ref) in space.registry().live_connections(self.set) {
            let Some(portal) = space.chunk(portal_ref.chunk).and_then(|c| c.portal(portal_ref.index)) else {
                continue;
            };
            if ctx.block_non_permissive && !portal.permissive {
                continue;
            }
            let Some(to_chunk) = space.set_chunk(to) else {
                continue;
            };
            let Some((back_index, _)) = to_chunk.portal_to(from_chunk.id()) else {
                warn!(
                    "[NAVIGATOR] No portal back from {} to {}, treating {} -> {} as impassable",
                    to_chunk.identifier(),
                    from_chunk.identifier(),
                    self.set,
                    to
                );
                continue;
            };
            let back_ref = PortalRef { chunk: to_chunk.id(), index: back_index };

            let shell = from_chunk.id() != to_chunk.id()
                && (!from_chunk.is_outside_chunk() || !to_chunk.is_outside_chunk());
            let activated = shell
                && (space.named_objects().is_portal_activated(portal_ref)
                    || space.named_objects().is_portal_activated(back_ref));

            let position = entry_point(to_chunk.bounding_box(), self.position, goal.position);
            out.push(SetState {
                set: to,
                position,
                distance_from_parent: position.distance(self.position),
                passed_shell_boundary: shell,
                passed_activated_portal: activated,
            });
        }
    }

    fn distance_from_parent(&self) -> f32 {
        self.distance_from_parent
    }

    fn distance_to_goal(&self, goal: &Self) -> f32 {
        self.position.distance(goal.position)
    }
}

/// Where the line from `from` to `goal` enters `bounds`; if it misses, the
/// box corner closest to the line at the height of `from`.
fn entry_point(bounds: &BoundingBox, from: Vec3, goal: Vec3) -> Vec3 {
    let mut start = from;
    let mut end = goal;
    if bounds.clip(&mut start, &mut end) {
        return start;
    }

    let dir = flat(goal - from);
    let corners = [
        Vec2::new(bounds.min.x, bounds.min.z),
        Vec2::new(bounds.max.x, bounds.min.z),
        Vec2::new(bounds.max.x, bounds.max.z),
        Vec2::new(bounds.min.x, bounds.max.z),
    ];
    let origin = flat(from);
    let best = corners
        .into_iter()
        .min_by(|a, b| {
            let da = cross2(dir, *a - origin).powi(2);
            let db = cross2(dir, *b - origin).powi(2);
            da.total_cmp(&db)
        })
        .unwrap_or(origin);
    Vec3::new(best.x, from.y, best.y)
}

/// Node of the fine search over waypoints.
///
/// `waypoint` is `None` for a point just across a set boundary; such states
/// have no neighbours and end the search when the goal is that set.
#[derive(Clone, Debug)]
pub struct WaypointState {
    pub set: SetId,
    pub waypoint: Option<usize>,
    pub point: Vec3,
    distance_from_parent: f32,
}

impl WaypointState {
    pub fn new(set: SetId, waypoint: Option<usize>, point: Vec3) -> Self {
        Self { set, waypoint, point, distance_from_parent: 0.0 }
    }
}

impl SearchState for WaypointState {
    type Key = (SetId, Option<usize>);
    type Context<'a> = NavSpace;

    fn key(&self) -> (SetId, Option<usize>) {
        (self.set, self.waypoint)
    }

    fn is_goal(&self, goal: &Self) -> bool {
        self.set == goal.set && self.waypoint == goal.waypoint
    }

    fn adjacencies(&self, space: &NavSpace, goal: &Self, out: &mut Vec<Self>) {
        let Some(index) = self.waypoint else {
            return;
        };
        let (Some(set), Some(chunk)) = (space.set(self.set), space.set_chunk(self.set)) else {
            return;
        };
        let Some(waypoint) = set.waypoint(index) else {
            return;
        };

        let src = flat(self.point);
        let del = flat(goal.point) - src;

        for (i, edge) in waypoint.edges().iter().enumerate() {
            let (next_set, next_waypoint) = if let Some(n) = edge.neighbour.neighbouring_waypoint() {
                (self.set, Some(n))
            } else if let Some(other) = space.edge_label(self.set, waypoint.absolute_edge_index(i)) {
                (other, None)
            } else {
                continue;
            };

            let p1 = edge.start;
            let p2 = waypoint.edge_end(i);
            let cp1 = cross2(del, p1 - src);
            let cp2 = cross2(del, p2 - src);
            let mut way = if cp1 > 0.0 && cp2 < 0.0 {
                p1 + (p2 - p1) * (cp1 / (cp1 - cp2))
            } else if cp1.abs() < cp2.abs() {
                p1
            } else {
                p2
            };
            if next_waypoint.is_none() {
                way += del.normalize_or_zero() * BOUNDARY_NUDGE;
            }

            let mut point = Vec3::new(way.x, waypoint.max_height(), way.y);
            if edge.neighbour.adjacent_to_chunk() {
                let Some(next_chunk) = space.set_chunk(next_set) else {
                    continue;
                };
                let bb = next_chunk.bounding_box();
                point.x = point.x.clamp(bb.min.x + CHUNK_INSET, (bb.max.x - CHUNK_INSET).max(bb.min.x + CHUNK_INSET));
                point.z = point.z.clamp(bb.min.z + CHUNK_INSET, (bb.max.z - CHUNK_INSET).max(bb.min.z + CHUNK_INSET));
            }
            if let Some(n) = next_waypoint {
                if let Some(next) = set.waypoint(n) {
                    point = next.clip(chunk.bounding_box(), point);
                }
            }

            out.push(WaypointState {
                set: next_set,
                waypoint: next_waypoint,
                point,
                distance_from_parent: point.distance(self.point),
            });
        }
    }

    fn distance_from_parent(&self) -> f32 {
        self.distance_from_parent
    }

    fn distance_to_goal(&self, goal: &Self) -> f32 {
        self.point.distance(goal.point)
    }
}
