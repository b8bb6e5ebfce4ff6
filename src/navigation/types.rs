use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Identifier of a live chunk waypoint set.
///
/// Ids are handed out monotonically and never reused, so a stale id held by a
/// `NavLoc` or a cached path simply fails to resolve once its set is tossed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SetId(pub u32);

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "set#{}", self.0)
    }
}

/// Edge codes below this are waypoint indices within the same set.
pub const MAX_WAYPOINT_CODE: u32 = 32768;

/// Upper end of the chunk-boundary code range. Only this exact value is bound.
pub const CHUNK_ADJACENT_CODE: u32 = 65535;

/// Magic vertex code in authored sets marking a chunk-boundary edge.
pub const AUTHORED_CHUNK_ADJACENT: i32 = 30000;

/// Vertical slack for waypoint height checks.
pub const HEIGHT_TOLERANCE: f32 = 0.1;

/// Half-plane slack for projection containment.
pub const PROJECTION_TOLERANCE: f32 = -0.01;

/// Default girth of authored waypoint sets.
pub const DEFAULT_GIRTH: f32 = 0.5;

/// Side length of a chunk; intra-set cost bounds larger than this are dropped.
pub const GRID_RESOLUTION: f32 = 100.0;

/// Default cell count per side of a girth grid.
pub const GIRTH_GRID_SIZE: usize = 12;

/// Single-field edge adjacency.
///
/// * `0..32768` names another waypoint in the same set.
/// * `32768..=65535` marks an edge on the chunk boundary; the neighbour set is
///   resolved at bind time and recorded separately.
/// * values with the high bit set carry vista flags as their bitwise complement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Adjacency(pub u32);

impl Adjacency {
    pub const CHUNK_BOUNDARY: Adjacency = Adjacency(CHUNK_ADJACENT_CODE);

    pub fn waypoint(index: usize) -> Self {
        debug_assert!((index as u32) < MAX_WAYPOINT_CODE, "waypoint index {} out of range", index);
        Adjacency(index as u32)
    }

    /// Impassable edge annotated with vista flags (31 bits at most).
    pub fn vista(flags: u32) -> Self {
        Adjacency(!(flags & 0x7FFF_FFFF))
    }

    pub fn neighbouring_waypoint(self) -> Option<usize> {
        (self.0 < MAX_WAYPOINT_CODE).then_some(self.0 as usize)
    }

    pub fn adjacent_to_chunk(self) -> bool {
        (MAX_WAYPOINT_CODE..=CHUNK_ADJACENT_CODE).contains(&self.0)
    }

    /// True only for the exact code the bind pass resolves.
    pub fn is_unbound_boundary(self) -> bool {
        self.0 == CHUNK_ADJACENT_CODE
    }

    pub fn neighbouring_vista(self) -> u32 {
        if (self.0 as i32) < 0 {
            !self.0
        } else {
            0
        }
    }
}

/// One polygon edge: its start vertex on the XZ plane and where it leads.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start: Vec2,
    pub neighbour: Adjacency,
}

impl Edge {
    pub fn new(x: f32, z: f32, neighbour: Adjacency) -> Self {
        Self { start: Vec2::new(x, z), neighbour }
    }
}

/// Outcome of a waypoint lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FindResult {
    pub set: SetId,
    pub waypoint: usize,
    /// False when the point lies outside every candidate and this is merely
    /// the closest waypoint; callers clip movement in that case.
    pub exact_match: bool,
}
