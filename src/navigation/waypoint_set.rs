use std::sync::Arc;

use super::set_data::WaypointSetData;
use super::types::SetId;
use super::waypoint::Waypoint;
use crate::chunk::ChunkId;

/// Where a set is in the bind protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindState {
    /// Tossed into a chunk, boundary edges not yet resolved.
    Unbound,
    /// Boundary edges resolved against the neighbours present at bind time.
    Bound,
}

/// A waypoint set living in one chunk.
///
/// The polygons are shared; everything chunk-specific (links to neighbouring
/// sets) is kept in the space's connection registry under this set's id.
#[derive(Debug, Clone)]
pub struct ChunkWaypointSet {
    id: SetId,
    chunk: ChunkId,
    data: Arc<WaypointSetData>,
    pub(crate) state: BindState,
}

impl ChunkWaypointSet {
    pub(crate) fn new(id: SetId, chunk: ChunkId, data: Arc<WaypointSetData>) -> Self {
        Self { id, chunk, data, state: BindState::Unbound }
    }

    pub fn id(&self) -> SetId {
        self.id
    }

    pub fn chunk(&self) -> ChunkId {
        self.chunk
    }

    pub fn data(&self) -> &Arc<WaypointSetData> {
        &self.data
    }

    pub fn girth(&self) -> f32 {
        self.data.girth()
    }

    pub fn bind_state(&self) -> BindState {
        self.state
    }

    pub fn waypoint_count(&self) -> usize {
        self.data.waypoint_count()
    }

    pub fn waypoint(&self, index: usize) -> Option<Waypoint<'_>> {
        self.data.waypoint(index)
    }
}
