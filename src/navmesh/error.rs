use thiserror::Error;

use crate::chunk::ChunkId;

/// Failures while turning navmesh resources into waypoint sets.
#[derive(Debug, Error)]
pub enum NavmeshError {
    #[error("failed to read navmesh resource {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse navmesh text: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("failed to write navmesh text: {0}")]
    RonWrite(#[from] ron::Error),

    #[error("failed to decode navmesh binary: {0}")]
    Binary(#[from] bincode::Error),

    #[error("unsupported navmesh set version {0}")]
    UnsupportedVersion(u32),

    #[error("waypoint {waypoint} has {edges} edges, at least 3 are required")]
    DegeneratePolygon { waypoint: usize, edges: usize },

    #[error("cannot find neighbouring waypoint {neighbour} on edge {edge} of waypoint {waypoint}")]
    UnknownNeighbour { neighbour: i64, edge: usize, waypoint: usize },

    #[error("chunk {0:?} is not loaded")]
    UnknownChunk(ChunkId),
}
