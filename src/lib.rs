//! Chunked navmesh pathfinding for large streamed worlds.

pub mod chunk;
pub mod config;
pub mod math;
pub mod navigation;
pub mod navmesh;

pub use chunknav_macros::profile;
