//! Navmesh resources: on-disk layouts, authored sets and the shared cache.

mod authored;
mod error;
mod population;
mod resource;

#[cfg(test)]
mod tests;

pub use authored::{AuthoredVertex, AuthoredWaypoint, AuthoredWaypointSet};
pub use error::NavmeshError;
pub use population::NavmeshPopulation;
pub use resource::{EdgeRecord, NavPolyRecord, NavPolySetRecord, NavmeshResource, NAVMESH_SET_VERSION};
