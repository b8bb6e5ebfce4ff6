use bevy::math::Affine3A;
use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::NavmeshError;
use crate::navigation::{
    Adjacency, Edge, WaypointSetBuilder, WaypointSetData, AUTHORED_CHUNK_ADJACENT, DEFAULT_GIRTH,
};

/// Hand-authored waypoint set as written by level tools.
///
/// Waypoints carry their own ids; vertex codes refer to those ids rather than
/// to positions in the list, and are remapped when the set is built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthoredWaypointSet {
    #[serde(default = "default_girth")]
    pub girth: f32,
    pub waypoints: Vec<AuthoredWaypoint>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthoredWaypoint {
    pub id: i32,
    /// Fallback for whichever of `min_height`/`max_height` is missing.
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub min_height: Option<f32>,
    #[serde(default)]
    pub max_height: Option<f32>,
    pub vertices: Vec<AuthoredVertex>,
}

/// One vertex: position on the XZ plane and the code of the edge it starts.
///
/// Codes: positive is a waypoint id, `30000` (or `adjacent_chunk`) marks the
/// chunk boundary, zero or negative is `-(vista flags)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AuthoredVertex {
    pub x: f32,
    pub z: f32,
    pub code: i32,
    #[serde(default)]
    pub adjacent_chunk: bool,
}

fn default_girth() -> f32 {
    DEFAULT_GIRTH
}

impl AuthoredVertex {
    fn adjacency(&self) -> Adjacency {
        if self.adjacent_chunk || self.code == AUTHORED_CHUNK_ADJACENT {
            Adjacency::CHUNK_BOUNDARY
        } else if self.code > 0 {
            Adjacency(self.code as u32)
        } else {
            Adjacency(!(self.code.wrapping_neg()) as u32)
        }
    }
}

impl AuthoredWaypointSet {
    /// Build shareable set data. When the set was authored in a chunk's local
    /// frame, pass that chunk's local-to-world transform.
    pub fn build(&self, source: &str, to_world: Option<&Affine3A>) -> Result<WaypointSetData, NavmeshError> {
        let mut ids: FxHashMap<i32, usize> = FxHashMap::default();
        let mut builder = WaypointSetBuilder::new(self.girth).source(source);

        for waypoint in &self.waypoints {
            if waypoint.vertices.len() < 3 {
                return Err(NavmeshError::DegeneratePolygon {
                    waypoint: builder.waypoint_count(),
                    edges: waypoint.vertices.len(),
                });
            }
            let min = waypoint.min_height.unwrap_or(waypoint.height);
            let max = waypoint.max_height.unwrap_or(waypoint.height);
            let index = builder.waypoint(
                min,
                max,
                waypoint.vertices.iter().map(|v| Edge::new(v.x, v.z, v.adjacency())),
            );
            ids.insert(waypoint.id, index);
        }

        let (records, _) = builder.parts();
        let spans: Vec<(usize, usize)> = records
            .iter()
            .map(|r| (r.first_edge as usize, r.edge_count as usize))
            .collect();
        let edges = builder.edges_mut();
        for (waypoint, (first, count)) in spans.into_iter().enumerate() {
            for (edge_index, edge) in edges[first..first + count].iter_mut().enumerate() {
                let Some(id) = edge.neighbour.neighbouring_waypoint() else {
                    continue;
                };
                let Some(&index) = ids.get(&(id as i32)) else {
                    error!(
                        "[NAVMESH] {}: cannot find neighbouring waypoint {} on edge {} of waypoint {}",
                        source, id, edge_index, waypoint
                    );
                    return Err(NavmeshError::UnknownNeighbour { neighbour: id as i64, edge: edge_index, waypoint });
                };
                edge.neighbour = Adjacency::waypoint(index);
            }
        }

        if let Some(transform) = to_world {
            builder.transform(transform);
        }
        Ok(builder.build())
    }
}
