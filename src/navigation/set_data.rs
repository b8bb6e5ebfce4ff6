use bevy::math::Affine3A;
use bevy::prelude::*;

use super::types::{Adjacency, Edge, HEIGHT_TOLERANCE};
use super::waypoint::{Waypoint, WaypointRecord};
use crate::math::BoundingBox;

/// Invoked once when the last shared handle to a set is dropped.
pub type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Immutable waypoint polygons for one girth, shared between every chunk that
/// loads the same navmesh resource.
///
/// All edges live in one contiguous buffer; each waypoint addresses its slice
/// by offset and count.
pub struct WaypointSetData {
    girth: f32,
    source: String,
    waypoints: Vec<WaypointRecord>,
    edges: Vec<Edge>,
    on_release: Option<ReleaseHook>,
}

impl std::fmt::Debug for WaypointSetData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaypointSetData")
            .field("girth", &self.girth)
            .field("source", &self.source)
            .field("waypoints", &self.waypoints.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

impl Drop for WaypointSetData {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl WaypointSetData {
    pub fn girth(&self) -> f32 {
        self.girth
    }

    /// Resource path this set was loaded from; empty for ad-hoc sets.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn waypoint(&self, index: usize) -> Option<Waypoint<'_>> {
        let record = self.waypoints.get(index)?;
        let start = record.first_edge as usize;
        let edges = self.edges.get(start..start + record.edge_count as usize)?;
        Some(Waypoint::new(record, edges))
    }

    pub fn waypoints(&self) -> impl Iterator<Item = (usize, Waypoint<'_>)> + '_ {
        (0..self.waypoints.len()).filter_map(move |i| self.waypoint(i).map(|w| (i, w)))
    }

    pub fn edge(&self, absolute: usize) -> Option<&Edge> {
        self.edges.get(absolute)
    }

    pub(crate) fn set_release_hook(&mut self, hook: ReleaseHook) {
        self.on_release = Some(hook);
    }

    /// Index of the waypoint containing `point`.
    ///
    /// With `ignore_height` only the XZ projection must match; a waypoint whose
    /// height range brackets the point wins, otherwise the one whose average
    /// height is nearest.
    pub fn find(&self, point: Vec3, ignore_height: bool) -> Option<usize> {
        if !ignore_height {
            return self.waypoints().find(|(_, w)| w.contains(point)).map(|(i, _)| i);
        }

        let mut best = None;
        let mut best_diff = f32::MAX;
        for (i, w) in self.waypoints() {
            if !w.contains_projection(point) {
                continue;
            }
            if point.y > w.min_height() - HEIGHT_TOLERANCE && point.y < w.max_height() + HEIGHT_TOLERANCE {
                return Some(i);
            }
            let diff = (point.y - w.avg_height()).abs();
            if diff < best_diff {
                best_diff = diff;
                best = Some(i);
            }
        }
        best
    }

    /// Closest waypoint to `point` by clip distance, if closer than
    /// `best_distance_squared`, which is lowered to the new best.
    pub fn find_closest(&self, bounds: &BoundingBox, point: Vec3, best_distance_squared: &mut f32) -> Option<usize> {
        let mut best = None;
        for (i, w) in self.waypoints() {
            let d = w.distance_squared(bounds, point);
            if d < *best_distance_squared {
                *best_distance_squared = d;
                best = Some(i);
            }
        }
        best
    }
}

/// Incremental builder for [`WaypointSetData`].
#[derive(Debug, Default)]
pub struct WaypointSetBuilder {
    girth: f32,
    source: String,
    waypoints: Vec<WaypointRecord>,
    edges: Vec<Edge>,
}

impl WaypointSetBuilder {
    pub fn new(girth: f32) -> Self {
        Self { girth, ..Default::default() }
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Append a waypoint; returns its index.
    pub fn waypoint(&mut self, min_height: f32, max_height: f32, edges: impl IntoIterator<Item = Edge>) -> usize {
        let first_edge = self.edges.len() as u32;
        self.edges.extend(edges);
        let edge_count = self.edges.len() as u32 - first_edge;
        self.waypoints.push(WaypointRecord { min_height, max_height, first_edge, edge_count });
        self.waypoints.len() - 1
    }

    /// Convenience for flat polygons: `(x, z, adjacency)` per vertex.
    pub fn polygon(&mut self, min_height: f32, max_height: f32, vertices: &[(f32, f32, Adjacency)]) -> usize {
        self.waypoint(min_height, max_height, vertices.iter().map(|&(x, z, n)| Edge::new(x, z, n)))
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub(crate) fn parts(&self) -> (&[WaypointRecord], &[Edge]) {
        (&self.waypoints, &self.edges)
    }

    pub(crate) fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    /// Apply `transform` to every vertex and height. Y must point straight up.
    pub fn transform(&mut self, transform: &Affine3A) {
        let y_scale = transform.matrix3.y_axis.y;
        let y_offset = transform.translation.y;
        for record in &mut self.waypoints {
            record.min_height = y_scale * record.min_height + y_offset;
            record.max_height = y_scale * record.max_height + y_offset;
        }
        for edge in &mut self.edges {
            let v = transform.transform_point3(Vec3::new(edge.start.x, 0.0, edge.start.y));
            edge.start = Vec2::new(v.x, v.z);
        }
    }

    pub fn build(self) -> WaypointSetData {
        WaypointSetData {
            girth: self.girth,
            source: self.source,
            waypoints: self.waypoints,
            edges: self.edges,
            on_release: None,
        }
    }
}
