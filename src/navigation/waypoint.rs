use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::types::{Edge, HEIGHT_TOLERANCE, PROJECTION_TOLERANCE};
use crate::math::{cross2, flat, BoundingBox};

/// Waypoint header inside a set's arena. Edges live in the set's shared
/// buffer at `first_edge..first_edge + edge_count`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaypointRecord {
    pub min_height: f32,
    pub max_height: f32,
    pub first_edge: u32,
    pub edge_count: u32,
}

/// Borrowed view of one convex waypoint polygon.
///
/// Vertices wind clockwise on the XZ plane (X right, Z up): a point is inside
/// when it is on the non-positive side of every edge.
#[derive(Clone, Copy, Debug)]
pub struct Waypoint<'a> {
    record: &'a WaypointRecord,
    edges: &'a [Edge],
}

impl<'a> Waypoint<'a> {
    pub(crate) fn new(record: &'a WaypointRecord, edges: &'a [Edge]) -> Self {
        Self { record, edges }
    }

    pub fn min_height(&self) -> f32 {
        self.record.min_height
    }

    pub fn max_height(&self) -> f32 {
        self.record.max_height
    }

    pub fn avg_height(&self) -> f32 {
        (self.record.min_height + self.record.max_height) * 0.5
    }

    pub fn edges(&self) -> &'a [Edge] {
        self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Index of edge `i` in the owning set's shared edge buffer.
    pub fn absolute_edge_index(&self, i: usize) -> usize {
        self.record.first_edge as usize + i
    }

    /// End vertex of edge `i` (the start of the next edge).
    pub fn edge_end(&self, i: usize) -> Vec2 {
        self.edges[(i + 1) % self.edges.len()].start
    }

    pub fn centre(&self) -> Vec2 {
        let sum: Vec2 = self.edges.iter().map(|e| e.start).sum();
        sum / self.edges.len().max(1) as f32
    }

    /// Height within the slack range and projection inside the polygon.
    pub fn contains(&self, point: Vec3) -> bool {
        point.y >= self.record.min_height - HEIGHT_TOLERANCE
            && point.y <= self.record.max_height + HEIGHT_TOLERANCE
            && self.contains_projection(point)
    }

    pub fn contains_projection(&self, point: Vec3) -> bool {
        let Some(last) = self.edges.last() else {
            return false;
        };
        let p = flat(point);
        let mut prev = last.start;
        for edge in self.edges {
            let c = -cross2(edge.start - prev, p - prev);
            if c <= PROJECTION_TOLERANCE {
                return false;
            }
            prev = edge.start;
        }
        true
    }

    /// Pull `point` onto the polygon, then into `bounds`, then into the
    /// height range. Points already inside come back unchanged.
    pub fn clip(&self, bounds: &BoundingBox, point: Vec3) -> Vec3 {
        let mut out = point;
        let p2 = flat(point);

        let outside = self.edges.iter().enumerate().any(|(i, edge)| {
            let prev = self.edges[(i + self.edges.len() - 1) % self.edges.len()].start;
            -cross2(edge.start - prev, p2 - prev) <= PROJECTION_TOLERANCE
        });

        if outside {
            let mut best = self.edges[0].start;
            let mut best_dist = f32::MAX;
            for (i, edge) in self.edges.iter().enumerate() {
                let candidate = closest_on_segment(edge.start, self.edge_end(i), p2);
                let dist = (candidate - p2).length_squared();
                if dist < best_dist {
                    best_dist = dist;
                    best = candidate;
                }
            }
            out.x = best.x;
            out.z = best.y;
        }

        let sample = Vec3::new(out.x, bounds.centre().y, out.z);
        if !bounds.intersects(sample) {
            if let Some(moved) = self.pull_inside_bounds(bounds, sample) {
                out.x = moved.x;
                out.z = moved.z;
            }
        }

        out.y = out.y.clamp(self.record.min_height, self.record.max_height.max(self.record.min_height));
        out
    }

    /// Seam fallback: aim at the middle of the first interior edge's in-bounds
    /// portion and stop just short of the box boundary.
    fn pull_inside_bounds(&self, bounds: &BoundingBox, sample: Vec3) -> Option<Vec3> {
        let y = bounds.centre().y;
        let (i, edge) = self
            .edges
            .iter()
            .enumerate()
            .find(|(_, e)| !e.neighbour.adjacent_to_chunk())?;
        let end = self.edge_end(i);

        let mut start = Vec3::new(edge.start.x, y, edge.start.y);
        let mut stop = Vec3::new(end.x, y, end.y);
        bounds.clip(&mut start, &mut stop);
        let mut middle = (start + stop) * 0.5;

        let mut target = sample;
        bounds.clip(&mut middle, &mut target);
        Some(middle + (target - middle) * 0.99)
    }

    pub fn distance_squared(&self, bounds: &BoundingBox, point: Vec3) -> f32 {
        (point - self.clip(bounds, point)).length_squared()
    }
}

fn closest_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let d = b - a;
    let len_sq = d.length_squared();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(d) / len_sq).clamp(0.0, 1.0);
    a + d * t
}
