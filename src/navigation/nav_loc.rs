use std::fmt;

use bevy::prelude::*;

use super::space::NavSpace;
use super::types::SetId;
use crate::chunk::ChunkId;

/// Squared movement under which a guess keeps its waypoint without testing.
const UNMOVED_DISTANCE_SQUARED: f32 = 1e-5;
/// Lift applied before choosing a chunk, so points on a floor resolve upward.
const CHUNK_PROBE_LIFT: f32 = 0.01;

/// A world point resolved to a waypoint of a specific girth.
///
/// Holds the set by id only; once that set is tossed the location stops being
/// valid and the next guess falls back to a fresh lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct NavLoc {
    set: Option<SetId>,
    waypoint: Option<usize>,
    point: Vec3,
    girth: f32,
}

impl NavLoc {
    /// Location not resolved to any waypoint.
    pub fn unresolved(point: Vec3, girth: f32) -> Self {
        Self { set: None, waypoint: None, point, girth }
    }

    pub(crate) fn from_parts(set: SetId, waypoint: Option<usize>, point: Vec3, girth: f32) -> Self {
        Self { set: Some(set), waypoint, point, girth }
    }

    /// Resolve a world point: pick its chunk, then the waypoint in it.
    pub fn from_space(space: &NavSpace, point: Vec3, girth: f32) -> Self {
        match space.find_chunk_from_point(point + Vec3::Y * CHUNK_PROBE_LIFT) {
            Some(chunk) => Self::from_chunk(space, chunk, point, girth),
            None => Self::unresolved(point, girth),
        }
    }

    /// Resolve a world point within a known chunk.
    pub fn from_chunk(space: &NavSpace, chunk: ChunkId, point: Vec3, girth: f32) -> Self {
        match space.find(chunk, point, girth, false) {
            Some(found) => Self::from_parts(found.set, Some(found.waypoint), point, girth),
            None => Self::unresolved(point, girth),
        }
    }

    /// Resolve `point` starting from a previous location, which is usually
    /// right or nearly right for a moving entity.
    pub fn guess(space: &NavSpace, guess: &NavLoc, point: Vec3) -> Self {
        if let Some(set_id) = guess.set.filter(|s| space.is_set_live(*s)) {
            if let Some(set) = space.set(set_id) {
                let same_waypoint = guess.waypoint.and_then(|w| {
                    let unmoved = (point - guess.point).length_squared() < UNMOVED_DISTANCE_SQUARED;
                    (unmoved || set.waypoint(w).is_some_and(|wp| wp.contains(point))).then_some(w)
                });
                if let Some(w) = same_waypoint {
                    return Self::from_parts(set_id, Some(w), point, guess.girth);
                }
                if let Some(w) = set.data().find(point, false) {
                    return Self::from_parts(set_id, Some(w), point, guess.girth);
                }
            }
        }
        Self::from_space(space, point, guess.girth)
    }

    pub fn set(&self) -> Option<SetId> {
        self.set
    }

    pub fn waypoint(&self) -> Option<usize> {
        self.waypoint
    }

    pub fn point(&self) -> Vec3 {
        self.point
    }

    pub fn girth(&self) -> f32 {
        self.girth
    }

    /// Resolved to a waypoint of a set that is still live.
    pub fn valid(&self, space: &NavSpace) -> bool {
        match (self.set, self.waypoint) {
            (Some(set), Some(w)) => space.is_set_live(set) && space.waypoint(set, w).is_some(),
            _ => false,
        }
    }

    pub fn is_within_waypoint(&self, space: &NavSpace) -> bool {
        match (self.set, self.waypoint) {
            (Some(set), Some(w)) => space.waypoint(set, w).is_some_and(|wp| wp.contains(self.point)),
            _ => false,
        }
    }

    /// Clip the stored point into its waypoint.
    pub fn clip(&mut self, space: &NavSpace) {
        self.point = self.clip_point(space, self.point);
    }

    /// `point` clipped into this location's waypoint; unchanged when unresolved.
    pub fn clip_point(&self, space: &NavSpace, point: Vec3) -> Vec3 {
        match (self.set, self.waypoint) {
            (Some(set), Some(w)) => space.clip_to_waypoint(set, w, point),
            _ => point,
        }
    }

    pub fn is_same_waypoint(&self, other: &NavLoc) -> bool {
        self.set.is_some() && self.set == other.set && self.waypoint == other.waypoint
    }

    /// Human-readable description including the chunk and waypoint outline.
    pub fn desc(&self, space: &NavSpace) -> String {
        let chunk = self
            .set
            .and_then(|s| space.set_chunk(s))
            .map_or("<no chunk>", |c| c.identifier());
        let outline = match (self.set, self.waypoint) {
            (Some(set), Some(w)) => space
                .waypoint(set, w)
                .map(|wp| {
                    let vertices: Vec<String> =
                        wp.edges().iter().map(|e| format!("({:.2}, {:.2})", e.start.x, e.start.y)).collect();
                    format!(" [{}] h {:.2}..{:.2}", vertices.join(" "), wp.min_height(), wp.max_height())
                })
                .unwrap_or_default(),
            _ => String::new(),
        };
        format!("{} in {}{}", self, chunk, outline)
    }
}

impl fmt::Display for NavLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.point;
        match (self.set, self.waypoint) {
            (Some(set), Some(w)) => write!(f, "{} wp {} ({:.2}, {:.2}, {:.2})", set, w, p.x, p.y, p.z),
            (Some(set), None) => write!(f, "{} edge ({:.2}, {:.2}, {:.2})", set, p.x, p.y, p.z),
            _ => write!(f, "unresolved ({:.2}, {:.2}, {:.2})", p.x, p.y, p.z),
        }
    }
}
