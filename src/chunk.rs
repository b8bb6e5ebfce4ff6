//! Chunk geometry as seen by the navigation core.
//!
//! The streaming system owns the real chunks; the navigator only needs their
//! bounds, transforms and portals. Everything here is a plain value so tests
//! and tools can build worlds without the streaming layer.

use bevy::math::Affine3A;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::math::{cross2, polygon_contains_strict, BoundingBox, Plane};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u32);

/// A portal named by its owning chunk and its index in that chunk's portal list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortalRef {
    pub chunk: ChunkId,
    pub index: usize,
}

/// Side of an axis-aligned chunk box a portal sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxFace {
    NegX,
    PosX,
    NegZ,
    PosZ,
}

/// Planar boundary between two chunks, in the owning chunk's local frame.
///
/// `points` describe the portal polygon in (u, v) coordinates, counter-clockwise.
/// A point `p` maps to `(u_axis . p, v_axis . p)`; the origin is the plane offset
/// so that `origin + u * (u . p) + v * (v . p)` is `p` projected onto the portal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub origin: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
    pub points: Vec<Vec2>,
    pub plane: Plane,
    pub internal: bool,
    pub permissive: bool,
    pub neighbour: Option<ChunkId>,
}

impl Portal {
    pub fn new(origin: Vec3, u_axis: Vec3, v_axis: Vec3, points: Vec<Vec2>) -> Self {
        let plane = Plane::from_point_normal(origin, u_axis.cross(v_axis));
        Self {
            origin,
            u_axis,
            v_axis,
            points,
            plane,
            internal: false,
            permissive: true,
            neighbour: None,
        }
    }

    /// Portal covering one full side of an axis-aligned local box.
    pub fn on_box_face(bounds: &BoundingBox, face: BoxFace) -> Self {
        let (origin, u_axis, v_axis) = match face {
            BoxFace::NegX => (Vec3::new(bounds.min.x, 0.0, 0.0), Vec3::Y, Vec3::Z),
            BoxFace::PosX => (Vec3::new(bounds.max.x, 0.0, 0.0), Vec3::Y, Vec3::Z),
            BoxFace::NegZ => (Vec3::new(0.0, 0.0, bounds.min.z), Vec3::X, Vec3::Y),
            BoxFace::PosZ => (Vec3::new(0.0, 0.0, bounds.max.z), Vec3::X, Vec3::Y),
        };
        let lo = Vec2::new(u_axis.dot(bounds.min), v_axis.dot(bounds.min));
        let hi = Vec2::new(u_axis.dot(bounds.max), v_axis.dot(bounds.max));
        let points = vec![
            Vec2::new(lo.x, lo.y),
            Vec2::new(hi.x, lo.y),
            Vec2::new(hi.x, hi.y),
            Vec2::new(lo.x, hi.y),
        ];
        Self::new(origin, u_axis, v_axis, points)
    }

    pub fn with_neighbour(mut self, neighbour: ChunkId) -> Self {
        self.neighbour = Some(neighbour);
        self
    }

    pub fn non_permissive(mut self) -> Self {
        self.permissive = false;
        self
    }

    pub fn project_to_plane(&self, local: Vec3) -> Vec3 {
        self.origin + self.u_axis * self.u_axis.dot(local) + self.v_axis * self.v_axis.dot(local)
    }

    pub fn contains_projection(&self, local: Vec3) -> bool {
        let uv = Vec2::new(self.u_axis.dot(local), self.v_axis.dot(local));
        polygon_contains_strict(&self.points, uv)
    }

    /// Twice the signed area of the portal polygon.
    pub fn area2(&self) -> f32 {
        let Some(&last) = self.points.last() else {
            return 0.0;
        };
        let mut prev = last;
        let mut area = 0.0;
        for &p in &self.points {
            area += cross2(prev, p);
            prev = p;
        }
        area
    }
}

/// A portal candidate for [`is_better_portal`], paired with the volume of the
/// chunk it leads to.
#[derive(Clone, Copy, Debug)]
pub struct PortalCandidate<'a> {
    pub portal: &'a Portal,
    pub neighbour_volume: f32,
}

/// Decide whether `test` is a better match than `current` for the local point.
///
/// The point must project inside the portal polygon and, when `within_range`
/// is positive, lie no further than that from the portal plane. Among matches
/// the portal into the smaller chunk wins, then the one whose plane is closer.
pub fn is_better_portal(
    current: Option<PortalCandidate<'_>>,
    within_range: f32,
    test: PortalCandidate<'_>,
    local_point: Vec3,
) -> bool {
    if !test.portal.contains_projection(local_point) {
        return false;
    }

    let test_dist = test.portal.plane.distance_to(local_point).abs();
    if within_range > 0.0 && test_dist > within_range {
        return false;
    }

    let Some(current) = current else {
        return true;
    };

    if test.portal.neighbour != current.portal.neighbour {
        return test.neighbour_volume < current.neighbour_volume;
    }

    test_dist < current.portal.plane.distance_to(local_point).abs()
}

/// Chunk bounds, placement and portals.
#[derive(Clone, Debug)]
pub struct Chunk {
    id: ChunkId,
    identifier: String,
    local_bounds: BoundingBox,
    bounding_box: BoundingBox,
    transform: Affine3A,
    transform_inverse: Affine3A,
    outside: bool,
    pub portals: Vec<Portal>,
}

impl Chunk {
    /// `transform` maps local to world space and must keep Y pointing up.
    pub fn new(
        id: ChunkId,
        identifier: impl Into<String>,
        local_bounds: BoundingBox,
        transform: Affine3A,
        outside: bool,
    ) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            local_bounds,
            bounding_box: local_bounds.transformed(&transform),
            transform,
            transform_inverse: transform.inverse(),
            outside,
            portals: Vec::new(),
        }
    }

    /// Outdoor chunk whose local frame is the world frame.
    pub fn outdoor(id: ChunkId, identifier: impl Into<String>, bounds: BoundingBox) -> Self {
        Self::new(id, identifier, bounds, Affine3A::IDENTITY, true)
    }

    /// Indoor (shell) chunk whose local frame is the world frame.
    pub fn indoor(id: ChunkId, identifier: impl Into<String>, bounds: BoundingBox) -> Self {
        Self::new(id, identifier, bounds, Affine3A::IDENTITY, false)
    }

    pub fn with_portal(mut self, portal: Portal) -> Self {
        self.portals.push(portal);
        self
    }

    /// Add a portal on one face of the local box leading to `neighbour`.
    pub fn with_face_portal(self, face: BoxFace, neighbour: ChunkId) -> Self {
        let portal = Portal::on_box_face(&self.local_bounds, face).with_neighbour(neighbour);
        self.with_portal(portal)
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// World-space bounds.
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn local_bounding_box(&self) -> &BoundingBox {
        &self.local_bounds
    }

    pub fn transform(&self) -> &Affine3A {
        &self.transform
    }

    pub fn transform_inverse(&self) -> &Affine3A {
        &self.transform_inverse
    }

    pub fn is_outside_chunk(&self) -> bool {
        self.outside
    }

    pub fn volume(&self) -> f32 {
        self.bounding_box.volume()
    }

    pub fn portal(&self, index: usize) -> Option<&Portal> {
        self.portals.get(index)
    }

    /// First portal in this chunk leading to `neighbour`.
    pub fn portal_to(&self, neighbour: ChunkId) -> Option<(usize, &Portal)> {
        self.portals
            .iter()
            .enumerate()
            .find(|(_, p)| p.neighbour == Some(neighbour))
    }
}

/// Door detection, provided by the chunk's named-object registry.
pub trait NamedObjects: Send + Sync {
    fn is_portal_activated(&self, portal: PortalRef) -> bool;
}

/// No doors anywhere.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoNamedObjects;

impl NamedObjects for NoNamedObjects {
    fn is_portal_activated(&self, _portal: PortalRef) -> bool {
        false
    }
}

/// A fixed set of portals that carry a door-like object.
#[derive(Default, Debug, Clone)]
pub struct ActivatedPortals {
    portals: BTreeSet<PortalRef>,
}

impl ActivatedPortals {
    pub fn activate(&mut self, portal: PortalRef) {
        self.portals.insert(portal);
    }

    pub fn deactivate(&mut self, portal: PortalRef) {
        self.portals.remove(&portal);
    }
}

impl NamedObjects for ActivatedPortals {
    fn is_portal_activated(&self, portal: PortalRef) -> bool {
        self.portals.contains(&portal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> BoundingBox {
        BoundingBox::new(Vec3::new(0.0, -10.0, 0.0), Vec3::new(10.0, 50.0, 10.0))
    }

    #[test]
    fn test_face_portal_contains_boundary_midpoint() {
        let portal = Portal::on_box_face(&bounds(), BoxFace::PosX);
        assert!(portal.contains_projection(Vec3::new(10.0, 0.1, 5.0)));
        assert!(!portal.contains_projection(Vec3::new(10.0, 0.1, 12.0)));
        assert!(portal.area2() > 0.0, "face portals wind counter-clockwise");
        assert!(portal.plane.distance_to(Vec3::new(10.0, 3.0, 4.0)).abs() < 1e-5);
    }

    #[test]
    fn test_face_portal_projection_lands_on_plane() {
        let portal = Portal::on_box_face(&bounds(), BoxFace::NegZ);
        let p = portal.project_to_plane(Vec3::new(3.0, 1.0, 0.5));
        assert!((p - Vec3::new(3.0, 1.0, 0.0)).length() < 1e-5, "projected {:?}", p);
    }

    #[test]
    fn test_better_portal_prefers_smaller_neighbour() {
        let big = Portal::on_box_face(&bounds(), BoxFace::PosX).with_neighbour(ChunkId(1));
        let small = Portal::on_box_face(&bounds(), BoxFace::PosX).with_neighbour(ChunkId(2));
        let p = Vec3::new(10.0, 0.0, 5.0);
        let current = PortalCandidate { portal: &big, neighbour_volume: 1000.0 };
        let test = PortalCandidate { portal: &small, neighbour_volume: 10.0 };
        assert!(is_better_portal(None, 0.0, current, p));
        assert!(is_better_portal(Some(current), 0.0, test, p));
        assert!(!is_better_portal(Some(test), 0.0, current, p));
    }

    #[test]
    fn test_better_portal_respects_range() {
        let portal = Portal::on_box_face(&bounds(), BoxFace::PosX).with_neighbour(ChunkId(1));
        let test = PortalCandidate { portal: &portal, neighbour_volume: 1.0 };
        assert!(!is_better_portal(None, 1.0, test, Vec3::new(7.0, 0.0, 5.0)));
        assert!(is_better_portal(None, 1.0, test, Vec3::new(9.5, 0.0, 5.0)));
        assert!(is_better_portal(None, 0.0, test, Vec3::new(7.0, 0.0, 5.0)));
    }
}
