use bevy::math::Affine3A;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Project a world point onto the XZ plane.
#[inline]
pub fn flat(p: Vec3) -> Vec2 {
    Vec2::new(p.x, p.z)
}

/// Signed area of the parallelogram spanned by `a` and `b`.
///
/// Positive when `b` lies counter-clockwise of `a` (X right, Z up).
#[inline]
pub fn cross2(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

#[inline]
pub fn almost_zero(value: f32, epsilon: f32) -> bool {
    value.abs() < epsilon
}

/// True if `p` lies strictly inside a counter-clockwise polygon.
pub fn polygon_contains_strict(points: &[Vec2], p: Vec2) -> bool {
    let Some(&last) = points.last() else {
        return false;
    };
    let mut prev = last;
    for &point in points {
        if cross2(point - prev, p - prev) <= 0.0 {
            return false;
        }
        prev = point;
    }
    true
}

/// Axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    pub fn centre(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn volume(&self) -> f32 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Inclusive containment test.
    pub fn intersects(&self, p: Vec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x
            && p.y >= self.min.y && p.y <= self.max.y
            && p.z >= self.min.z && p.z <= self.max.z
    }

    /// Box enclosing this one after applying `transform`.
    pub fn transformed(&self, transform: &Affine3A) -> Self {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = transform.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    /// Clip the segment `start..end` to the box (Liang-Barsky).
    ///
    /// Returns false, leaving both points untouched, if the segment misses the
    /// box entirely.
    pub fn clip(&self, start: &mut Vec3, end: &mut Vec3) -> bool {
        let d = *end - *start;
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;

        for axis in 0..3 {
            let (s, dir, lo, hi) = (start[axis], d[axis], self.min[axis], self.max[axis]);
            if dir.abs() < f32::EPSILON {
                if s < lo || s > hi {
                    return false;
                }
                continue;
            }
            let mut ta = (lo - s) / dir;
            let mut tb = (hi - s) / dir;
            if ta > tb {
                std::mem::swap(&mut ta, &mut tb);
            }
            t0 = t0.max(ta);
            t1 = t1.min(tb);
            if t0 > t1 {
                return false;
            }
        }

        let origin = *start;
        *start = origin + d * t0;
        *end = origin + d * t1;
        true
    }
}

/// Plane in `normal . p = d` form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self { normal, d: normal.dot(point) }
    }

    pub fn distance_to(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(Vec3::ZERO, Vec3::splat(10.0))
    }

    #[test]
    fn test_clip_segment_crossing_box() {
        let bb = unit_box();
        let mut start = Vec3::new(-5.0, 5.0, 5.0);
        let mut end = Vec3::new(15.0, 5.0, 5.0);
        assert!(bb.clip(&mut start, &mut end));
        assert!((start - Vec3::new(0.0, 5.0, 5.0)).length() < 1e-4, "start {:?}", start);
        assert!((end - Vec3::new(10.0, 5.0, 5.0)).length() < 1e-4, "end {:?}", end);
    }

    #[test]
    fn test_clip_segment_missing_box() {
        let bb = unit_box();
        let mut start = Vec3::new(-5.0, 5.0, 20.0);
        let mut end = Vec3::new(15.0, 5.0, 20.0);
        assert!(!bb.clip(&mut start, &mut end));
        assert_eq!(start, Vec3::new(-5.0, 5.0, 20.0));
    }

    #[test]
    fn test_clip_segment_inside_is_unchanged() {
        let bb = unit_box();
        let mut start = Vec3::new(1.0, 1.0, 1.0);
        let mut end = Vec3::new(9.0, 2.0, 3.0);
        assert!(bb.clip(&mut start, &mut end));
        assert_eq!(start, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(end, Vec3::new(9.0, 2.0, 3.0));
    }

    #[test]
    fn test_transformed_box_translation() {
        let bb = unit_box().transformed(&Affine3A::from_translation(Vec3::new(100.0, 0.0, -10.0)));
        assert_eq!(bb.min, Vec3::new(100.0, 0.0, -10.0));
        assert_eq!(bb.max, Vec3::new(110.0, 10.0, 0.0));
    }

    #[test]
    fn test_strict_polygon_containment() {
        let square = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)];
        assert!(polygon_contains_strict(&square, Vec2::new(0.5, 0.5)));
        assert!(!polygon_contains_strict(&square, Vec2::new(1.0, 0.5)), "edge is not strictly inside");
        assert!(!polygon_contains_strict(&square, Vec2::new(1.5, 0.5)));
    }
}
