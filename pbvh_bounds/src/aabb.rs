// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned boxes and centroid boxes.

use glam::Vec3;

/// Axis-aligned bounding box in 3D.
///
/// After any union with a non-empty box, `min <= max` componentwise.
/// [`Aabb3::EMPTY`] is inverted on purpose so that it absorbs into any union.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb3 {
    /// The reset box: `min = +inf`, `max = -inf`. Identity element for [`Aabb3::union`].
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    /// Create a new box from min/max corners.
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Reset to [`Aabb3::EMPTY`].
    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }

    /// Smallest box containing all `points`. Empty input yields [`Aabb3::EMPTY`].
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bb = Self::EMPTY;
        for p in points {
            bb.include_point(p);
        }
        bb
    }

    /// Grow to contain `p`.
    #[inline]
    pub fn include_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to contain `other`.
    #[inline]
    pub fn include(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// The union of two boxes.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        union_aabb(*self, *other)
    }

    /// The intersection of two boxes. May be empty (inverted).
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Return true if the box is empty or inverted on any axis.
    pub fn is_empty(&self) -> bool {
        self.max.cmplt(self.min).any()
    }

    /// Whether the box contains the point (inclusive).
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    /// Whether `other` lies fully inside this box (inclusive). An empty `other` is contained.
    pub fn contains(&self, other: &Self) -> bool {
        other.is_empty() || (self.min.cmple(other.min).all() && other.max.cmple(self.max).all())
    }

    /// Midpoint of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Per-axis extent (`max - min`).
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Box volume, or zero when empty.
    pub fn volume(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        d.x * d.y * d.z
    }

    /// Index (0, 1, 2) of the axis with the largest extent.
    ///
    /// Ties resolve toward the later axis, so a cube reports axis 2.
    pub fn widest_axis(&self) -> usize {
        let d = self.size();
        if d.x > d.y {
            if d.x > d.z { 0 } else { 2 }
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }
}

/// Union of two boxes.
#[inline]
pub fn union_aabb(a: Aabb3, b: Aabb3) -> Aabb3 {
    Aabb3 {
        min: a.min.min(b.min),
        max: a.max.max(b.max),
    }
}

/// A box together with its centroid.
///
/// Only used while building: the centroid drives the midpoint partition, and a
/// [`CentroidAabb`] set is cheap to summarize into a box of centroids.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CentroidAabb {
    /// The primitive's bounds.
    pub bounds: Aabb3,
    /// `(min + max) / 2`.
    pub centroid: Vec3,
}

impl CentroidAabb {
    /// Attach the centroid to a box.
    pub fn new(bounds: Aabb3) -> Self {
        Self {
            bounds,
            centroid: bounds.center(),
        }
    }
}

impl From<Aabb3> for CentroidAabb {
    fn from(bounds: Aabb3) -> Self {
        Self::new(bounds)
    }
}
