// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane-set culling.

use glam::{Vec3, Vec4};

use crate::aabb::Aabb3;

/// Result of classifying a box against a [`Frustum`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Containment {
    /// Fully on the inner side of every plane.
    Inside,
    /// Straddles at least one plane.
    Intersect,
    /// Fully on the outer side of some plane.
    Outside,
}

/// Up to six planes `(n, d)` with the inside where `n · p + d >= 0`.
#[derive(Copy, Clone, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
    len: usize,
}

impl Frustum {
    /// Build from at most six planes; extra planes are ignored.
    pub fn new(planes: &[Vec4]) -> Self {
        let mut out = [Vec4::ZERO; 6];
        let len = planes.len().min(6);
        out[..len].copy_from_slice(&planes[..len]);
        Self { planes: out, len }
    }

    /// The active planes.
    pub fn planes(&self) -> &[Vec4] {
        &self.planes[..self.len]
    }

    /// Classify `bb` against all planes.
    ///
    /// Uses the box corner nearest each plane's inside direction for rejection and the
    /// opposite corner for containment, so the result is conservative.
    pub fn classify(&self, bb: &Aabb3) -> Containment {
        let mut ret = Containment::Inside;
        for plane in self.planes() {
            let n = plane.truncate();
            let mut vmin = Vec3::ZERO;
            let mut vmax = Vec3::ZERO;
            for axis in 0..3 {
                if n[axis] < 0.0 {
                    vmin[axis] = bb.min[axis];
                    vmax[axis] = bb.max[axis];
                } else {
                    vmin[axis] = bb.max[axis];
                    vmax[axis] = bb.min[axis];
                }
            }
            if n.dot(vmin) + plane.w < 0.0 {
                return Containment::Outside;
            } else if n.dot(vmax) + plane.w <= 0.0 {
                ret = Containment::Intersect;
            }
        }
        ret
    }

    /// True unless the box is fully outside.
    pub fn intersects_aabb(&self, bb: &Aabb3) -> bool {
        self.classify(bb) != Containment::Outside
    }

    /// True unless the box is fully inside.
    pub fn excludes_aabb(&self, bb: &Aabb3) -> bool {
        self.classify(bb) != Containment::Inside
    }
}
