// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ray kernels: slab test, watertight triangle test, and ray distances.

use glam::Vec3;

use crate::aabb::Aabb3;

#[inline]
fn safe_inv(d: f32) -> f32 {
    if d != 0.0 { 1.0 / d } else { f32::MAX }
}

/// Precomputed ray for repeated box tests.
#[derive(Copy, Clone, Debug)]
pub struct RayAabbPrecalc {
    origin: Vec3,
    inv_dir: Vec3,
    sign: [usize; 3],
}

impl RayAabbPrecalc {
    /// Precompute reciprocals and direction signs. Zero direction components are treated as
    /// a very large reciprocal rather than infinity.
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        let inv_dir = Vec3::new(safe_inv(dir.x), safe_inv(dir.y), safe_inv(dir.z));
        let sign = [
            usize::from(inv_dir.x < 0.0),
            usize::from(inv_dir.y < 0.0),
            usize::from(inv_dir.z < 0.0),
        ];
        Self {
            origin,
            inv_dir,
            sign,
        }
    }

    /// Slab test. Returns the entry parameter along the ray when the ray's line crosses the
    /// box.
    ///
    /// Boxes entirely behind the origin are still reported (with a negative entry); the
    /// primitive tests reject hits behind the origin, so this only costs some extra visits.
    pub fn intersect(&self, bb: &Aabb3) -> Option<f32> {
        let corners = [bb.min, bb.max];
        let mut tmin = (corners[self.sign[0]].x - self.origin.x) * self.inv_dir.x;
        let mut tmax = (corners[1 - self.sign[0]].x - self.origin.x) * self.inv_dir.x;
        let tymin = (corners[self.sign[1]].y - self.origin.y) * self.inv_dir.y;
        let tymax = (corners[1 - self.sign[1]].y - self.origin.y) * self.inv_dir.y;
        if tmin > tymax || tymin > tmax {
            return None;
        }
        tmin = tmin.max(tymin);
        tmax = tmax.min(tymax);
        let tzmin = (corners[self.sign[2]].z - self.origin.z) * self.inv_dir.z;
        let tzmax = (corners[1 - self.sign[2]].z - self.origin.z) * self.inv_dir.z;
        if tmin > tzmax || tzmin > tmax {
            return None;
        }
        Some(tmin.max(tzmin))
    }
}

/// Precomputed ray shear for the watertight ray/triangle test.
///
/// Vertices are transformed into a space where the ray runs along +Z, then the test is done
/// with 2D edge functions. Triangles sharing an edge never both miss a ray crossing that edge.
#[derive(Copy, Clone, Debug)]
pub struct RayTriPrecalc {
    kx: usize,
    ky: usize,
    kz: usize,
    sx: f32,
    sy: f32,
    sz: f32,
}

impl RayTriPrecalc {
    /// Build the shear for `dir`.
    pub fn new(dir: Vec3) -> Self {
        let a = dir.abs();
        let kz = if a.x > a.y {
            if a.x > a.z { 0 } else { 2 }
        } else if a.y > a.z {
            1
        } else {
            2
        };
        let mut kx = (kz + 1) % 3;
        let mut ky = (kx + 1) % 3;
        if dir[kz] < 0.0 {
            core::mem::swap(&mut kx, &mut ky);
        }
        let inv = 1.0 / dir[kz];
        Self {
            kx,
            ky,
            kz,
            sx: dir[kx] * inv,
            sy: dir[ky] * inv,
            sz: inv,
        }
    }

    /// Intersect the ray starting at `origin` with triangle `(v0, v1, v2)`.
    ///
    /// Both windings hit. Returns the ray parameter of the hit, which is never negative.
    /// Degenerate triangles never hit.
    pub fn intersect(&self, origin: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<f32> {
        let (kx, ky, kz) = (self.kx, self.ky, self.kz);
        let a = v0 - origin;
        let b = v1 - origin;
        let c = v2 - origin;

        let a_kx = a[kx] - self.sx * a[kz];
        let a_ky = a[ky] - self.sy * a[kz];
        let b_kx = b[kx] - self.sx * b[kz];
        let b_ky = b[ky] - self.sy * b[kz];
        let c_kx = c[kx] - self.sx * c[kz];
        let c_ky = c[ky] - self.sy * c[kz];

        let u = c_kx * b_ky - c_ky * b_kx;
        let v = a_kx * c_ky - a_ky * c_kx;
        let w = b_kx * a_ky - b_ky * a_kx;

        if (u < 0.0 || v < 0.0 || w < 0.0) && (u > 0.0 || v > 0.0 || w > 0.0) {
            return None;
        }
        let det = u + v + w;
        if det == 0.0 {
            return None;
        }
        let t = (u * a[kz] + v * b[kz] + w * c[kz]) * self.sz;
        let lambda = t / det;
        if lambda < 0.0 || !lambda.is_finite() {
            return None;
        }
        Some(lambda)
    }

    /// Intersect a quad `(v0, v1, v2, v3)` as the triangles `(v0, v1, v2)` and `(v0, v2, v3)`.
    ///
    /// Returns the nearer of the two hits.
    pub fn intersect_quad(
        &self,
        origin: Vec3,
        v0: Vec3,
        v1: Vec3,
        v2: Vec3,
        v3: Vec3,
    ) -> Option<f32> {
        match (
            self.intersect(origin, v0, v1, v2),
            self.intersect(origin, v0, v2, v3),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Unit normal of triangle `(a, b, c)` with counter-clockwise winding, or zero if degenerate.
pub fn tri_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Squared distance from the ray `(origin, dir)` to segment `(v0, v1)`.
///
/// Returns `(dist_sq, depth)` where `depth` is the projection of the nearest segment point
/// onto the ray direction. When the segment is parallel to the ray, `v0` stands in for the
/// nearest point.
pub fn dist_squared_ray_to_seg(origin: Vec3, dir: Vec3, v0: Vec3, v1: Vec3) -> (f32, f32) {
    let a = v1 - v0;
    let n = a.cross(dir);
    let nlen = n.length_squared();
    let point = if nlen == 0.0 {
        v0
    } else {
        let lambda = (origin - v0).cross(dir).dot(n) / nlen;
        if lambda <= 0.0 {
            v0
        } else if lambda >= 1.0 {
            v1
        } else {
            v0 + a * lambda
        }
    };
    let dvec = point - origin;
    let depth = dvec.dot(dir);
    (dvec.length_squared() - depth * depth, depth)
}

/// Squared distance from a ray to the edges of triangle `(v0, v1, v2)`.
///
/// Meant for rays already known to miss the triangle, so the interior is not considered.
/// Returns `(dist_sq, depth)` of the nearest edge.
pub fn dist_squared_ray_to_tri(origin: Vec3, dir: Vec3, v0: Vec3, v1: Vec3, v2: Vec3) -> (f32, f32) {
    let tri = [v0, v1, v2];
    let mut best = (f32::MAX, f32::MAX);
    let mut j = 2;
    for i in 0..3 {
        let test = dist_squared_ray_to_seg(origin, dir, tri[i], tri[j]);
        if i == 0 || test.0 < best.0 {
            best = test;
        }
        j = i;
    }
    best
}

/// Precomputed ray for squared ray-to-box distances.
#[derive(Copy, Clone, Debug)]
pub struct DistRayAabbPrecalc {
    origin: Vec3,
    dir: Vec3,
    inv_dir: Vec3,
}

impl DistRayAabbPrecalc {
    /// Precompute reciprocals for `dir`.
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir,
            inv_dir: Vec3::new(safe_inv(dir.x), safe_inv(dir.y), safe_inv(dir.z)),
        }
    }

    /// Squared distance from the ray's line to `bb`, and the depth of the nearest point.
    ///
    /// Returns zero distance when the line passes through the box. Otherwise the nearest
    /// point lies on one box edge: the edge along the axis that is neither the last slab
    /// entered nor the first slab exited.
    pub fn dist_squared(&self, bb: &Aabb3) -> (f32, f32) {
        let mut near = Vec3::ZERO;
        let mut far = Vec3::ZERO;
        for i in 0..3 {
            if self.dir[i] < 0.0 {
                near[i] = bb.max[i];
                far[i] = bb.min[i];
            } else {
                near[i] = bb.min[i];
                far[i] = bb.max[i];
            }
        }
        let tmin = (near - self.origin) * self.inv_dir;
        let tmax = (far - self.origin) * self.inv_dir;

        let mut va = Vec3::ZERO;
        let mut vb = Vec3::ZERO;

        let (rtmax, exit_axis) = if tmax.x <= tmax.y && tmax.x <= tmax.z {
            (tmax.x, 0)
        } else if tmax.y <= tmax.x && tmax.y <= tmax.z {
            (tmax.y, 1)
        } else {
            (tmax.z, 2)
        };
        va[exit_axis] = far[exit_axis];
        vb[exit_axis] = far[exit_axis];

        let (rtmin, entry_axis) = if tmin.x >= tmin.y && tmin.x >= tmin.z {
            (tmin.x, 0)
        } else if tmin.y >= tmin.x && tmin.y >= tmin.z {
            (tmin.y, 1)
        } else {
            (tmin.z, 2)
        };
        va[entry_axis] = near[entry_axis];
        vb[entry_axis] = near[entry_axis];

        if rtmin <= rtmax {
            let depth = (far - self.origin).dot(self.dir);
            return (0.0, depth);
        }

        let main_axis = if entry_axis == exit_axis {
            entry_axis
        } else {
            3 - entry_axis - exit_axis
        };
        if self.dir[main_axis] >= 0.0 {
            va[main_axis] = near[main_axis];
            vb[main_axis] = far[main_axis];
        } else {
            va[main_axis] = far[main_axis];
            vb[main_axis] = near[main_axis];
        }
        dist_squared_ray_to_seg(self.origin, self.dir, va, vb)
    }
}
