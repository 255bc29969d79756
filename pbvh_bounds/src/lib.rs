// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=pbvh_bounds --heading-base-level=0

//! PBVH Bounds: 3D axis-aligned boxes and the ray kernels used by sculpt hierarchies.
//!
//! This crate is the geometry leaf under [`pbvh`](https://docs.rs/pbvh). It has no notion of
//! trees or meshes; it only knows boxes, rays, triangles, and planes.
//!
//! - [`Aabb3`]: min/max box. The [reset](Aabb3::EMPTY) box (`min = +inf`, `max = -inf`) is the
//!   identity for [`union`](Aabb3::union).
//! - [`CentroidAabb`]: a box plus its centroid, used while partitioning primitives.
//! - [`RayAabbPrecalc`]: slab test that reports the entry parameter, for nearest-first ordering.
//! - [`RayTriPrecalc`]: watertight ray/triangle test (no cracks along shared edges).
//! - [`DistRayAabbPrecalc`] and [`dist_squared_ray_to_seg`]: squared distances from a ray,
//!   for "nearest to ray" queries that don't require an actual hit.
//! - [`Frustum`]: plane-set classification of boxes.
//!
//! # Example
//!
//! ```rust
//! use glam::Vec3;
//! use pbvh_bounds::{Aabb3, RayAabbPrecalc, RayTriPrecalc};
//!
//! let mut bb = Aabb3::EMPTY;
//! bb.include_point(Vec3::ZERO);
//! bb.include_point(Vec3::new(1.0, 2.0, 1.0));
//! assert_eq!(bb.widest_axis(), 1);
//!
//! let origin = Vec3::new(0.5, 0.5, -3.0);
//! let dir = Vec3::Z;
//! let tmin = RayAabbPrecalc::new(origin, dir).intersect(&bb).unwrap();
//! assert!((tmin - 3.0).abs() < 1e-6);
//!
//! let tri = RayTriPrecalc::new(dir);
//! let t = tri
//!     .intersect(origin, Vec3::ZERO, Vec3::X, Vec3::Y)
//!     .unwrap();
//! assert!((t - 3.0).abs() < 1e-6);
//! ```
//!
//! ### Float semantics
//!
//! All coordinates are `f32`. This crate assumes no NaNs. Ray directions are expected to be
//! normalized when depths are interpreted as distances.

#![no_std]

mod aabb;
mod frustum;
mod ray;

pub use aabb::{Aabb3, CentroidAabb, union_aabb};
pub use frustum::{Containment, Frustum};
pub use ray::{
    DistRayAabbPrecalc, RayAabbPrecalc, RayTriPrecalc, dist_squared_ray_to_seg,
    dist_squared_ray_to_tri, tri_normal,
};

pub use glam::Vec3;
