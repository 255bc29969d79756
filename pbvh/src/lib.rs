// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=pbvh --heading-base-level=0

//! PBVH: a bounding volume hierarchy for sculpting and painting over large meshes.
//!
//! The tree indexes the primitives of a [`PrimitiveSource`]: fan triangles of a polygon mesh
//! ([`MeshSource`]), subdivision grids ([`GridsSource`]), or the faces of a shared
//! dynamic-topology mesh ([`DynTopoSource`]). It is built once, then kept valid incrementally:
//! tools mark the leaves they touched and the update passes recompute only those.
//!
//! - Build: [`Tree::build`] splits at the centroid midpoint of the widest axis, never splits a
//!   face across leaves, and keeps every leaf to one material.
//! - Flags: every pending operation is a [`NodeFlags`] bit set through named transitions such
//!   as [`Node::mark_update`].
//! - Traversal: [`Tree::search`], [`Tree::search_gather`], [`Tree::search_post_order`], and the
//!   nearest-first [`Tree::search_occluded`]. All use an explicit stack.
//! - Queries: [`Tree::raycast`] and [`Tree::find_nearest_to_ray`], optionally against a
//!   per-stroke snapshot of the original coordinates.
//! - Updates: [`Tree::update_bounds`], [`Tree::update_normals`], [`Tree::update_visibility`],
//!   [`Tree::update_mask`], and friends. With the `parallel` feature these fan out on rayon.
//! - Caching: [`TreeCache`] keeps trees per object while the source layout is unchanged.
//!
//! # Example
//!
//! ```rust
//! use glam::Vec3;
//! use pbvh::{MeshSource, NodeFlags, RaycastOptions, Tree};
//!
//! // A single unit quad in the XY plane.
//! let positions = [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y];
//! let source = MeshSource::new(&positions, &[0, 4], &[0, 1, 2, 3]).unwrap();
//! let mut tree = Tree::from_source(&source);
//! assert_eq!(tree.leaf_count(), 1);
//!
//! tree.update_normals(&source);
//! assert_eq!(tree.vertex_normal(0), Vec3::Z);
//!
//! let hit = tree.raycast(
//!     &source,
//!     Vec3::new(0.25, 0.5, 2.0),
//!     -Vec3::Z,
//!     &RaycastOptions::default(),
//! );
//! assert!(hit.hit);
//! assert!((hit.depth - 2.0).abs() < 1e-6);
//!
//! // A brush moved vertices under the root leaf.
//! let leaf = tree.search_gather(|_| true)[0];
//! tree.node_mut(leaf).mark_update();
//! tree.update_bounds(&source, NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
//! assert!(!tree.node(leaf).flags().contains(NodeFlags::UPDATE_BB));
//! ```
//!
//! ## Features
//!
//! - `std` (default): forwards to `glam/std`.
//! - `parallel` (default): runs update phases on the rayon pool. Implies `std`.
//! - `libm`: `no_std` float math through glam.

#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod atomic;
mod build;
mod cache;
mod error;
mod flags;
mod node;
mod origco;
mod parallel;
mod raycast;
pub mod source;
mod traverse;
mod tree;
mod update;

#[cfg(test)]
mod test_util;

pub use build::{BuildSettings, STACK_FIXED_DEPTH};
pub use cache::{ObjectKey, TreeCache};
pub use error::SourceError;
pub use flags::NodeFlags;
pub use node::{Node, NodeIndex, TriBuffer};
pub use parallel::{parallel_disabled, set_parallel_disabled};
pub use raycast::{NearestToRay, RaycastHit, RaycastOptions};
pub use source::{
    DynTopoMesh, DynTopoSource, GridsSource, MeshSource, PrimitiveSource, SourceKind,
    SourceStamp,
};
pub use traverse::Search;
pub use tree::Tree;

pub use pbvh_bounds::{Aabb3, Containment, Frustum};
