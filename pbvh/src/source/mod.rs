// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Primitive sources: the read-only geometry a tree indexes.
//!
//! A source hands the tree a flat list of primitives. Each primitive has a set of vertices, an
//! owner (the face it belongs to, which must never be split across leaves), an optional
//! material key, and one or more facets used for ray tests.
//!
//! Three adapters are provided:
//!
//! - [`MeshSource`]: polygon mesh, one primitive per fan triangle, owned by its polygon.
//! - [`GridsSource`]: multires-style grids, one primitive per grid, owned by its base face.
//! - [`DynTopoSource`]: a shared triangle mesh, one primitive per face.

use glam::Vec3;
use pbvh_bounds::Aabb3;

mod dyntopo;
mod grids;
mod mesh;

pub use dyntopo::{DynTopoMesh, DynTopoSource};
pub use grids::GridsSource;
pub use mesh::MeshSource;

/// Default leaf primitive limit for meshes.
pub const DEFAULT_LEAF_LIMIT: usize = 4000;

/// Default leaf primitive limit for dynamic topology.
pub const DYNTOPO_LEAF_LIMIT: usize = 400;

/// Which storage a tree indexes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Polygon mesh triangles.
    Faces,
    /// Subdivision grids.
    Grids,
    /// Dynamic-topology triangle mesh.
    DynTopo,
}

/// Material identity used to keep leaves homogeneous.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct MaterialKey {
    /// Material slot.
    pub material: i32,
    /// Smooth shading flag.
    pub smooth: bool,
}

/// A ray-testable piece of a primitive, as vertex indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Facet {
    /// Triangle, counter-clockwise when seen from the front.
    Tri([u32; 3]),
    /// Quad, split along its `0-2` diagonal for ray tests.
    Quad([u32; 4]),
}

impl Facet {
    /// The facet's vertices.
    pub fn verts(&self) -> &[u32] {
        match self {
            Self::Tri(v) => v,
            Self::Quad(v) => v,
        }
    }
}

/// Element counts compared by the tree cache.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ElementCounts {
    /// Vertices.
    pub verts: usize,
    /// Edges.
    pub edges: usize,
    /// Face corners.
    pub loops: usize,
    /// Faces.
    pub faces: usize,
}

bitflags::bitflags! {
    /// Which optional attribute layers a source carries.
    ///
    /// Only the layout is compared by the cache, never the layer contents.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LayerSet: u16 {
        /// Per-face hide flags.
        const HIDE_FACE = 1 << 0;
        /// Per-vertex hide flags.
        const HIDE_VERT = 1 << 1;
        /// Per-face material slots.
        const MATERIAL  = 1 << 2;
        /// Per-face smooth flags.
        const SMOOTH    = 1 << 3;
        /// Per-vertex mask.
        const MASK      = 1 << 4;
        /// Per-face face-set labels.
        const FACE_SETS = 1 << 5;
    }
}

/// Validity snapshot of a source, stored next to a cached tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceStamp {
    /// Storage kind.
    pub kind: SourceKind,
    /// Element counts.
    pub counts: ElementCounts,
    /// Attribute layout.
    pub layers: LayerSet,
    /// Grid side length, or 0.
    pub grid_size: usize,
}

/// Uniform access to the primitives a tree indexes.
///
/// Implementations must be cheap to query per primitive; the builder and the update passes
/// call these in tight loops, possibly from several threads.
pub trait PrimitiveSource: Sync {
    /// Storage kind.
    fn kind(&self) -> SourceKind;

    /// Number of primitives.
    fn primitive_count(&self) -> usize;

    /// Number of vertices. Vertex indices are in `0..vertex_count()`.
    fn vertex_count(&self) -> usize;

    /// Position of a vertex.
    fn position(&self, vert: u32) -> Vec3;

    /// Call `f` for every vertex of `prim`. Vertices may repeat.
    fn for_each_vertex(&self, prim: usize, f: impl FnMut(u32));

    /// Call `f` for every facet of `prim`, skipping hidden ones when `respect_hide` is set.
    fn for_each_facet(&self, prim: usize, respect_hide: bool, f: impl FnMut(Facet));

    /// Call `f` with the vertex loop of every face whose normal contributes to vertex
    /// normals, reporting each face exactly once across all of its primitives.
    fn for_each_normal_face(&self, prim: usize, f: impl FnMut(&[u32]));

    /// Owner group of `prim`. Primitives with the same owner always share a leaf.
    fn owner_of(&self, prim: usize) -> usize;

    /// Element reported as the active primitive by ray queries.
    fn active_element(&self, prim: usize) -> usize {
        self.owner_of(prim)
    }

    /// Material key, or `None` when the source has no material attributes.
    fn material_of(&self, _prim: usize) -> Option<MaterialKey> {
        None
    }

    /// Whether `prim` is hidden as a whole.
    fn is_primitive_hidden(&self, _prim: usize) -> bool {
        false
    }

    /// Whether the source carries per-vertex hide state.
    fn has_vertex_hide(&self) -> bool {
        false
    }

    /// Whether a vertex is hidden.
    fn is_vertex_hidden(&self, _vert: u32) -> bool {
        false
    }

    /// Whether the source carries a mask layer.
    fn has_mask(&self) -> bool {
        false
    }

    /// Mask value of a vertex in `0..=1`.
    fn mask(&self, _vert: u32) -> f32 {
        0.0
    }

    /// Leaf primitive limit that keeps leaves at a comparable vertex count.
    fn default_leaf_limit(&self) -> usize {
        DEFAULT_LEAF_LIMIT
    }

    /// The shared dynamic-topology mesh, if this source wraps one.
    fn dyntopo_mesh(&self) -> Option<&alloc::sync::Arc<DynTopoMesh>> {
        None
    }

    /// Snapshot used to decide whether a cached tree is still valid.
    fn stamp(&self) -> SourceStamp;

    /// Bounds of `prim` using the source positions.
    fn primitive_bounds(&self, prim: usize) -> Aabb3 {
        let mut bb = Aabb3::EMPTY;
        self.for_each_vertex(prim, |v| bb.include_point(self.position(v)));
        bb
    }
}

/// Count distinct undirected edges of a set of closed vertex loops.
pub(crate) fn count_edges<'a>(loops: impl Iterator<Item = &'a [u32]>) -> usize {
    let mut edges = hashbrown::HashSet::new();
    for face in loops {
        for (i, &a) in face.iter().enumerate() {
            let b = face[(i + 1) % face.len()];
            edges.insert((a.min(b), a.max(b)));
        }
    }
    edges.len()
}

/// Newell normal of a vertex loop, normalized, or zero when degenerate.
pub(crate) fn loop_normal(face: &[u32], position: impl Fn(u32) -> Vec3) -> Vec3 {
    let mut n = Vec3::ZERO;
    if face.is_empty() {
        return n;
    }
    let mut prev = position(face[face.len() - 1]);
    for &v in face {
        let cur = position(v);
        n += prev.cross(cur);
        prev = cur;
    }
    n.normalize_or_zero()
}
