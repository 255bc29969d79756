// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The hierarchy itself: construction, accessors, deformation, and tree-wide helpers.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::AtomicBool;

use glam::Vec3;
use pbvh_bounds::Aabb3;

use crate::atomic::AtomicVec3;
use crate::build::{self, BuildSettings};
use crate::flags::NodeFlags;
use crate::node::{Node, NodeIndex};
use crate::origco::OriginalCoords;
use crate::source::{PrimitiveSource, SourceKind};

/// Bounding volume hierarchy over the primitives of one [`PrimitiveSource`].
///
/// The tree owns its nodes, the primitive-index permutation, per-vertex normals, and (while a
/// deformation is applied) a private copy of the vertex positions. The source itself is only
/// borrowed by each call that needs it and must describe the same geometry the tree was built
/// from; [`TreeCache`](crate::TreeCache) checks that on lookup.
pub struct Tree {
    pub(crate) kind: SourceKind,
    pub(crate) nodes: Vec<Node>,
    pub(crate) prim_indices: Vec<u32>,
    pub(crate) settings: BuildSettings,
    pub(crate) vertex_count: usize,
    pub(crate) normals: Vec<AtomicVec3>,
    /// Vertices zeroed by the running normals pass and not yet normalized.
    pub(crate) touched: Vec<AtomicBool>,
    pub(crate) deformed: Option<Vec<Vec3>>,
    pub(crate) origco: OriginalCoords,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("kind", &self.kind)
            .field("nodes", &self.nodes.len())
            .field("leaves", &self.leaf_count())
            .field("primitives", &self.prim_indices.len())
            .field("vertices", &self.vertex_count)
            .field("deformed", &self.deformed.is_some())
            .field("stroke_id", &self.origco.stroke_id())
            .finish_non_exhaustive()
    }
}

/// Vertex positions as the tree sees them: the deformed copy when present, else the source.
pub(crate) struct Positions<'a, S> {
    source: &'a S,
    deformed: Option<&'a [Vec3]>,
}

impl<'a, S: PrimitiveSource> Positions<'a, S> {
    pub(crate) fn new(source: &'a S, deformed: Option<&'a [Vec3]>) -> Self {
        Self { source, deformed }
    }

    pub(crate) fn get(&self, vert: u32) -> Vec3 {
        match self.deformed {
            Some(d) => d[vert as usize],
            None => self.source.position(vert),
        }
    }
}

impl Tree {
    /// Build a tree over every primitive of `source`.
    pub fn build<S: PrimitiveSource>(source: &S, settings: BuildSettings) -> Self {
        let built = build::build(source, &settings);
        let vertex_count = source.vertex_count();
        Self {
            kind: source.kind(),
            nodes: built.nodes,
            prim_indices: built.prim_indices,
            settings,
            vertex_count,
            normals: (0..vertex_count).map(|_| AtomicVec3::default()).collect(),
            touched: (0..vertex_count).map(|_| AtomicBool::new(false)).collect(),
            deformed: None,
            origco: OriginalCoords::default(),
        }
    }

    /// Build with the source's preferred leaf limit.
    pub fn from_source<S: PrimitiveSource>(source: &S) -> Self {
        Self::build(source, BuildSettings::for_source(source))
    }

    /// Storage kind the tree was built over.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Settings used at build time.
    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// All nodes. Index 0 is the root.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// A node by index.
    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx.get()]
    }

    /// A node by index, for the `mark_*` transitions.
    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx.get()]
    }

    /// Every leaf, in node-array order.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(i, n)| (NodeIndex::new(i), n))
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Primitive indices, permuted so every leaf owns a contiguous range.
    pub fn prim_indices(&self) -> &[u32] {
        &self.prim_indices
    }

    /// Primitives owned by a leaf. Empty for internal nodes.
    pub fn node_prim_indices(&self, idx: NodeIndex) -> &[u32] {
        &self.prim_indices[self.node(idx).prim_range()]
    }

    /// Bounds of the whole tree.
    pub fn bounding_box(&self) -> Aabb3 {
        self.nodes[0].bounds
    }

    /// Number of vertices of the indexed source.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Vertex normal as of the last [`Tree::update_normals`].
    pub fn vertex_normal(&self, vert: u32) -> Vec3 {
        self.normals[vert as usize].load()
    }

    /// Whether a deformed position copy is active.
    pub fn is_deformed(&self) -> bool {
        self.deformed.is_some()
    }

    /// The deformed position copy, if active.
    pub fn deformed_positions(&self) -> Option<&[Vec3]> {
        self.deformed.as_deref()
    }

    /// Position of a vertex as seen by queries and update passes.
    pub fn position<S: PrimitiveSource>(&self, source: &S, vert: u32) -> Vec3 {
        Positions::new(source, self.deformed.as_deref()).get(vert)
    }

    /// Replace vertex positions with `positions` without touching the source.
    ///
    /// The first call copies the source positions into the tree; later calls reuse that copy.
    /// Every leaf is marked updated and boxes are refreshed, original boxes included.
    pub fn apply_deformed_positions<S: PrimitiveSource>(&mut self, source: &S, positions: &[Vec3]) {
        debug_assert_eq!(
            positions.len(),
            self.vertex_count,
            "deformed positions must cover every vertex"
        );
        let vertex_count = self.vertex_count;
        let deformed = self.deformed.get_or_insert_with(|| {
            let mut copy = vec![Vec3::ZERO; vertex_count];
            for (v, slot) in (0_u32..).zip(copy.iter_mut()) {
                *slot = source.position(v);
            }
            copy
        });
        let mut changed = 0_usize;
        for (dst, &src) in deformed.iter_mut().zip(positions) {
            if *dst != src {
                *dst = src;
                changed += 1;
            }
        }
        log::debug!("applied deformation: {changed} of {vertex_count} vertices moved");
        for node in self.nodes.iter_mut().filter(|n| n.is_leaf()) {
            node.mark_update();
        }
        self.update_bounds(source, NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
    }

    /// Drop the deformed copy; positions are read from the source again.
    ///
    /// Boxes are not refreshed; mark and update the affected nodes if positions differ.
    pub fn clear_deformation(&mut self) {
        self.deformed = None;
    }

    /// Start (or continue) stroke `stroke_id` for original-coordinate queries.
    ///
    /// A different id than the current one drops every captured vertex exactly once.
    pub fn begin_stroke(&mut self, stroke_id: i32) {
        self.origco.begin_stroke(stroke_id, self.vertex_count);
    }

    /// Current stroke id, if any.
    pub fn stroke_id(&self) -> Option<i32> {
        self.origco.stroke_id()
    }

    /// Forget the original-coordinate snapshot.
    pub fn end_stroke(&mut self) {
        self.origco.clear();
    }

    /// Snapshot positions and normals of every vertex of `nodes` that isn't captured yet.
    ///
    /// Call before deforming so that original-mode ray queries see pre-stroke geometry.
    pub fn capture_original<S: PrimitiveSource>(&mut self, source: &S, nodes: &[NodeIndex]) {
        let Self {
            nodes: all,
            normals,
            deformed,
            origco,
            ..
        } = self;
        let pos = Positions::new(source, deformed.as_deref());
        for idx in nodes {
            origco.capture(all[idx.get()].verts(), |v| {
                (pos.get(v), normals[v as usize].load())
            });
        }
    }

    /// Captured original position of a vertex.
    pub fn original_position(&self, vert: u32) -> Option<Vec3> {
        self.origco.get(vert)
    }

    /// Captured original normal of a vertex.
    pub fn original_normal(&self, vert: u32) -> Option<Vec3> {
        self.origco.normal(vert)
    }

    /// Flag every leaf for a pixel-region rebuild.
    pub fn mark_rebuild_pixels_all(&mut self) {
        for node in &mut self.nodes {
            node.mark_rebuild_pixels();
        }
    }

    /// Union of the boxes of leaves pending redraw. Empty when nothing is pending.
    pub fn redraw_bounds(&self) -> Aabb3 {
        let mut bb = Aabb3::EMPTY;
        for (_, node) in self.leaves() {
            if node.flags.contains(NodeFlags::UPDATE_REDRAW) {
                bb.include(&node.bounds);
            }
        }
        bb
    }
}
