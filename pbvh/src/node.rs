// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree nodes, node handles, and the named flag transitions.

use alloc::vec::Vec;
use core::ops::Range;
use core::sync::atomic::{AtomicU64, Ordering};

use pbvh_bounds::Aabb3;

use crate::flags::NodeFlags;

/// Index of a node in [`Tree::nodes`](crate::Tree::nodes).
///
/// Node 0 is always the root. Children of an internal node are stored as two consecutive
/// entries after their parent. Indices are only valid for the tree that produced them and are
/// not stable across rebuilds; use [`Node::stable_id`] for identity that outlives a rebuild.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeIndex(pub(crate) u32);

impl NodeIndex {
    /// The root node.
    pub const ROOT: Self = Self(0);

    #[allow(
        clippy::cast_possible_truncation,
        reason = "node arrays are far below u32::MAX entries"
    )]
    pub(crate) const fn new(idx: usize) -> Self {
        Self(idx as u32)
    }

    /// Position in the node array.
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

static NEXT_STABLE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_stable_id() -> u64 {
    NEXT_STABLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Local triangulation of a dynamic-topology leaf.
///
/// `verts` maps local indices to mesh vertices; `tris` index into `verts`; `faces` holds the
/// mesh face each triangle came from. Hidden faces are left out when the tree respects hide.
#[derive(Clone, Debug, Default)]
pub struct TriBuffer {
    /// Mesh vertex for each local vertex.
    pub verts: Vec<u32>,
    /// Local triangles.
    pub tris: Vec<[u32; 3]>,
    /// Mesh face of each triangle.
    pub faces: Vec<u32>,
}

/// One node of the hierarchy.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) flags: NodeFlags,
    pub(crate) bounds: Aabb3,
    pub(crate) orig_bounds: Aabb3,
    /// Zero for leaves. The root is never a child, so zero is free as a sentinel.
    pub(crate) children_offset: u32,
    pub(crate) prim_offset: u32,
    pub(crate) prim_count: u32,
    /// Unique vertices first, then shared ones.
    pub(crate) verts: Vec<u32>,
    pub(crate) unique_verts: u32,
    pub(crate) stable_id: u64,
    pub(crate) tmin: f32,
    pub(crate) tris: Option<TriBuffer>,
    /// Area of each primitive in the leaf's range, in range order.
    pub(crate) areas: Vec<f32>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            flags: NodeFlags::empty(),
            bounds: Aabb3::EMPTY,
            orig_bounds: Aabb3::EMPTY,
            children_offset: 0,
            prim_offset: 0,
            prim_count: 0,
            verts: Vec::new(),
            unique_verts: 0,
            stable_id: next_stable_id(),
            tmin: 0.0,
            tris: None,
            areas: Vec::new(),
        }
    }
}

impl Node {
    /// Current flag set.
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// Whether the node is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(NodeFlags::LEAF)
    }

    /// Live bounding box.
    pub fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    /// Bounding box snapshot taken before the active deformation.
    pub fn original_bounds(&self) -> &Aabb3 {
        &self.orig_bounds
    }

    /// The two children of an internal node.
    pub fn children(&self) -> Option<(NodeIndex, NodeIndex)> {
        if self.is_leaf() || self.children_offset == 0 {
            return None;
        }
        let c = self.children_offset;
        Some((NodeIndex(c), NodeIndex(c + 1)))
    }

    /// Range of this leaf in [`Tree::prim_indices`](crate::Tree::prim_indices).
    /// Empty for internal nodes.
    pub fn prim_range(&self) -> Range<usize> {
        let start = self.prim_offset as usize;
        start..start + self.prim_count as usize
    }

    /// Every vertex referenced by the leaf's primitives, unique ones first.
    pub fn verts(&self) -> &[u32] {
        &self.verts
    }

    /// Vertices this leaf owns. No other leaf lists them as unique.
    pub fn unique_verts(&self) -> &[u32] {
        &self.verts[..self.unique_verts as usize]
    }

    /// Vertices this leaf touches but another leaf owns.
    pub fn shared_verts(&self) -> &[u32] {
        &self.verts[self.unique_verts as usize..]
    }

    /// Identity that is never reused, even across rebuilds.
    pub fn stable_id(&self) -> u64 {
        self.stable_id
    }

    /// Entry parameter (or squared distance) recorded by the last nearest-first search.
    pub fn tmin(&self) -> f32 {
        self.tmin
    }

    /// Triangulation buffer of a dynamic-topology leaf.
    pub fn tri_buffer(&self) -> Option<&TriBuffer> {
        self.tris.as_ref()
    }

    /// Area of each primitive in [`Node::prim_range`], refreshed by
    /// [`Tree::update_tri_areas`](crate::Tree::update_tri_areas).
    pub fn primitive_areas(&self) -> &[f32] {
        &self.areas
    }

    /// True only for leaves whose vertices are all hidden.
    pub fn fully_hidden(&self) -> bool {
        self.flags.contains(NodeFlags::LEAF | NodeFlags::FULLY_HIDDEN)
    }

    /// True only for leaves with no vertex mask below 1.
    pub fn fully_masked(&self) -> bool {
        self.flags.contains(NodeFlags::LEAF | NodeFlags::FULLY_MASKED)
    }

    /// True only for leaves with no vertex mask above 0.
    pub fn fully_unmasked(&self) -> bool {
        self.flags.contains(NodeFlags::LEAF | NodeFlags::FULLY_UNMASKED)
    }

    pub(crate) fn set_flag(&mut self, flag: NodeFlags, value: bool) {
        debug_assert!(
            !NodeFlags::FULLY.intersects(flag) || self.is_leaf(),
            "aggregate flags are leaf-only"
        );
        self.flags.set(flag, value);
    }

    /// Vertices moved: invalidate everything derived from positions.
    pub fn mark_update(&mut self) {
        self.flags |= NodeFlags::GEOMETRY;
    }

    /// Mask values changed.
    pub fn mark_update_mask(&mut self) {
        self.flags |=
            NodeFlags::UPDATE_MASK | NodeFlags::UPDATE_DRAW_BUFFERS | NodeFlags::UPDATE_REDRAW;
    }

    /// Vertex colors changed.
    pub fn mark_update_color(&mut self) {
        self.flags |=
            NodeFlags::UPDATE_COLOR | NodeFlags::UPDATE_DRAW_BUFFERS | NodeFlags::UPDATE_REDRAW;
    }

    /// Face-set labels changed.
    pub fn mark_update_face_sets(&mut self) {
        self.mark_redraw();
    }

    /// Hide state changed.
    pub fn mark_update_visibility(&mut self) {
        self.flags |= NodeFlags::VISIBILITY;
    }

    /// Draw buffers must be rebuilt from scratch.
    pub fn mark_rebuild_draw(&mut self) {
        self.flags |= NodeFlags::DRAW | NodeFlags::UPDATE_CURVATURE | NodeFlags::UPDATE_TRI_AREAS;
    }

    /// Refill draw buffers and redraw.
    pub fn mark_redraw(&mut self) {
        self.flags |= NodeFlags::UPDATE_DRAW_BUFFERS | NodeFlags::UPDATE_REDRAW;
    }

    /// Positions changed without affecting bounds (e.g. a tangential smooth).
    pub fn mark_positions_update(&mut self) {
        self.flags |= NodeFlags::UPDATE_NORMALS | NodeFlags::UPDATE_CURVATURE;
    }

    /// Re-snapshot the original bounding box on the next bounds update.
    pub fn mark_original_update(&mut self) {
        self.flags |= NodeFlags::UPDATE_ORIGINAL_BB;
    }

    /// Curvature directions are stale.
    pub fn mark_curvature_update(&mut self) {
        self.flags |= NodeFlags::UPDATE_CURVATURE;
    }

    /// Pixel-paint regions must be rebuilt.
    pub fn mark_rebuild_pixels(&mut self) {
        if self.is_leaf() {
            self.flags |= NodeFlags::REBUILD_PIXELS;
        }
    }

    /// Called by the drawing consumer once it has consumed the draw-side bits.
    pub fn clear_draw_flags(&mut self) {
        self.flags -= NodeFlags::DRAW;
    }
}
