// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node flags: one bit per pending operation and per cached leaf aggregate.

bitflags::bitflags! {
    /// Node flags.
    ///
    /// `UPDATE_*` and `REBUILD_*` bits mark derived data as stale. `FULLY_*` bits are cached
    /// aggregates that are only meaningful on leaves.
    ///
    /// Call sites should go through the named transitions on [`Node`](crate::Node)
    /// (`mark_update`, `mark_update_mask`, ...) instead of setting bits directly.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        /// Node owns a primitive range and has no children.
        const LEAF                 = 1 << 0;
        /// Vertex normals of the leaf need recomputing.
        const UPDATE_NORMALS       = 1 << 1;
        /// Live bounding box is stale.
        const UPDATE_BB            = 1 << 2;
        /// Original bounding box should be re-snapshotted from the live box.
        const UPDATE_ORIGINAL_BB   = 1 << 3;
        /// Draw buffers need refilling.
        const UPDATE_DRAW_BUFFERS  = 1 << 4;
        /// Node region needs redrawing.
        const UPDATE_REDRAW        = 1 << 5;
        /// Mask aggregates are stale.
        const UPDATE_MASK          = 1 << 6;
        /// Visibility aggregate is stale.
        const UPDATE_VISIBILITY    = 1 << 7;
        /// Vertex colors changed.
        const UPDATE_COLOR         = 1 << 8;
        /// Draw buffers must be rebuilt from scratch (topology or hide state changed).
        const REBUILD_DRAW_BUFFERS = 1 << 9;
        /// Dynamic-topology triangulation buffer is stale.
        const UPDATE_TRIS          = 1 << 10;
        /// Per-primitive areas are stale.
        const UPDATE_TRI_AREAS     = 1 << 11;
        /// Curvature directions are stale.
        const UPDATE_CURVATURE     = 1 << 12;
        /// Pixel-paint regions must be rebuilt.
        const REBUILD_PIXELS       = 1 << 13;
        /// Every vertex of the leaf is hidden.
        const FULLY_HIDDEN         = 1 << 14;
        /// Every vertex of the leaf has mask 1.
        const FULLY_MASKED         = 1 << 15;
        /// Every vertex of the leaf has mask 0.
        const FULLY_UNMASKED       = 1 << 16;
    }
}

impl NodeFlags {
    /// Bits that [`Tree::update_bounds`](crate::Tree::update_bounds) understands.
    pub const BOUNDS: Self = Self::UPDATE_BB
        .union(Self::UPDATE_ORIGINAL_BB)
        .union(Self::UPDATE_REDRAW);

    /// Everything invalidated by moving vertices.
    pub const GEOMETRY: Self = Self::UPDATE_NORMALS
        .union(Self::UPDATE_BB)
        .union(Self::UPDATE_ORIGINAL_BB)
        .union(Self::UPDATE_DRAW_BUFFERS)
        .union(Self::UPDATE_REDRAW)
        .union(Self::UPDATE_CURVATURE)
        .union(Self::REBUILD_PIXELS)
        .union(Self::UPDATE_TRI_AREAS);

    /// Everything invalidated by hiding or revealing primitives.
    pub const VISIBILITY: Self = Self::UPDATE_VISIBILITY
        .union(Self::REBUILD_DRAW_BUFFERS)
        .union(Self::UPDATE_DRAW_BUFFERS)
        .union(Self::UPDATE_REDRAW)
        .union(Self::UPDATE_TRIS)
        .union(Self::UPDATE_TRI_AREAS);

    /// Draw-side bits, owned by the drawing consumer.
    pub const DRAW: Self = Self::UPDATE_DRAW_BUFFERS
        .union(Self::REBUILD_DRAW_BUFFERS)
        .union(Self::UPDATE_REDRAW);

    /// Cached leaf aggregates.
    pub const FULLY: Self = Self::FULLY_HIDDEN
        .union(Self::FULLY_MASKED)
        .union(Self::FULLY_UNMASKED);
}
