// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Top-down tree construction.
//!
//! Ranges of the primitive-index array are split recursively. A range small enough to be a
//! leaf is still split when it mixes materials. Larger ranges are split at the midpoint of
//! the widest axis of their centroid box, moving whole owner groups so a face's primitives
//! always land in the same leaf.

use alloc::vec;
use alloc::vec::Vec;

use hashbrown::HashSet;
use pbvh_bounds::{Aabb3, CentroidAabb};

use crate::flags::NodeFlags;
use crate::node::{Node, TriBuffer};
use crate::source::{PrimitiveSource, SourceKind};

/// Inline capacity of the traversal stacks and the build depth ceiling. A node at depth
/// `STACK_FIXED_DEPTH - 1` is always closed as a leaf. Walks over very deep trees, and
/// post-order walks which keep a revisit frame per open internal node, may still spill to the
/// heap.
pub const STACK_FIXED_DEPTH: usize = 100;

/// Build-time configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BuildSettings {
    /// A range with at most this many primitives becomes a leaf (unless it mixes materials).
    pub leaf_limit: usize,
    /// Exclude hidden primitives from ray tests and triangulation.
    pub respect_hide: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            leaf_limit: crate::source::DEFAULT_LEAF_LIMIT,
            respect_hide: true,
        }
    }
}

impl BuildSettings {
    /// Settings with the source's preferred leaf limit.
    pub fn for_source<S: PrimitiveSource>(source: &S) -> Self {
        Self {
            leaf_limit: source.default_leaf_limit(),
            ..Self::default()
        }
    }

    /// Override the leaf limit. Values below 1 are treated as 1.
    pub fn with_leaf_limit(mut self, leaf_limit: usize) -> Self {
        self.leaf_limit = leaf_limit.max(1);
        self
    }

    /// Toggle hide handling.
    pub fn with_respect_hide(mut self, respect_hide: bool) -> Self {
        self.respect_hide = respect_hide;
        self
    }
}

pub(crate) struct Built {
    pub(crate) nodes: Vec<Node>,
    pub(crate) prim_indices: Vec<u32>,
}

struct Builder<'s, S> {
    source: &'s S,
    leaf_limit: usize,
    prim_bbc: Vec<CentroidAabb>,
    prim_indices: Vec<u32>,
    scratch: Vec<u32>,
    nodes: Vec<Node>,
    claimed: Vec<bool>,
    leaf_flags: NodeFlags,
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "primitive indices are u32 throughout the tree"
)]
pub(crate) fn build<S: PrimitiveSource>(source: &S, settings: &BuildSettings) -> Built {
    let count = source.primitive_count();
    let mut cb = Aabb3::EMPTY;
    let prim_bbc: Vec<CentroidAabb> = (0..count)
        .map(|prim| {
            let bbc = CentroidAabb::new(source.primitive_bounds(prim));
            cb.include_point(bbc.centroid);
            bbc
        })
        .collect();

    let mut leaf_flags = NodeFlags::LEAF
        | NodeFlags::REBUILD_DRAW_BUFFERS
        | NodeFlags::UPDATE_DRAW_BUFFERS
        | NodeFlags::UPDATE_REDRAW
        | NodeFlags::UPDATE_NORMALS
        | NodeFlags::UPDATE_MASK
        | NodeFlags::UPDATE_TRI_AREAS;
    if source.kind() == SourceKind::DynTopo {
        leaf_flags |= NodeFlags::UPDATE_TRIS;
    }

    // Partitions move whole owner groups, so each owner's primitives must start out adjacent.
    let mut prim_indices: Vec<u32> = (0..count as u32).collect();
    if !prim_indices.is_sorted_by_key(|&p| source.owner_of(p as usize)) {
        prim_indices.sort_by_key(|&p| source.owner_of(p as usize));
    }

    let mut b = Builder {
        source,
        leaf_limit: settings.leaf_limit.max(1),
        prim_bbc,
        prim_indices,
        scratch: Vec::new(),
        nodes: Vec::with_capacity(1 + 2 * count.div_ceil(settings.leaf_limit.max(1))),
        claimed: vec![false; source.vertex_count()],
        leaf_flags,
    };
    b.nodes.push(Node::default());
    if count == 0 {
        b.nodes[0].flags = leaf_flags;
    } else {
        b.build_sub(0, Some(cb), 0, count, 0);
    }

    let leaves = b.nodes.iter().filter(|n| n.is_leaf()).count();
    log::debug!(
        "built {:?} tree: {} nodes, {} leaves, {} primitives (leaf limit {})",
        source.kind(),
        b.nodes.len(),
        leaves,
        count,
        b.leaf_limit
    );
    Built {
        nodes: b.nodes,
        prim_indices: b.prim_indices,
    }
}

impl<S: PrimitiveSource> Builder<'_, S> {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "node arrays are far below u32::MAX entries"
    )]
    fn build_sub(
        &mut self,
        node: usize,
        cb: Option<Aabb3>,
        offset: usize,
        count: usize,
        depth: usize,
    ) {
        let end = offset + count;
        // The depth ceiling wins over material homogeneity.
        if depth >= STACK_FIXED_DEPTH - 1 {
            self.build_leaf(node, offset, count);
            return;
        }
        let split = if count <= self.leaf_limit {
            if !self.needs_material_split(offset, end) {
                self.build_leaf(node, offset, count);
                return;
            }
            Some(self.partition_materials(offset, end))
        } else {
            let cb = cb.unwrap_or_else(|| self.centroid_bounds(offset, end));
            let axis = cb.widest_axis();
            let mid = cb.center()[axis];
            let split = self.partition_owner_groups(offset, end, axis, mid);
            if split == offset || split == end {
                self.nearest_group_boundary(offset, end)
            } else {
                Some(split)
            }
        };
        // A single owner group can't be divided; keep it whole even above the limit.
        let Some(split) = split else {
            self.build_leaf(node, offset, count);
            return;
        };
        debug_assert!(split > offset && split < end, "split must be interior");

        let children = self.nodes.len();
        self.nodes.push(Node::default());
        self.nodes.push(Node::default());
        self.nodes[node].children_offset = children as u32;

        self.build_sub(children, None, offset, split - offset, depth + 1);
        self.build_sub(children + 1, None, split, end - split, depth + 1);

        let bounds = self.nodes[children]
            .bounds
            .union(&self.nodes[children + 1].bounds);
        let n = &mut self.nodes[node];
        n.bounds = bounds;
        n.orig_bounds = bounds;
    }

    fn centroid_bounds(&self, lo: usize, hi: usize) -> Aabb3 {
        let mut cb = Aabb3::EMPTY;
        for &p in &self.prim_indices[lo..hi] {
            cb.include_point(self.prim_bbc[p as usize].centroid);
        }
        cb
    }

    fn owner(&self, i: usize) -> usize {
        self.source.owner_of(self.prim_indices[i] as usize)
    }

    fn needs_material_split(&self, lo: usize, hi: usize) -> bool {
        if hi - lo <= 1 {
            return false;
        }
        let Some(first) = self.source.material_of(self.prim_indices[lo] as usize) else {
            return false;
        };
        self.prim_indices[lo + 1..hi]
            .iter()
            .any(|&p| self.source.material_of(p as usize) != Some(first))
    }

    /// Stable partition: primitives matching the first one's material keep their order on the
    /// left, the rest keep their order on the right. Owner groups stay contiguous.
    fn partition_materials(&mut self, lo: usize, hi: usize) -> usize {
        let first = self.source.material_of(self.prim_indices[lo] as usize);
        self.scratch.clear();
        let mut w = lo;
        for i in lo..hi {
            let p = self.prim_indices[i];
            if self.source.material_of(p as usize) == first {
                self.prim_indices[w] = p;
                w += 1;
            } else {
                self.scratch.push(p);
            }
        }
        self.prim_indices[w..hi].copy_from_slice(&self.scratch);
        w
    }

    /// Midpoint partition one owner group at a time. The group's first primitive decides the
    /// side for the whole group. Expects owner groups to be contiguous and keeps them so.
    fn partition_owner_groups(&mut self, lo: usize, hi: usize, axis: usize, mid: f32) -> usize {
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.prim_indices[lo..hi]);
        let mut lo2 = lo;
        let mut hi2 = hi;
        let mut i = 0;
        while i < self.scratch.len() {
            let first = self.scratch[i] as usize;
            let owner = self.source.owner_of(first);
            let right = self.prim_bbc[first].centroid[axis] >= mid;
            while i < self.scratch.len() && self.source.owner_of(self.scratch[i] as usize) == owner
            {
                let p = self.scratch[i];
                if right {
                    hi2 -= 1;
                    self.prim_indices[hi2] = p;
                } else {
                    self.prim_indices[lo2] = p;
                    lo2 += 1;
                }
                i += 1;
            }
        }
        debug_assert_eq!(lo2, hi2, "partition must fill the range");
        lo2
    }

    /// Owner-group boundary closest to the middle of the range, if the range has more than
    /// one group.
    fn nearest_group_boundary(&self, lo: usize, hi: usize) -> Option<usize> {
        let mid = lo + (hi - lo) / 2;
        let mut best: Option<usize> = None;
        for i in lo + 1..hi {
            if self.owner(i - 1) != self.owner(i)
                && best.is_none_or(|b| i.abs_diff(mid) < b.abs_diff(mid))
            {
                best = Some(i);
            }
        }
        best
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "primitive and vertex counts are u32 throughout the tree"
    )]
    fn build_leaf(&mut self, node: usize, offset: usize, count: usize) {
        let source = self.source;
        let range = &self.prim_indices[offset..offset + count];

        let mut bounds = Aabb3::EMPTY;
        let mut local = HashSet::with_capacity(count * 2);
        let mut unique = Vec::new();
        let mut shared = Vec::new();
        let claimed = &mut self.claimed;
        for &p in range {
            bounds.include(&self.prim_bbc[p as usize].bounds);
            source.for_each_vertex(p as usize, |v| {
                if local.insert(v) {
                    let slot = &mut claimed[v as usize];
                    if *slot {
                        shared.push(v);
                    } else {
                        *slot = true;
                        unique.push(v);
                    }
                }
            });
        }
        let fully_hidden = count > 0 && range.iter().all(|&p| source.is_primitive_hidden(p as usize));

        let n = &mut self.nodes[node];
        n.flags = self.leaf_flags;
        n.flags.set(NodeFlags::FULLY_HIDDEN, fully_hidden);
        n.bounds = bounds;
        n.orig_bounds = bounds;
        n.prim_offset = offset as u32;
        n.prim_count = count as u32;
        n.unique_verts = unique.len() as u32;
        unique.extend_from_slice(&shared);
        n.verts = unique;
    }
}

/// Triangulate a dynamic-topology leaf into local vertex and triangle lists.
#[allow(
    clippy::cast_possible_truncation,
    reason = "local vertex counts are bounded by the leaf's vertex count"
)]
pub(crate) fn leaf_tri_buffer<S: PrimitiveSource>(
    source: &S,
    prims: &[u32],
    respect_hide: bool,
) -> TriBuffer {
    let mut buf = TriBuffer::default();
    let mut local = hashbrown::HashMap::new();
    for &p in prims {
        source.for_each_facet(p as usize, respect_hide, |facet| {
            let vs = facet.verts();
            let mut map = |v: u32| {
                *local.entry(v).or_insert_with(|| {
                    buf.verts.push(v);
                    (buf.verts.len() - 1) as u32
                })
            };
            let a = map(vs[0]);
            for w in vs[1..].windows(2) {
                let tri = [a, map(w[0]), map(w[1])];
                buf.tris.push(tri);
                buf.faces.push(p);
            }
        });
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{DynTopoMesh, DynTopoSource, GridsSource, MeshSource};
    use crate::test_util::quad_grid;
    use alloc::sync::Arc;
    use glam::Vec3;

    fn leaves(b: &Built) -> Vec<&Node> {
        b.nodes.iter().filter(|n| n.is_leaf()).collect()
    }

    #[test]
    fn empty_source_is_single_empty_leaf() {
        let src = MeshSource::new(&[], &[0], &[]).unwrap();
        let b = build(&src, &BuildSettings::default());
        assert_eq!(b.nodes.len(), 1);
        assert!(b.nodes[0].is_leaf());
        assert!(b.nodes[0].bounds.is_empty());
        assert!(b.prim_indices.is_empty());
    }

    #[test]
    fn grid_respects_leaf_limit_and_keeps_faces_whole() {
        let (p, o, c) = quad_grid(10);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let b = build(&src, &BuildSettings::default().with_leaf_limit(16));
        let leaves = leaves(&b);
        assert!(leaves.len() > 1);
        for leaf in &leaves {
            assert!(leaf.prim_count <= 16, "leaf over limit");
            let mut owners: Vec<usize> = b.prim_indices[leaf.prim_range()]
                .iter()
                .map(|&p| src.owner_of(p as usize))
                .collect();
            owners.sort_unstable();
            owners.dedup();
            assert_eq!(owners.len() * 2, leaf.prim_count as usize, "both tris of each quad");
        }
        let total: usize = leaves.iter().map(|l| l.prim_count as usize).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn material_split_below_limit() {
        let (p, o, c) = quad_grid(2);
        let mats = [0, 1, 0, 1];
        let src = MeshSource::new(&p, &o, &c)
            .unwrap()
            .with_materials(&mats)
            .unwrap();
        let b = build(&src, &BuildSettings::default());
        let leaves = leaves(&b);
        assert_eq!(leaves.len(), 2);
        for leaf in leaves {
            let range = &b.prim_indices[leaf.prim_range()];
            let first = src.material_of(range[0] as usize);
            assert!(range.iter().all(|&p| src.material_of(p as usize) == first));
        }
    }

    #[test]
    fn single_owner_stays_whole() {
        // One polygon with many corners: every triangle has the same owner.
        let n = 40;
        let positions: Vec<Vec3> = (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * core::f32::consts::TAU;
                Vec3::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let corners: Vec<u32> = (0..n as u32).collect();
        let offsets = [0, n as u32];
        let src = MeshSource::new(&positions, &offsets, &corners).unwrap();
        let b = build(&src, &BuildSettings::default().with_leaf_limit(4));
        assert_eq!(b.nodes.len(), 1);
        assert_eq!(b.nodes[0].prim_count as usize, n - 2);
    }

    #[test]
    fn interleaved_grid_faces_share_one_leaf_each() {
        // Grids alternate between two base faces along x.
        let grid_to_face: Vec<u32> = (0..16).map(|g| g % 2).collect();
        let mut positions = Vec::new();
        for g in 0..16 {
            for y in 0..2 {
                for x in 0..2 {
                    positions.push(Vec3::new((2 * g + x) as f32, y as f32, 0.0));
                }
            }
        }
        let src = GridsSource::new(2, &positions, &grid_to_face).unwrap();
        let b = build(&src, &BuildSettings::default().with_leaf_limit(2));
        for face in 0..2 {
            let holding = leaves(&b)
                .iter()
                .filter(|leaf| {
                    b.prim_indices[leaf.prim_range()]
                        .iter()
                        .any(|&g| grid_to_face[g as usize] == face)
                })
                .count();
            assert_eq!(holding, 1, "face {face} spread over {holding} leaves");
        }
        let mut all = b.prim_indices.clone();
        all.sort_unstable();
        assert_eq!(all, (0..16).collect::<Vec<u32>>());
    }

    #[test]
    fn unique_vertices_claimed_once() {
        let (p, o, c) = quad_grid(6);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let b = build(&src, &BuildSettings::default().with_leaf_limit(8));
        let mut owned = vec![0_u32; p.len()];
        for leaf in leaves(&b) {
            for &v in leaf.unique_verts() {
                owned[v as usize] += 1;
            }
            for &v in leaf.shared_verts() {
                assert!(!leaf.unique_verts().contains(&v));
            }
        }
        assert!(owned.iter().all(|&n| n == 1), "every vertex owned exactly once");
    }

    #[test]
    fn hidden_faces_mark_leaf_fully_hidden() {
        let (p, o, c) = quad_grid(1);
        let hide = [true];
        let src = MeshSource::new(&p, &o, &c)
            .unwrap()
            .with_hidden_faces(&hide)
            .unwrap();
        let b = build(&src, &BuildSettings::default());
        assert!(b.nodes[0].fully_hidden());
    }

    #[test]
    fn dyntopo_leaves_need_triangulation() {
        let mesh = DynTopoMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            vec![[0, 1, 2], [2, 1, 3]],
        )
        .unwrap();
        let src = DynTopoSource::new(Arc::new(mesh));
        let b = build(&src, &BuildSettings::for_source(&src));
        assert!(b.nodes[0].flags.contains(NodeFlags::UPDATE_TRIS));
        let buf = leaf_tri_buffer(&src, &b.prim_indices, true);
        assert_eq!(buf.tris.len(), 2);
        assert_eq!(buf.verts.len(), 4);
        assert_eq!(buf.faces, vec![0, 1]);
    }
}
