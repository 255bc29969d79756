// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental update passes.
//!
//! Each pass gathers the leaves carrying its dirty flag, runs one or more fork-join phases
//! over them, and clears the flag. Only leaves get exact aggregates; internal nodes are
//! touched solely by the bounds flush.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use pbvh_bounds::Aabb3;

use crate::build::leaf_tri_buffer;
use crate::flags::NodeFlags;
use crate::node::{Node, NodeIndex};
use crate::parallel;
use crate::source::{Facet, PrimitiveSource, SourceKind, loop_normal};
use crate::traverse::Walker;
use crate::tree::{Positions, Tree};

/// Mutable references to the picked nodes, in node-array order.
fn picked_mut<'a>(nodes: &'a mut [Node], picked: &[NodeIndex]) -> Vec<&'a mut Node> {
    let mut want = vec![false; nodes.len()];
    for i in picked {
        want[i.get()] = true;
    }
    nodes
        .iter_mut()
        .zip(want)
        .filter_map(|(n, w)| w.then_some(n))
        .collect()
}

fn facet_area<S: PrimitiveSource>(pos: &Positions<'_, S>, facet: Facet) -> f32 {
    let v = facet.verts();
    let a = pos.get(v[0]);
    let mut area = 0.0;
    for w in v[1..].windows(2) {
        area += 0.5 * (pos.get(w[0]) - a).cross(pos.get(w[1]) - a).length();
    }
    area
}

impl Tree {
    /// Leaves carrying any bit of `flag`.
    pub fn gather_dirty(&self, flag: NodeFlags) -> Vec<NodeIndex> {
        self.search_gather(|n| !n.is_leaf() || n.flags.intersects(flag))
    }

    /// Refresh boxes, then flush them up the tree.
    ///
    /// `flags` selects the work among [`NodeFlags::BOUNDS`]: `UPDATE_BB` recomputes the live box
    /// of pending leaves from their vertices, `UPDATE_ORIGINAL_BB` snapshots live into original,
    /// `UPDATE_REDRAW` clears the redraw bit. Afterwards no node carries the requested box bits.
    pub fn update_bounds<S: PrimitiveSource>(&mut self, source: &S, flags: NodeFlags) {
        let flags = flags & NodeFlags::BOUNDS;
        let picked = self.gather_dirty(flags);
        log::trace!("update_bounds {flags:?}: {} leaves", picked.len());
        {
            let Self {
                nodes,
                prim_indices,
                deformed,
                ..
            } = self;
            let pos = Positions::new(source, deformed.as_deref());
            let prim_indices = &*prim_indices;
            parallel::for_each(picked_mut(nodes, &picked), |node| {
                if flags.contains(NodeFlags::UPDATE_BB) && node.flags.contains(NodeFlags::UPDATE_BB)
                {
                    let mut bb = Aabb3::EMPTY;
                    for &p in &prim_indices[node.prim_range()] {
                        source.for_each_vertex(p as usize, |v| bb.include_point(pos.get(v)));
                    }
                    node.bounds = bb;
                }
                if flags.contains(NodeFlags::UPDATE_ORIGINAL_BB)
                    && node.flags.contains(NodeFlags::UPDATE_ORIGINAL_BB)
                {
                    node.orig_bounds = node.bounds;
                }
                if flags.contains(NodeFlags::UPDATE_REDRAW) {
                    node.flags -= NodeFlags::UPDATE_REDRAW;
                }
            });
        }
        if flags.intersects(NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB) {
            self.flush_bounds(flags);
        }
    }

    /// Post-order flush: an internal node unions its children only after both are final.
    ///
    /// Idempotent once the box bits are clear.
    pub fn flush_bounds(&mut self, flags: NodeFlags) {
        let flags = flags & (NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
        let mut pending = vec![NodeFlags::empty(); self.nodes.len()];
        let mut walker = Walker::new(true);
        while let Some(i) = walker.next(&self.nodes, NodeFlags::LEAF, &mut |_: &Node| true) {
            let mut update = self.nodes[i].flags & flags;
            if let Some((l, r)) = self.nodes[i].children() {
                update |= pending[l.get()] | pending[r.get()];
                if update.contains(NodeFlags::UPDATE_BB) {
                    let bb = self.nodes[l.get()].bounds.union(&self.nodes[r.get()].bounds);
                    self.nodes[i].bounds = bb;
                }
                if update.contains(NodeFlags::UPDATE_ORIGINAL_BB) {
                    self.nodes[i].orig_bounds = self.nodes[i].bounds;
                }
            }
            self.nodes[i].flags -= flags;
            pending[i] = update;
        }
    }

    /// Recompute vertex normals of every leaf pending `UPDATE_NORMALS`.
    ///
    /// Each pending leaf rebuilds the vertices it owns ([`Node::unique_verts`]) from the faces
    /// of pending leaves, so all leaves around an edited vertex must be marked. Shared vertices
    /// are rebuilt by their owning leaf only and otherwise keep their normals bit for bit.
    /// Summation order across leaf boundaries depends on scheduling.
    pub fn update_normals<S: PrimitiveSource>(&mut self, source: &S) {
        let picked = self.gather_dirty(NodeFlags::UPDATE_NORMALS);
        if picked.is_empty() {
            return;
        }
        log::trace!("update_normals: {} leaves", picked.len());
        {
            let Self {
                nodes,
                prim_indices,
                normals,
                touched,
                deformed,
                ..
            } = self;
            let (nodes, prim_indices) = (&*nodes, &*prim_indices);
            let (normals, touched) = (&*normals, &*touched);
            let pos = Positions::new(source, deformed.as_deref());
            let leaves: Vec<&Node> = picked.iter().map(|i| &nodes[i.get()]).collect();

            parallel::for_each(leaves.clone(), |node| {
                for &v in node.unique_verts() {
                    normals[v as usize].store(glam::Vec3::ZERO);
                    touched[v as usize].store(true, Ordering::Relaxed);
                }
            });

            parallel::for_each(leaves.clone(), |node| {
                for &p in &prim_indices[node.prim_range()] {
                    source.for_each_normal_face(p as usize, |face| {
                        let n = loop_normal(face, |v| pos.get(v));
                        for &v in face {
                            if touched[v as usize].load(Ordering::Relaxed) {
                                normals[v as usize].add(n);
                            }
                        }
                    });
                }
            });

            parallel::for_each(leaves, |node| {
                for &v in node.unique_verts() {
                    if touched[v as usize].swap(false, Ordering::Relaxed) {
                        let acc = &normals[v as usize];
                        acc.store(acc.load().normalize_or_zero());
                    }
                }
            });
        }
        for i in picked {
            self.nodes[i.get()].flags -= NodeFlags::UPDATE_NORMALS;
        }
    }

    /// Recompute the fully-hidden state of leaves pending `UPDATE_VISIBILITY`.
    ///
    /// With per-vertex hide state a leaf is fully hidden when all of its vertices are hidden;
    /// otherwise when all of its primitives are.
    pub fn update_visibility<S: PrimitiveSource>(&mut self, source: &S) {
        let picked = self.gather_dirty(NodeFlags::UPDATE_VISIBILITY);
        log::trace!("update_visibility: {} leaves", picked.len());
        let Self {
            nodes,
            prim_indices,
            ..
        } = self;
        let prim_indices = &*prim_indices;
        parallel::for_each(picked_mut(nodes, &picked), |node| {
            let hidden = if source.has_vertex_hide() {
                !node.verts.is_empty() && node.verts.iter().all(|&v| source.is_vertex_hidden(v))
            } else {
                let prims = &prim_indices[node.prim_range()];
                !prims.is_empty() && prims.iter().all(|&p| source.is_primitive_hidden(p as usize))
            };
            node.set_flag(NodeFlags::FULLY_HIDDEN, hidden);
            node.flags -= NodeFlags::UPDATE_VISIBILITY;
        });
    }

    /// Recompute fully-masked and fully-unmasked for leaves pending `UPDATE_MASK`.
    ///
    /// Without a mask layer every leaf is fully unmasked.
    pub fn update_mask<S: PrimitiveSource>(&mut self, source: &S) {
        let picked = self.gather_dirty(NodeFlags::UPDATE_MASK);
        log::trace!("update_mask: {} leaves", picked.len());
        let has_mask = source.has_mask();
        parallel::for_each(picked_mut(&mut self.nodes, &picked), |node| {
            let (mut masked, mut unmasked) = (has_mask, true);
            if has_mask {
                for &v in &node.verts {
                    let m = source.mask(v);
                    masked &= m >= 1.0;
                    unmasked &= m <= 0.0;
                    if !masked && !unmasked {
                        break;
                    }
                }
            }
            node.set_flag(NodeFlags::FULLY_MASKED, masked);
            node.set_flag(NodeFlags::FULLY_UNMASKED, unmasked);
            node.flags -= NodeFlags::UPDATE_MASK;
        });
    }

    /// Recompute the per-primitive areas of leaves pending `UPDATE_TRI_AREAS`.
    pub fn update_tri_areas<S: PrimitiveSource>(&mut self, source: &S) {
        let picked = self.gather_dirty(NodeFlags::UPDATE_TRI_AREAS);
        log::trace!("update_tri_areas: {} leaves", picked.len());
        let respect_hide = self.settings.respect_hide;
        let Self {
            nodes,
            prim_indices,
            deformed,
            ..
        } = self;
        let pos = Positions::new(source, deformed.as_deref());
        let prim_indices = &*prim_indices;
        parallel::for_each(picked_mut(nodes, &picked), |node| {
            let areas = prim_indices[node.prim_range()]
                .iter()
                .map(|&p| {
                    let mut area = 0.0;
                    source.for_each_facet(p as usize, respect_hide, |f| area += facet_area(&pos, f));
                    area
                })
                .collect();
            node.areas = areas;
            node.flags -= NodeFlags::UPDATE_TRI_AREAS;
        });
    }

    /// Rebuild the triangulation buffers of dynamic-topology leaves pending `UPDATE_TRIS`.
    ///
    /// Other kinds have no buffers; the flag is simply cleared.
    pub fn update_tris<S: PrimitiveSource>(&mut self, source: &S) {
        let picked = self.gather_dirty(NodeFlags::UPDATE_TRIS);
        log::trace!("update_tris: {} leaves", picked.len());
        let dyntopo = self.kind == SourceKind::DynTopo;
        let respect_hide = self.settings.respect_hide;
        let Self {
            nodes,
            prim_indices,
            ..
        } = self;
        let prim_indices = &*prim_indices;
        parallel::for_each(picked_mut(nodes, &picked), |node| {
            if dyntopo {
                node.tris = Some(leaf_tri_buffer(
                    source,
                    &prim_indices[node.prim_range()],
                    respect_hide,
                ));
            }
            node.flags -= NodeFlags::UPDATE_TRIS;
        });
    }

    /// Forward per-vertex data changes to the draw-side flags.
    ///
    /// Leaves pending `UPDATE_COLOR` (when requested in `flags`) get their draw buffers and
    /// redraw bits set, and the color bit is consumed.
    pub fn update_vertex_data(&mut self, flags: NodeFlags) {
        if !flags.contains(NodeFlags::UPDATE_COLOR) {
            return;
        }
        self.search_callback(
            |n| !n.is_leaf() || n.flags.contains(NodeFlags::UPDATE_COLOR),
            |_, node| {
                node.mark_redraw();
                node.flags -= NodeFlags::UPDATE_COLOR;
            },
        );
    }
}
