// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Depth-first search with caller predicates.
//!
//! All searches use an explicit stack with [`STACK_FIXED_DEPTH`] inline frames. Typical trees
//! stay inline; near the depth ceiling, and in post-order walks, the stack spills to the heap.

use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;

use crate::build::STACK_FIXED_DEPTH;
use crate::flags::NodeFlags;
use crate::node::{Node, NodeIndex};
use crate::tree::Tree;

#[derive(Copy, Clone, Debug)]
struct Frame {
    node: u32,
    revisiting: bool,
}

/// Explicit-stack walker shared by every search flavor.
///
/// With `post_order` set, an internal node is pushed again (as a revisit) underneath its
/// children, so it pops only after both subtrees are done.
#[derive(Clone, Debug)]
pub(crate) struct Walker {
    stack: SmallVec<[Frame; STACK_FIXED_DEPTH]>,
    post_order: bool,
}

impl Walker {
    pub(crate) fn new(post_order: bool) -> Self {
        let mut stack = SmallVec::new();
        stack.push(Frame {
            node: 0,
            revisiting: false,
        });
        Self { stack, post_order }
    }

    /// Next node that is a leaf, matches `leaf_flag`, or is being revisited.
    pub(crate) fn next(
        &mut self,
        nodes: &[Node],
        leaf_flag: NodeFlags,
        pred: &mut impl FnMut(&Node) -> bool,
    ) -> Option<usize> {
        while let Some(frame) = self.stack.pop() {
            let idx = frame.node as usize;
            if frame.revisiting {
                return Some(idx);
            }
            let node = &nodes[idx];
            if !pred(node) {
                continue;
            }
            if node.is_leaf() || node.flags.intersects(leaf_flag) {
                return Some(idx);
            }
            let Some((left, right)) = node.children() else {
                continue;
            };
            if self.post_order {
                self.stack.push(Frame {
                    node: frame.node,
                    revisiting: true,
                });
            }
            self.stack.push(Frame {
                node: right.0,
                revisiting: false,
            });
            self.stack.push(Frame {
                node: left.0,
                revisiting: false,
            });
        }
        None
    }
}

/// Iterator returned by [`Tree::search`] and [`Tree::search_post_order`].
pub struct Search<'a, P> {
    nodes: &'a [Node],
    walker: Walker,
    pred: P,
    /// `None` yields every node the walker stops at, internal revisits included.
    filter: Option<NodeFlags>,
}

impl<P> fmt::Debug for Search<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Search")
            .field("pending", &self.walker.stack.len())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<'a, P: FnMut(&Node) -> bool> Iterator for Search<'a, P> {
    type Item = (NodeIndex, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let leaf_flag = self.filter.unwrap_or(NodeFlags::LEAF);
        loop {
            let idx = self.walker.next(self.nodes, leaf_flag, &mut self.pred)?;
            let node = &self.nodes[idx];
            if self.filter.is_none_or(|f| node.flags.intersects(f)) {
                return Some((NodeIndex::new(idx), node));
            }
        }
    }
}

const NIL: u32 = u32::MAX;

#[derive(Copy, Clone, Debug)]
struct Entry {
    node: u32,
    key: f32,
    left: u32,
    right: u32,
}

/// Unbalanced binary search tree of visited leaves keyed by `tmin`.
///
/// Smaller keys go left, equal or larger keys go right, so ties keep insertion order.
#[derive(Debug, Default)]
struct OccludedOrder {
    entries: Vec<Entry>,
}

impl OccludedOrder {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "entries are bounded by the node count"
    )]
    fn insert(&mut self, node: u32, key: f32) {
        let new = self.entries.len() as u32;
        self.entries.push(Entry {
            node,
            key,
            left: NIL,
            right: NIL,
        });
        if new == 0 {
            return;
        }
        let mut at = 0_usize;
        loop {
            let e = &mut self.entries[at];
            let slot = if key < e.key { &mut e.left } else { &mut e.right };
            if *slot == NIL {
                *slot = new;
                return;
            }
            at = *slot as usize;
        }
    }

    /// In-order (ascending key) node list.
    fn in_order(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.entries.len());
        if self.entries.is_empty() {
            return out;
        }
        let mut stack: SmallVec<[u32; 64]> = SmallVec::new();
        let mut cur = 0_u32;
        loop {
            while cur != NIL {
                stack.push(cur);
                cur = self.entries[cur as usize].left;
            }
            let Some(top) = stack.pop() else {
                break;
            };
            let e = &self.entries[top as usize];
            out.push(e.node);
            cur = e.right;
        }
        out
    }
}

/// Nearest-first search over a node slice.
///
/// `pred` returns the sort key (ray entry parameter, squared distance, ...) for nodes worth
/// visiting, which is also stored in [`Node::tmin`]. Every accepted leaf is then handed to
/// `hit` in ascending key order together with a running bound that starts at `f32::MAX`.
/// All accepted leaves are visited; callbacks prune themselves by comparing their node's
/// `tmin` against the bound.
pub(crate) fn search_occluded_in(
    nodes: &mut [Node],
    mut pred: impl FnMut(&Node) -> Option<f32>,
    mut hit: impl FnMut(NodeIndex, &mut Node, &mut f32),
) {
    let mut order = OccludedOrder::default();
    let mut stack: SmallVec<[u32; STACK_FIXED_DEPTH]> = SmallVec::new();
    stack.push(0);
    while let Some(i) = stack.pop() {
        let node = &mut nodes[i as usize];
        let Some(key) = pred(node) else {
            continue;
        };
        node.tmin = key;
        if node.is_leaf() {
            order.insert(i, key);
        } else if let Some((left, right)) = node.children() {
            stack.push(right.0);
            stack.push(left.0);
        }
    }
    let mut tmin = f32::MAX;
    for i in order.in_order() {
        hit(NodeIndex(i), &mut nodes[i as usize], &mut tmin);
    }
}

impl Tree {
    /// Leaves whose every ancestor (and themselves) satisfy `pred`, in depth-first order.
    pub fn search<P: FnMut(&Node) -> bool>(&self, pred: P) -> Search<'_, P> {
        Search {
            nodes: &self.nodes,
            walker: Walker::new(false),
            pred,
            filter: Some(NodeFlags::LEAF),
        }
    }

    /// Every node satisfying `pred`, with internal nodes yielded after both children.
    pub fn search_post_order<P: FnMut(&Node) -> bool>(&self, pred: P) -> Search<'_, P> {
        Search {
            nodes: &self.nodes,
            walker: Walker::new(true),
            pred,
            filter: None,
        }
    }

    /// Collect the leaves [`Tree::search`] would yield.
    pub fn search_gather(&self, pred: impl FnMut(&Node) -> bool) -> Vec<NodeIndex> {
        self.search(pred).map(|(i, _)| i).collect()
    }

    /// Collect nodes carrying any bit of `flags`. The walk stops descending at such nodes.
    pub fn search_gather_flagged(
        &self,
        pred: impl FnMut(&Node) -> bool,
        flags: NodeFlags,
    ) -> Vec<NodeIndex> {
        Search {
            nodes: &self.nodes,
            walker: Walker::new(false),
            pred,
            filter: Some(flags),
        }
        .map(|(i, _)| i)
        .collect()
    }

    /// Call `f` with mutable access to every leaf [`Tree::search`] would yield.
    pub fn search_callback(
        &mut self,
        mut pred: impl FnMut(&Node) -> bool,
        mut f: impl FnMut(NodeIndex, &mut Node),
    ) {
        let mut walker = Walker::new(false);
        while let Some(i) = walker.next(&self.nodes, NodeFlags::LEAF, &mut pred) {
            f(NodeIndex::new(i), &mut self.nodes[i]);
        }
    }

    /// Nearest-first search.
    ///
    /// `pred` returns `Some(key)` to accept a node; the key is stored in [`Node::tmin`]. Every
    /// accepted leaf is then visited in ascending key order, ties in insertion order, with a
    /// running bound that starts at `f32::MAX` and that the callback may shrink.
    pub fn search_occluded(
        &mut self,
        pred: impl FnMut(&Node) -> Option<f32>,
        hit: impl FnMut(NodeIndex, &mut Node, &mut f32),
    ) {
        search_occluded_in(&mut self.nodes, pred, hit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildSettings;
    use crate::source::MeshSource;
    use crate::test_util::quad_grid;
    use alloc::vec;
    use pbvh_bounds::Aabb3;

    fn grid_tree(n: usize, leaf_limit: usize) -> Tree {
        let (p, o, c) = quad_grid(n);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        Tree::build(&src, BuildSettings::default().with_leaf_limit(leaf_limit))
    }

    #[test]
    fn gather_all_leaves() {
        let tree = grid_tree(8, 8);
        let all = tree.search_gather(|_| true);
        assert_eq!(all.len(), tree.leaf_count());
        assert!(all.iter().all(|&i| tree.node(i).is_leaf()));
    }

    #[test]
    fn pruned_gather_only_overlapping() {
        let tree = grid_tree(8, 8);
        let region = Aabb3::new(glam::Vec3::new(0.0, 0.0, -1.0), glam::Vec3::new(1.5, 1.5, 1.0));
        let hits = tree.search_gather(|n| !n.bounds().intersect(&region).is_empty());
        assert!(!hits.is_empty());
        assert!(hits.len() < tree.leaf_count());
        for i in hits {
            assert!(!tree.node(i).bounds().intersect(&region).is_empty());
        }
    }

    #[test]
    fn post_order_children_first() {
        let tree = grid_tree(8, 8);
        let mut seen = vec![false; tree.nodes().len()];
        let mut count = 0;
        for (i, node) in tree.search_post_order(|_| true) {
            if let Some((l, r)) = node.children() {
                assert!(seen[l.get()] && seen[r.get()], "children before parent");
            }
            seen[i.get()] = true;
            count += 1;
        }
        assert_eq!(count, tree.nodes().len());
        assert!(seen[0]);
    }

    #[test]
    fn flagged_gather_stops_at_flag() {
        let mut tree = grid_tree(8, 8);
        let leaf = tree.search_gather(|_| true)[0];
        for n in tree.nodes_mut() {
            n.flags -= NodeFlags::UPDATE_NORMALS;
        }
        tree.node_mut(leaf).mark_update();
        let flagged = tree.search_gather_flagged(|_| true, NodeFlags::UPDATE_NORMALS);
        assert_eq!(flagged, vec![leaf]);
    }

    #[test]
    fn callback_mutates_leaves() {
        let mut tree = grid_tree(4, 4);
        tree.search_callback(|_| true, |_, n| n.mark_update_mask());
        assert!(
            tree.nodes()
                .iter()
                .filter(|n| n.is_leaf())
                .all(|n| n.flags().contains(NodeFlags::UPDATE_MASK))
        );
    }

    #[test]
    fn occluded_visits_in_key_order_with_ties_stable() {
        let mut tree = grid_tree(8, 8);
        // Key on the node's min x so several leaves tie.
        let mut visited = Vec::new();
        tree.search_occluded(
            |n| Some(n.bounds().min.x),
            |i, n, tmin| {
                visited.push((i, n.tmin()));
                *tmin = tmin.min(n.tmin());
            },
        );
        assert_eq!(visited.len(), tree.leaf_count());
        assert!(visited.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn occluded_order_ties() {
        let mut order = OccludedOrder::default();
        order.insert(10, 1.0);
        order.insert(11, 0.5);
        order.insert(12, 1.0);
        order.insert(13, 1.0);
        order.insert(14, 2.0);
        assert_eq!(order.in_order(), vec![11, 10, 12, 13, 14]);
    }
}
