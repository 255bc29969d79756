// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ray and nearest-to-ray queries.
//!
//! Both walk the tree nearest-first (see [`Tree::search_occluded`]) and test the facets of each
//! accepted leaf whose entry key is below the best result so far.

use alloc::vec::Vec;

use glam::Vec3;
use pbvh_bounds::{
    DistRayAabbPrecalc, Frustum, RayAabbPrecalc, RayTriPrecalc, dist_squared_ray_to_tri,
};

use crate::build::leaf_tri_buffer;
use crate::flags::NodeFlags;
use crate::node::{Node, NodeIndex};
use crate::origco::OriginalCoords;
use crate::source::{Facet, PrimitiveSource, loop_normal};
use crate::traverse::search_occluded_in;
use crate::tree::{Positions, Tree};

/// Options for [`Tree::raycast`] and [`Tree::find_nearest_to_ray`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RaycastOptions {
    /// Test against original boxes and the per-stroke position snapshot.
    pub use_original: bool,
    /// Stroke the snapshot belongs to. A different id than the tree's current one drops the
    /// snapshot before the query.
    pub stroke_id: Option<i32>,
    /// Count back-facing facets too.
    pub double_sided: bool,
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self {
            use_original: false,
            stroke_id: None,
            double_sided: true,
        }
    }
}

/// Result of [`Tree::raycast`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RaycastHit {
    /// Whether any facet was hit.
    pub hit: bool,
    /// Ray parameter of the nearest hit, `f32::MAX` without one.
    pub depth: f32,
    /// Ray parameter of the nearest hit behind `depth`, `f32::MAX` without one.
    pub back_depth: f32,
    /// Facet intersections counted, improving or not.
    pub hit_count: u32,
    /// Vertex of the nearest hit facet closest to the hit location.
    pub active_vertex: Option<u32>,
    /// Element owning the nearest hit facet (face, grid, or dynamic-topology face).
    pub active_primitive: Option<usize>,
    /// Geometric normal of the nearest hit facet.
    pub face_normal: Option<Vec3>,
}

impl Default for RaycastHit {
    fn default() -> Self {
        Self {
            hit: false,
            depth: f32::MAX,
            back_depth: f32::MAX,
            hit_count: 0,
            active_vertex: None,
            active_primitive: None,
            face_normal: None,
        }
    }
}

impl RaycastHit {
    /// Record a hit at `t`. Returns whether it became the nearest.
    fn record(&mut self, t: f32) -> bool {
        self.hit_count += 1;
        if t < self.depth {
            self.back_depth = self.depth;
            self.depth = t;
            self.hit = true;
            return true;
        }
        if t > self.depth && t <= self.back_depth {
            self.back_depth = t;
        }
        false
    }
}

/// Result of [`Tree::find_nearest_to_ray`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NearestToRay {
    /// Ray parameter of the closest point on the ray.
    pub depth: f32,
    /// Squared distance from the ray to the nearest facet edge.
    pub dist_sq: f32,
    /// Element owning the nearest facet.
    pub active_primitive: usize,
}

/// Reads either live positions or the stroke snapshot.
struct Coords<'a, 'b, S> {
    live: Positions<'a, S>,
    normals: &'a [crate::atomic::AtomicVec3],
    origco: Option<&'b mut OriginalCoords>,
}

impl<S: PrimitiveSource> Coords<'_, '_, S> {
    fn get(&mut self, v: u32) -> Vec3 {
        match &mut self.origco {
            Some(oc) => {
                let (live, normals) = (&self.live, self.normals);
                oc.get_or_capture(v, |v| (live.get(v), normals[v as usize].load()))
            }
            None => self.live.get(v),
        }
    }
}

/// Expand a leaf into `(element, facet)` pairs, through the triangulation buffer when the
/// leaf has one.
fn for_each_leaf_facet<S: PrimitiveSource>(
    source: &S,
    node: &Node,
    prims: &[u32],
    respect_hide: bool,
    mut f: impl FnMut(usize, Facet),
) {
    if let Some(buf) = &node.tris {
        for (tri, &face) in buf.tris.iter().zip(&buf.faces) {
            let verts = tri.map(|l| buf.verts[l as usize]);
            f(source.active_element(face as usize), Facet::Tri(verts));
        }
        return;
    }
    for &p in prims {
        let owner = source.active_element(p as usize);
        source.for_each_facet(p as usize, respect_hide, |facet| f(owner, facet));
    }
}

impl Tree {
    /// Rebuild a dynamic-topology leaf's triangulation if it is stale.
    fn ensure_tris<S: PrimitiveSource>(
        source: &S,
        node: &mut Node,
        prims: &[u32],
        respect_hide: bool,
    ) {
        if source.dyntopo_mesh().is_some()
            && (node.tris.is_none() || node.flags.contains(NodeFlags::UPDATE_TRIS))
        {
            node.tris = Some(leaf_tri_buffer(source, prims, respect_hide));
            node.flags -= NodeFlags::UPDATE_TRIS;
        }
    }

    /// Cast a ray and report the nearest hit, the nearest hit behind it, and how many facets
    /// were crossed.
    ///
    /// `dir` need not be normalized; depths are in units of `dir`. Fully hidden leaves are
    /// skipped when the tree respects hide state.
    pub fn raycast<S: PrimitiveSource>(
        &mut self,
        source: &S,
        origin: Vec3,
        dir: Vec3,
        opts: &RaycastOptions,
    ) -> RaycastHit {
        if opts.use_original {
            if let Some(id) = opts.stroke_id {
                self.origco.begin_stroke(id, self.vertex_count);
            }
        }
        let respect_hide = self.settings.respect_hide;
        let Self {
            nodes,
            prim_indices,
            normals,
            deformed,
            origco,
            ..
        } = self;
        let mut coords = Coords {
            live: Positions::new(source, deformed.as_deref()),
            normals,
            origco: opts.use_original.then_some(origco),
        };
        let ray = RayAabbPrecalc::new(origin, dir);
        let isect = RayTriPrecalc::new(dir);
        let mut best = RaycastHit::default();

        search_occluded_in(
            nodes,
            |n| {
                if respect_hide && n.fully_hidden() {
                    return None;
                }
                ray.intersect(if opts.use_original { &n.orig_bounds } else { &n.bounds })
            },
            |_, node, tmin| {
                if node.tmin >= *tmin {
                    return;
                }
                let prims = &prim_indices[node.prim_range()];
                Self::ensure_tris(source, node, prims, respect_hide);
                let mut improved = false;
                for_each_leaf_facet(source, node, prims, respect_hide, |owner, facet| {
                    let vs = facet.verts();
                    let mut co = [Vec3::ZERO; 4];
                    for (c, &v) in co.iter_mut().zip(vs) {
                        *c = coords.get(v);
                    }
                    let co = &co[..vs.len()];
                    let normal = loop_normal(&[0, 1, 2, 3][..vs.len()], |i| co[i as usize]);
                    if !opts.double_sided && normal.dot(dir) > 0.0 {
                        return;
                    }
                    let t = match facet {
                        Facet::Tri(_) => isect.intersect(origin, co[0], co[1], co[2]),
                        Facet::Quad(_) => isect.intersect_quad(origin, co[0], co[1], co[2], co[3]),
                    };
                    let Some(t) = t else {
                        return;
                    };
                    if best.record(t) {
                        improved = true;
                        let at = origin + dir * t;
                        let nearest = (0..vs.len())
                            .min_by(|&a, &b| {
                                co[a].distance_squared(at).total_cmp(&co[b].distance_squared(at))
                            })
                            .unwrap_or(0);
                        best.active_vertex = Some(vs[nearest]);
                        best.active_primitive = Some(owner);
                        best.face_normal = Some(normal);
                    }
                });
                if improved {
                    *tmin = tmin.min(best.depth);
                }
            },
        );
        best
    }

    /// Find the facet edge nearest to a ray, hit or not.
    ///
    /// Boxes are ordered by squared distance to the ray; boxes entirely behind the origin are
    /// skipped.
    pub fn find_nearest_to_ray<S: PrimitiveSource>(
        &mut self,
        source: &S,
        origin: Vec3,
        dir: Vec3,
        opts: &RaycastOptions,
    ) -> Option<NearestToRay> {
        if opts.use_original {
            if let Some(id) = opts.stroke_id {
                self.origco.begin_stroke(id, self.vertex_count);
            }
        }
        let respect_hide = self.settings.respect_hide;
        let Self {
            nodes,
            prim_indices,
            normals,
            deformed,
            origco,
            ..
        } = self;
        let mut coords = Coords {
            live: Positions::new(source, deformed.as_deref()),
            normals,
            origco: opts.use_original.then_some(origco),
        };
        let dist = DistRayAabbPrecalc::new(origin, dir);
        let mut best: Option<NearestToRay> = None;

        search_occluded_in(
            nodes,
            |n| {
                if respect_hide && n.fully_hidden() {
                    return None;
                }
                let bb = if opts.use_original { &n.orig_bounds } else { &n.bounds };
                let (dist_sq, depth) = dist.dist_squared(bb);
                (depth > 0.0).then_some(dist_sq)
            },
            |_, node, tmin| {
                if node.tmin >= *tmin {
                    return;
                }
                let prims = &prim_indices[node.prim_range()];
                Self::ensure_tris(source, node, prims, respect_hide);
                for_each_leaf_facet(source, node, prims, respect_hide, |owner, facet| {
                    let vs = facet.verts();
                    let a = coords.get(vs[0]);
                    for w in vs[1..].windows(2) {
                        let (b, c) = (coords.get(w[0]), coords.get(w[1]));
                        let (dist_sq, depth) = dist_squared_ray_to_tri(origin, dir, a, b, c);
                        if best.is_none_or(|b| dist_sq < b.dist_sq) {
                            best = Some(NearestToRay {
                                depth,
                                dist_sq,
                                active_primitive: owner,
                            });
                        }
                    }
                });
                if let Some(b) = best {
                    *tmin = tmin.min(b.dist_sq);
                }
            },
        );
        best
    }

    /// Leaves whose live box is not entirely outside `frustum`.
    pub fn gather_in_frustum(&self, frustum: &Frustum) -> Vec<NodeIndex> {
        self.search_gather(|n| frustum.intersects_aabb(&n.bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildSettings;
    use crate::source::{DynTopoMesh, DynTopoSource, GridsSource, MeshSource};
    use crate::test_util::{grid_strip, quad_grid, unit_cube};
    use alloc::sync::Arc;
    use alloc::vec;
    use glam::Vec4;

    fn cube_ray() -> (Vec3, Vec3) {
        let origin = Vec3::new(0.3, 0.6, -2.0);
        (origin, (Vec3::splat(0.5) - origin).normalize())
    }

    #[test]
    fn cube_entry_depth_and_counts() {
        let (p, o, c) = unit_cube();
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut tree = Tree::from_source(&src);
        let (origin, dir) = cube_ray();

        let both = tree.raycast(&src, origin, dir, &RaycastOptions::default());
        assert!(both.hit);
        assert!((both.depth - 2.0 / dir.z).abs() < 1e-5);
        assert!((both.back_depth - 3.0 / dir.z).abs() < 1e-5);
        assert_eq!(both.hit_count, 2);
        assert_eq!(both.active_primitive, Some(0));
        assert!((both.face_normal.unwrap() + Vec3::Z).length() < 1e-5);

        let front = RaycastOptions {
            double_sided: false,
            ..RaycastOptions::default()
        };
        let one = tree.raycast(&src, origin, dir, &front);
        assert!(one.hit);
        assert_eq!(one.hit_count, 1);
        assert!((one.depth - both.depth).abs() < 1e-6);
    }

    #[test]
    fn active_vertex_is_nearest_corner() {
        let (p, o, c) = quad_grid(1);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut tree = Tree::from_source(&src);
        let hit = tree.raycast(
            &src,
            Vec3::new(0.9, 0.8, 1.0),
            -Vec3::Z,
            &RaycastOptions::default(),
        );
        assert!(hit.hit);
        assert_eq!(hit.active_vertex, Some(3));
    }

    #[test]
    fn miss_and_hidden() {
        let (p, o, c) = quad_grid(1);
        let hide = [true];
        let src = MeshSource::new(&p, &o, &c)
            .unwrap()
            .with_hidden_faces(&hide)
            .unwrap();
        let mut tree = Tree::from_source(&src);
        let down = -Vec3::Z;
        let hit = tree.raycast(&src, Vec3::new(0.5, 0.5, 1.0), down, &RaycastOptions::default());
        assert!(!hit.hit);
        assert_eq!(hit.hit_count, 0);

        let mut tree = Tree::build(&src, BuildSettings::default().with_respect_hide(false));
        let hit = tree.raycast(&src, Vec3::new(0.5, 0.5, 1.0), down, &RaycastOptions::default());
        assert!(hit.hit);

        let hit = tree.raycast(&src, Vec3::new(5.0, 5.0, 1.0), down, &RaycastOptions::default());
        assert_eq!(hit, RaycastHit::default());
    }

    #[test]
    fn original_mode_ignores_stroke_deformation() {
        let (p, o, c) = quad_grid(1);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut tree = Tree::from_source(&src);
        let opts = RaycastOptions {
            use_original: true,
            stroke_id: Some(1),
            ..RaycastOptions::default()
        };
        let origin = Vec3::new(0.5, 0.5, 5.0);
        let first = tree.raycast(&src, origin, -Vec3::Z, &opts);
        assert!((first.depth - 5.0).abs() < 1e-6);

        let lifted: Vec<Vec3> = p.iter().map(|v| *v + Vec3::Z).collect();
        tree.apply_deformed_positions(&src, &lifted);
        let live = tree.raycast(&src, origin, -Vec3::Z, &RaycastOptions::default());
        assert!((live.depth - 4.0).abs() < 1e-6);
        // Same stroke: the snapshot still has the undeformed quad.
        let orig = tree.raycast(&src, origin, -Vec3::Z, &opts);
        assert!((orig.depth - 5.0).abs() < 1e-6);

        let next = RaycastOptions {
            stroke_id: Some(2),
            ..opts
        };
        let fresh = tree.raycast(&src, origin, -Vec3::Z, &next);
        assert!((fresh.depth - 4.0).abs() < 1e-6);
    }

    #[test]
    fn dyntopo_raycast_uses_tri_buffer() {
        let mesh = DynTopoMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)],
            vec![[0, 1, 2], [2, 1, 3]],
        )
        .unwrap();
        let src = DynTopoSource::new(Arc::new(mesh));
        let mut tree = Tree::from_source(&src);
        let hit = tree.raycast(
            &src,
            Vec3::new(0.8, 0.8, 1.0),
            -Vec3::Z,
            &RaycastOptions::default(),
        );
        assert!(hit.hit);
        assert_eq!(hit.active_primitive, Some(1));
        assert_eq!(hit.active_vertex, Some(3));
        assert!(tree.node(NodeIndex::ROOT).tri_buffer().is_some());
    }

    #[test]
    fn grid_hit_reports_grid_and_corner() {
        let (p, g2f) = grid_strip(2, 3);
        let src = GridsSource::new(3, &p, &g2f).unwrap();
        let mut tree = Tree::from_source(&src);
        let down = -Vec3::Z;
        let opts = RaycastOptions::default();

        // Above the 0-2 diagonal of grid 1's first cell, then below it.
        let upper = tree.raycast(&src, Vec3::new(2.8, 0.9, 1.0), down, &opts);
        assert!(upper.hit);
        assert!((upper.depth - 1.0).abs() < 1e-6);
        assert_eq!(upper.active_primitive, Some(1));
        assert_eq!(upper.active_vertex, Some(9 + 3 + 1));
        assert_eq!(upper.hit_count, 1);

        let lower = tree.raycast(&src, Vec3::new(2.8, 0.2, 1.0), down, &opts);
        assert!(lower.hit);
        assert_eq!(lower.active_primitive, Some(1));
        assert_eq!(lower.active_vertex, Some(9 + 1));

        let first = tree.raycast(&src, Vec3::new(0.5, 1.5, 1.0), down, &opts);
        assert_eq!(first.active_primitive, Some(0));
    }

    #[test]
    fn grid_hidden_cell_is_skipped() {
        let (p, g2f) = grid_strip(2, 3);
        let mut hidden = vec![false; p.len()];
        // Corner (0, 0) of grid 1 hides only that grid's first cell.
        hidden[9] = true;
        let src = GridsSource::new(3, &p, &g2f)
            .unwrap()
            .with_hidden(&hidden)
            .unwrap();
        let mut tree = Tree::from_source(&src);
        let down = -Vec3::Z;
        let opts = RaycastOptions::default();

        let miss = tree.raycast(&src, Vec3::new(2.3, 0.4, 1.0), down, &opts);
        assert!(!miss.hit);
        let hit = tree.raycast(&src, Vec3::new(3.5, 1.5, 1.0), down, &opts);
        assert!(hit.hit);
        assert_eq!(hit.active_primitive, Some(1));

        let mut tree = Tree::build(&src, BuildSettings::default().with_respect_hide(false));
        assert!(tree.raycast(&src, Vec3::new(2.3, 0.4, 1.0), down, &opts).hit);
    }

    #[test]
    fn nearest_to_ray_finds_close_edge() {
        let (p, o, c) = quad_grid(4);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut tree = Tree::build(&src, BuildSettings::default().with_leaf_limit(4));
        // Runs 0.5 above the grid's y = 4 border without touching it.
        let origin = Vec3::new(-1.0, 4.0, 0.5);
        let near = tree
            .find_nearest_to_ray(&src, origin, Vec3::X, &RaycastOptions::default())
            .unwrap();
        assert!((near.dist_sq - 0.25).abs() < 1e-5);
        assert!(near.depth > 0.0);
    }

    #[test]
    fn frustum_gather() {
        let (p, o, c) = quad_grid(8);
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let tree = Tree::build(&src, BuildSettings::default().with_leaf_limit(8));
        // Keep x <= 2.
        let frustum = Frustum::new(&[Vec4::new(-1.0, 0.0, 0.0, 2.0)]);
        let picked = tree.gather_in_frustum(&frustum);
        assert!(!picked.is_empty() && picked.len() < tree.leaf_count());
        for i in picked {
            assert!(tree.node(i).bounds().min.x <= 2.0);
        }
    }
}
