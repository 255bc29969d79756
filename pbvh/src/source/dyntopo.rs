// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dynamic-topology adapter.
//!
//! The mesh is shared: several trees (and the cache) may hold the same [`Arc<DynTopoMesh>`].
//! It is freed once the last holder lets go.

use alloc::sync::Arc;
use alloc::vec::Vec;

use glam::Vec3;

use super::{
    DYNTOPO_LEAF_LIMIT, ElementCounts, Facet, LayerSet, PrimitiveSource, SourceKind, SourceStamp,
    count_edges,
};
use crate::error::{SourceError, check_len, check_verts};

/// Owned triangle mesh edited by dynamic-topology tools.
#[derive(Clone, Debug, Default)]
pub struct DynTopoMesh {
    positions: Vec<Vec3>,
    tris: Vec<[u32; 3]>,
    hide_face: Option<Vec<bool>>,
    hide_vert: Option<Vec<bool>>,
    mask: Option<Vec<f32>>,
}

impl DynTopoMesh {
    /// Create from positions and triangles.
    pub fn new(positions: Vec<Vec3>, tris: Vec<[u32; 3]>) -> Result<Self, SourceError> {
        check_verts(tris.as_flattened(), positions.len())?;
        Ok(Self {
            positions,
            tris,
            hide_face: None,
            hide_vert: None,
            mask: None,
        })
    }

    /// Attach per-face hide flags.
    pub fn with_hidden_faces(mut self, hide: Vec<bool>) -> Result<Self, SourceError> {
        check_len("hide_face", self.tris.len(), hide.len())?;
        self.hide_face = Some(hide);
        Ok(self)
    }

    /// Attach per-vertex hide flags.
    pub fn with_hidden_verts(mut self, hide: Vec<bool>) -> Result<Self, SourceError> {
        check_len("hide_vert", self.positions.len(), hide.len())?;
        self.hide_vert = Some(hide);
        Ok(self)
    }

    /// Attach a per-vertex mask.
    pub fn with_mask(mut self, mask: Vec<f32>) -> Result<Self, SourceError> {
        check_len("mask", self.positions.len(), mask.len())?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Vertex positions.
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Mutable vertex positions. Topology stays fixed.
    pub fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    /// Triangles.
    pub fn tris(&self) -> &[[u32; 3]] {
        &self.tris
    }

    /// Mutable per-face hide flags, if present.
    pub fn hidden_faces_mut(&mut self) -> Option<&mut [bool]> {
        self.hide_face.as_deref_mut()
    }

    /// Mutable mask, if present.
    pub fn mask_mut(&mut self) -> Option<&mut [f32]> {
        self.mask.as_deref_mut()
    }
}

/// Primitive source over a shared [`DynTopoMesh`]. Every face is its own owner.
#[derive(Clone, Debug)]
pub struct DynTopoSource {
    mesh: Arc<DynTopoMesh>,
}

impl DynTopoSource {
    /// Wrap a shared mesh.
    pub fn new(mesh: Arc<DynTopoMesh>) -> Self {
        Self { mesh }
    }

    /// The wrapped mesh.
    pub fn mesh(&self) -> &Arc<DynTopoMesh> {
        &self.mesh
    }
}

impl PrimitiveSource for DynTopoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::DynTopo
    }

    fn primitive_count(&self) -> usize {
        self.mesh.tris.len()
    }

    fn vertex_count(&self) -> usize {
        self.mesh.positions.len()
    }

    fn position(&self, vert: u32) -> Vec3 {
        self.mesh.positions[vert as usize]
    }

    fn for_each_vertex(&self, prim: usize, mut f: impl FnMut(u32)) {
        for v in self.mesh.tris[prim] {
            f(v);
        }
    }

    fn for_each_facet(&self, prim: usize, respect_hide: bool, mut f: impl FnMut(Facet)) {
        if respect_hide && self.is_primitive_hidden(prim) {
            return;
        }
        f(Facet::Tri(self.mesh.tris[prim]));
    }

    fn for_each_normal_face(&self, prim: usize, mut f: impl FnMut(&[u32])) {
        f(&self.mesh.tris[prim]);
    }

    fn owner_of(&self, prim: usize) -> usize {
        prim
    }

    fn is_primitive_hidden(&self, prim: usize) -> bool {
        self.mesh.hide_face.as_ref().is_some_and(|h| h[prim])
    }

    fn has_vertex_hide(&self) -> bool {
        self.mesh.hide_vert.is_some()
    }

    fn is_vertex_hidden(&self, vert: u32) -> bool {
        self.mesh
            .hide_vert
            .as_ref()
            .is_some_and(|h| h[vert as usize])
    }

    fn has_mask(&self) -> bool {
        self.mesh.mask.is_some()
    }

    fn mask(&self, vert: u32) -> f32 {
        self.mesh.mask.as_ref().map_or(0.0, |m| m[vert as usize])
    }

    fn default_leaf_limit(&self) -> usize {
        DYNTOPO_LEAF_LIMIT
    }

    fn dyntopo_mesh(&self) -> Option<&Arc<DynTopoMesh>> {
        Some(&self.mesh)
    }

    fn stamp(&self) -> SourceStamp {
        let mut layers = LayerSet::empty();
        layers.set(LayerSet::HIDE_FACE, self.mesh.hide_face.is_some());
        layers.set(LayerSet::HIDE_VERT, self.mesh.hide_vert.is_some());
        layers.set(LayerSet::MASK, self.mesh.mask.is_some());
        SourceStamp {
            kind: SourceKind::DynTopo,
            counts: ElementCounts {
                verts: self.mesh.positions.len(),
                edges: count_edges(self.mesh.tris.iter().map(|t| &t[..])),
                loops: self.mesh.tris.len() * 3,
                faces: self.mesh.tris.len(),
            },
            layers,
            grid_size: 0,
        }
    }
}
