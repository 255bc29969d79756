// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Polygon mesh adapter.

use alloc::vec::Vec;

use glam::Vec3;

use super::{
    ElementCounts, Facet, LayerSet, MaterialKey, PrimitiveSource, SourceKind, SourceStamp,
    count_edges,
};
use crate::error::{SourceError, check_len, check_verts};

/// Borrowed polygon mesh, indexed by fan triangle.
///
/// Polygons are described CSR-style: polygon `f` uses
/// `corner_verts[face_offsets[f]..face_offsets[f + 1]]`. Each polygon with `n` corners becomes
/// `n - 2` consecutive triangles, all owned by that polygon.
#[derive(Clone, Debug)]
pub struct MeshSource<'a> {
    positions: &'a [Vec3],
    face_offsets: &'a [u32],
    corner_verts: &'a [u32],
    tris: Vec<[u32; 3]>,
    tri_faces: Vec<u32>,
    edge_count: usize,
    hide_face: Option<&'a [bool]>,
    hide_vert: Option<&'a [bool]>,
    material: Option<&'a [i32]>,
    smooth: Option<&'a [bool]>,
    mask: Option<&'a [f32]>,
    face_sets: Option<&'a [i32]>,
}

impl<'a> MeshSource<'a> {
    /// Wrap mesh topology and positions, triangulating every polygon.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "face counts fit in u32 like vertex indices do"
    )]
    pub fn new(
        positions: &'a [Vec3],
        face_offsets: &'a [u32],
        corner_verts: &'a [u32],
    ) -> Result<Self, SourceError> {
        check_verts(corner_verts, positions.len())?;
        if let Some(&last) = face_offsets.last() {
            check_len("corner_verts", last as usize, corner_verts.len())?;
        }
        let mut tris = Vec::with_capacity(corner_verts.len());
        let mut tri_faces = Vec::with_capacity(corner_verts.len());
        for (face, w) in face_offsets.windows(2).enumerate() {
            let (start, end) = (w[0] as usize, w[1] as usize);
            if end < start + 3 || end > corner_verts.len() {
                return Err(SourceError::InvalidPolygon { face });
            }
            let corners = &corner_verts[start..end];
            for i in 1..corners.len() - 1 {
                tris.push([corners[0], corners[i], corners[i + 1]]);
                tri_faces.push(face as u32);
            }
        }
        let edge_count = count_edges(
            face_offsets
                .windows(2)
                .map(|w| &corner_verts[w[0] as usize..w[1] as usize]),
        );
        Ok(Self {
            positions,
            face_offsets,
            corner_verts,
            tris,
            tri_faces,
            edge_count,
            hide_face: None,
            hide_vert: None,
            material: None,
            smooth: None,
            mask: None,
            face_sets: None,
        })
    }

    /// Number of polygons.
    pub fn face_count(&self) -> usize {
        self.face_offsets.len().saturating_sub(1)
    }

    /// Attach per-face hide flags.
    pub fn with_hidden_faces(mut self, hide: &'a [bool]) -> Result<Self, SourceError> {
        check_len("hide_face", self.face_count(), hide.len())?;
        self.hide_face = Some(hide);
        Ok(self)
    }

    /// Attach per-vertex hide flags.
    pub fn with_hidden_verts(mut self, hide: &'a [bool]) -> Result<Self, SourceError> {
        check_len("hide_vert", self.positions.len(), hide.len())?;
        self.hide_vert = Some(hide);
        Ok(self)
    }

    /// Attach per-face material slots.
    pub fn with_materials(mut self, material: &'a [i32]) -> Result<Self, SourceError> {
        check_len("material", self.face_count(), material.len())?;
        self.material = Some(material);
        Ok(self)
    }

    /// Attach per-face smooth-shading flags.
    pub fn with_smooth(mut self, smooth: &'a [bool]) -> Result<Self, SourceError> {
        check_len("smooth", self.face_count(), smooth.len())?;
        self.smooth = Some(smooth);
        Ok(self)
    }

    /// Attach a per-vertex mask.
    pub fn with_mask(mut self, mask: &'a [f32]) -> Result<Self, SourceError> {
        check_len("mask", self.positions.len(), mask.len())?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Attach per-face face-set labels.
    pub fn with_face_sets(mut self, face_sets: &'a [i32]) -> Result<Self, SourceError> {
        check_len("face_sets", self.face_count(), face_sets.len())?;
        self.face_sets = Some(face_sets);
        Ok(self)
    }

    /// Face-set label of a polygon, if the mesh has face sets.
    pub fn face_set(&self, face: usize) -> Option<i32> {
        self.face_sets.map(|s| s[face])
    }

    /// Triangle vertex indices.
    pub fn tris(&self) -> &[[u32; 3]] {
        &self.tris
    }

    /// Owning polygon of each triangle.
    pub fn tri_faces(&self) -> &[u32] {
        &self.tri_faces
    }

    fn face_corners(&self, face: usize) -> &[u32] {
        let start = self.face_offsets[face] as usize;
        let end = self.face_offsets[face + 1] as usize;
        &self.corner_verts[start..end]
    }

    fn face_hidden(&self, face: usize) -> bool {
        self.hide_face.is_some_and(|h| h[face])
    }
}

impl PrimitiveSource for MeshSource<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::Faces
    }

    fn primitive_count(&self) -> usize {
        self.tris.len()
    }

    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, vert: u32) -> Vec3 {
        self.positions[vert as usize]
    }

    fn for_each_vertex(&self, prim: usize, mut f: impl FnMut(u32)) {
        for v in self.tris[prim] {
            f(v);
        }
    }

    fn for_each_facet(&self, prim: usize, respect_hide: bool, mut f: impl FnMut(Facet)) {
        if respect_hide && self.face_hidden(self.tri_faces[prim] as usize) {
            return;
        }
        f(Facet::Tri(self.tris[prim]));
    }

    fn for_each_normal_face(&self, prim: usize, mut f: impl FnMut(&[u32])) {
        let face = self.tri_faces[prim];
        // Fan triangles of a polygon are consecutive; report the polygon from its first one.
        if prim == 0 || self.tri_faces[prim - 1] != face {
            f(self.face_corners(face as usize));
        }
    }

    fn owner_of(&self, prim: usize) -> usize {
        self.tri_faces[prim] as usize
    }

    fn material_of(&self, prim: usize) -> Option<MaterialKey> {
        if self.material.is_none() && self.smooth.is_none() {
            return None;
        }
        let face = self.tri_faces[prim] as usize;
        Some(MaterialKey {
            material: self.material.map_or(0, |m| m[face]),
            smooth: self.smooth.is_some_and(|s| s[face]),
        })
    }

    fn is_primitive_hidden(&self, prim: usize) -> bool {
        self.face_hidden(self.tri_faces[prim] as usize)
    }

    fn has_vertex_hide(&self) -> bool {
        self.hide_vert.is_some()
    }

    fn is_vertex_hidden(&self, vert: u32) -> bool {
        self.hide_vert.is_some_and(|h| h[vert as usize])
    }

    fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn mask(&self, vert: u32) -> f32 {
        self.mask.map_or(0.0, |m| m[vert as usize])
    }

    fn stamp(&self) -> SourceStamp {
        let mut layers = LayerSet::empty();
        layers.set(LayerSet::HIDE_FACE, self.hide_face.is_some());
        layers.set(LayerSet::HIDE_VERT, self.hide_vert.is_some());
        layers.set(LayerSet::MATERIAL, self.material.is_some());
        layers.set(LayerSet::SMOOTH, self.smooth.is_some());
        layers.set(LayerSet::MASK, self.mask.is_some());
        layers.set(LayerSet::FACE_SETS, self.face_sets.is_some());
        SourceStamp {
            kind: SourceKind::Faces,
            counts: ElementCounts {
                verts: self.positions.len(),
                edges: self.edge_count,
                loops: self.corner_verts.len(),
                faces: self.face_count(),
            },
            layers,
            grid_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn quad_and_tri() -> (Vec<Vec3>, Vec<u32>, Vec<u32>) {
        let positions = vec![
            Vec3::ZERO,
            Vec3::X,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::Y,
            Vec3::new(2.0, 0.0, 0.0),
        ];
        (positions, vec![0, 4, 7], vec![0, 1, 2, 3, 1, 4, 2])
    }

    #[test]
    fn fan_triangulation() {
        let (p, o, c) = quad_and_tri();
        let src = MeshSource::new(&p, &o, &c).unwrap();
        assert_eq!(src.primitive_count(), 3);
        assert_eq!(src.tris(), &[[0, 1, 2], [0, 2, 3], [1, 4, 2]]);
        assert_eq!(src.tri_faces(), &[0, 0, 1]);
        assert_eq!(src.owner_of(1), 0);
        assert_eq!(src.stamp().counts.edges, 6);
    }

    #[test]
    fn normal_faces_reported_once() {
        let (p, o, c) = quad_and_tri();
        let src = MeshSource::new(&p, &o, &c).unwrap();
        let mut seen = Vec::new();
        for prim in 0..src.primitive_count() {
            src.for_each_normal_face(prim, |f| seen.push(f.len()));
        }
        assert_eq!(seen, vec![4, 3]);
    }

    #[test]
    fn hidden_faces_skip_facets() {
        let (p, o, c) = quad_and_tri();
        let hide = [true, false];
        let src = MeshSource::new(&p, &o, &c)
            .unwrap()
            .with_hidden_faces(&hide)
            .unwrap();
        let mut n = 0;
        src.for_each_facet(0, true, |_| n += 1);
        assert_eq!(n, 0);
        src.for_each_facet(0, false, |_| n += 1);
        assert_eq!(n, 1);
        assert!(src.is_primitive_hidden(1));
        assert!(!src.is_primitive_hidden(2));
    }

    #[test]
    fn material_only_with_attributes() {
        let (p, o, c) = quad_and_tri();
        let src = MeshSource::new(&p, &o, &c).unwrap();
        assert_eq!(src.material_of(0), None);
        let mats = [0, 2];
        let src = src.with_materials(&mats).unwrap();
        assert_eq!(
            src.material_of(2),
            Some(MaterialKey {
                material: 2,
                smooth: false
            })
        );
    }

    #[test]
    fn validation_errors() {
        let (p, o, c) = quad_and_tri();
        let bad = [0, 1, 9];
        assert!(matches!(
            MeshSource::new(&p, &[0, 3], &bad),
            Err(SourceError::VertexOutOfRange { vertex: 9, .. })
        ));
        assert!(matches!(
            MeshSource::new(&p, &[0, 2], &c[..2]),
            Err(SourceError::InvalidPolygon { face: 0 })
        ));
        // Offsets past the corner array or going backwards are rejected, not sliced.
        assert!(matches!(
            MeshSource::new(&p, &[0, 5, 4], &c[..4]),
            Err(SourceError::InvalidPolygon { face: 0 })
        ));
        assert!(matches!(
            MeshSource::new(&p, &[0, 4, 3, 7], &c),
            Err(SourceError::InvalidPolygon { face: 1 })
        ));
        let src = MeshSource::new(&p, &o, &c).unwrap();
        assert!(matches!(
            src.with_mask(&[0.0; 2]),
            Err(SourceError::AttributeLength {
                attribute: "mask",
                ..
            })
        ));
    }
}
