// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subdivision grid adapter.

use glam::Vec3;

use super::{
    DEFAULT_LEAF_LIMIT, ElementCounts, Facet, LayerSet, MaterialKey, PrimitiveSource, SourceKind,
    SourceStamp,
};
use crate::error::{SourceError, check_len};

/// Borrowed set of square grids, one primitive per grid.
///
/// Every grid has `grid_size * grid_size` vertices stored row-major, so vertex `(x, y)` of grid
/// `g` has index `g * grid_area + y * grid_size + x`. Each grid belongs to one base face
/// (`grid_to_face`); grids of the same face always share a leaf.
#[derive(Clone, Debug)]
pub struct GridsSource<'a> {
    grid_size: usize,
    grid_area: usize,
    positions: &'a [Vec3],
    grid_to_face: &'a [u32],
    face_count: usize,
    max_grids_per_face: usize,
    hidden: Option<&'a [bool]>,
    mask: Option<&'a [f32]>,
    material: Option<&'a [i32]>,
    smooth: Option<&'a [bool]>,
}

impl<'a> GridsSource<'a> {
    /// Wrap grid positions. `positions` must hold `grid_to_face.len() * grid_size²` entries.
    pub fn new(
        grid_size: usize,
        positions: &'a [Vec3],
        grid_to_face: &'a [u32],
    ) -> Result<Self, SourceError> {
        if grid_size < 2 {
            return Err(SourceError::InvalidGridSize { grid_size });
        }
        let grid_area = grid_size * grid_size;
        check_len("positions", grid_to_face.len() * grid_area, positions.len())?;
        let face_count = grid_to_face.iter().map(|&f| f as usize + 1).max().unwrap_or(0);
        let mut per_face = alloc::vec![0_usize; face_count];
        for &f in grid_to_face {
            per_face[f as usize] += 1;
        }
        let max_grids_per_face = per_face.iter().copied().max().unwrap_or(0);
        Ok(Self {
            grid_size,
            grid_area,
            positions,
            grid_to_face,
            face_count,
            max_grids_per_face,
            hidden: None,
            mask: None,
            material: None,
            smooth: None,
        })
    }

    /// Attach per-vertex hide flags, laid out like the positions.
    pub fn with_hidden(mut self, hidden: &'a [bool]) -> Result<Self, SourceError> {
        check_len("grid_hidden", self.positions.len(), hidden.len())?;
        self.hidden = Some(hidden);
        Ok(self)
    }

    /// Attach a per-vertex mask, laid out like the positions.
    pub fn with_mask(mut self, mask: &'a [f32]) -> Result<Self, SourceError> {
        check_len("mask", self.positions.len(), mask.len())?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Attach material slots, one per base face.
    pub fn with_materials(mut self, material: &'a [i32]) -> Result<Self, SourceError> {
        check_len("material", self.face_count, material.len())?;
        self.material = Some(material);
        Ok(self)
    }

    /// Attach smooth-shading flags, one per base face.
    pub fn with_smooth(mut self, smooth: &'a [bool]) -> Result<Self, SourceError> {
        check_len("smooth", self.face_count, smooth.len())?;
        self.smooth = Some(smooth);
        Ok(self)
    }

    /// Number of base faces referenced by `grid_to_face`.
    pub fn face_count(&self) -> usize {
        self.face_count
    }

    /// Side length of every grid.
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Vertices per grid.
    pub fn grid_area(&self) -> usize {
        self.grid_area
    }

    /// Number of grids.
    pub fn grid_count(&self) -> usize {
        self.grid_to_face.len()
    }

    #[allow(
        clippy::cast_possible_truncation,
        reason = "grid vertex indices are u32 like every other vertex index"
    )]
    fn vert(&self, grid: usize, x: usize, y: usize) -> u32 {
        (grid * self.grid_area + y * self.grid_size + x) as u32
    }

    fn cell(&self, grid: usize, x: usize, y: usize) -> [u32; 4] {
        [
            self.vert(grid, x, y),
            self.vert(grid, x + 1, y),
            self.vert(grid, x + 1, y + 1),
            self.vert(grid, x, y + 1),
        ]
    }

    fn cell_hidden(&self, cell: &[u32; 4]) -> bool {
        self.hidden
            .is_some_and(|h| cell.iter().any(|&v| h[v as usize]))
    }

    fn for_each_cell(&self, grid: usize, mut f: impl FnMut([u32; 4])) {
        for y in 0..self.grid_size - 1 {
            for x in 0..self.grid_size - 1 {
                f(self.cell(grid, x, y));
            }
        }
    }
}

impl PrimitiveSource for GridsSource<'_> {
    fn kind(&self) -> SourceKind {
        SourceKind::Grids
    }

    fn primitive_count(&self) -> usize {
        self.grid_to_face.len()
    }

    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, vert: u32) -> Vec3 {
        self.positions[vert as usize]
    }

    fn for_each_vertex(&self, prim: usize, mut f: impl FnMut(u32)) {
        let start = self.vert(prim, 0, 0);
        let end = self.vert(prim + 1, 0, 0);
        for v in start..end {
            f(v);
        }
    }

    fn for_each_facet(&self, prim: usize, respect_hide: bool, mut f: impl FnMut(Facet)) {
        self.for_each_cell(prim, |cell| {
            if !(respect_hide && self.cell_hidden(&cell)) {
                f(Facet::Quad(cell));
            }
        });
    }

    fn for_each_normal_face(&self, prim: usize, mut f: impl FnMut(&[u32])) {
        self.for_each_cell(prim, |cell| f(&cell));
    }

    fn owner_of(&self, prim: usize) -> usize {
        self.grid_to_face[prim] as usize
    }

    fn material_of(&self, prim: usize) -> Option<MaterialKey> {
        if self.material.is_none() && self.smooth.is_none() {
            return None;
        }
        let face = self.grid_to_face[prim] as usize;
        Some(MaterialKey {
            material: self.material.map_or(0, |m| m[face]),
            smooth: self.smooth.is_some_and(|s| s[face]),
        })
    }

    fn active_element(&self, prim: usize) -> usize {
        prim
    }

    fn is_primitive_hidden(&self, prim: usize) -> bool {
        if self.hidden.is_none() {
            return false;
        }
        let mut all = true;
        self.for_each_cell(prim, |cell| all &= self.cell_hidden(&cell));
        all
    }

    fn has_vertex_hide(&self) -> bool {
        self.hidden.is_some()
    }

    fn is_vertex_hidden(&self, vert: u32) -> bool {
        self.hidden.is_some_and(|h| h[vert as usize])
    }

    fn has_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn mask(&self, vert: u32) -> f32 {
        self.mask.map_or(0.0, |m| m[vert as usize])
    }

    fn default_leaf_limit(&self) -> usize {
        (DEFAULT_LEAF_LIMIT / self.grid_area).max(self.max_grids_per_face)
    }

    fn stamp(&self) -> SourceStamp {
        let mut layers = LayerSet::empty();
        layers.set(LayerSet::HIDE_VERT, self.hidden.is_some());
        layers.set(LayerSet::MASK, self.mask.is_some());
        layers.set(LayerSet::MATERIAL, self.material.is_some());
        layers.set(LayerSet::SMOOTH, self.smooth.is_some());
        SourceStamp {
            kind: SourceKind::Grids,
            counts: ElementCounts {
                verts: self.positions.len(),
                edges: 0,
                loops: self.grid_to_face.len(),
                faces: self.face_count,
            },
            layers,
            grid_size: self.grid_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn flat_grids(grid_size: usize, grid_to_face: &[u32]) -> Vec<Vec3> {
        let mut out = Vec::new();
        for (g, _) in grid_to_face.iter().enumerate() {
            for y in 0..grid_size {
                for x in 0..grid_size {
                    out.push(Vec3::new((g * grid_size + x) as f32, y as f32, 0.0));
                }
            }
        }
        out
    }

    #[test]
    fn indexing_and_cells() {
        let g2f = [0, 0, 1];
        let p = flat_grids(3, &g2f);
        let src = GridsSource::new(3, &p, &g2f).unwrap();
        assert_eq!(src.primitive_count(), 3);
        assert_eq!(src.vertex_count(), 27);
        assert_eq!(src.vert(1, 2, 1), 9 + 3 + 2);
        let mut cells = 0;
        src.for_each_facet(2, true, |_| cells += 1);
        assert_eq!(cells, 4);
        assert_eq!(src.owner_of(1), 0);
        assert_eq!(src.active_element(1), 1);
        assert_eq!(src.default_leaf_limit(), 4000 / 9);
    }

    #[test]
    fn hidden_vertex_hides_adjacent_cells() {
        let g2f = [0];
        let p = flat_grids(3, &g2f);
        let mut hidden = [false; 9];
        hidden[4] = true; // center vertex touches all four cells
        let src = GridsSource::new(3, &p, &g2f)
            .unwrap()
            .with_hidden(&hidden)
            .unwrap();
        let mut cells = 0;
        src.for_each_facet(0, true, |_| cells += 1);
        assert_eq!(cells, 0);
        assert!(src.is_primitive_hidden(0));
        src.for_each_facet(0, false, |_| cells += 1);
        assert_eq!(cells, 4);
    }

    #[test]
    fn materials_come_from_the_base_face() {
        let g2f = [0, 0, 1];
        let p = flat_grids(2, &g2f);
        let src = GridsSource::new(2, &p, &g2f).unwrap();
        assert_eq!(src.material_of(2), None);
        let mats = [3, 5];
        let smooth = [true, false];
        let src = src.with_materials(&mats).unwrap().with_smooth(&smooth).unwrap();
        assert_eq!(
            src.material_of(1),
            Some(MaterialKey {
                material: 3,
                smooth: true
            })
        );
        assert_eq!(
            src.material_of(2),
            Some(MaterialKey {
                material: 5,
                smooth: false
            })
        );
        assert!(src.stamp().layers.contains(LayerSet::MATERIAL | LayerSet::SMOOTH));
        assert!(GridsSource::new(2, &p, &g2f).unwrap().with_materials(&[0]).is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            GridsSource::new(1, &[], &[]).unwrap_err(),
            SourceError::InvalidGridSize { grid_size: 1 }
        );
        let p = [Vec3::ZERO; 5];
        assert!(GridsSource::new(2, &p, &[0]).is_err());
    }
}
