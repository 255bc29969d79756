// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-stroke snapshot of vertex positions and normals.
//!
//! A stroke deforms the very geometry it picks against. Ray queries in original mode read
//! from this snapshot instead, so picking stays stable for the whole stroke. Vertices are
//! captured lazily on first access; a new stroke id drops every capture exactly once.

use alloc::vec;
use alloc::vec::Vec;

use glam::Vec3;

#[derive(Clone, Debug, Default)]
pub(crate) struct OriginalCoords {
    stroke_id: Option<i32>,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    captured: Vec<bool>,
}

impl OriginalCoords {
    pub(crate) fn stroke_id(&self) -> Option<i32> {
        self.stroke_id
    }

    /// Returns `true` when the snapshot was dropped for the new stroke.
    pub(crate) fn begin_stroke(&mut self, stroke_id: i32, vertex_count: usize) -> bool {
        if self.stroke_id == Some(stroke_id) && self.captured.len() == vertex_count {
            return false;
        }
        self.stroke_id = Some(stroke_id);
        self.positions = vec![Vec3::ZERO; vertex_count];
        self.normals = vec![Vec3::ZERO; vertex_count];
        self.captured = vec![false; vertex_count];
        log::trace!("original coordinates reset for stroke {stroke_id}");
        true
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    fn ensure_len(&mut self, vertex_count: usize) {
        if self.captured.len() < vertex_count {
            self.positions.resize(vertex_count, Vec3::ZERO);
            self.normals.resize(vertex_count, Vec3::ZERO);
            self.captured.resize(vertex_count, false);
        }
    }

    pub(crate) fn get(&self, vert: u32) -> Option<Vec3> {
        let v = vert as usize;
        self.captured
            .get(v)
            .copied()
            .unwrap_or(false)
            .then(|| self.positions[v])
    }

    pub(crate) fn normal(&self, vert: u32) -> Option<Vec3> {
        let v = vert as usize;
        self.captured
            .get(v)
            .copied()
            .unwrap_or(false)
            .then(|| self.normals[v])
    }

    /// Snapshot `vert` unless it already is, then return the snapshot.
    pub(crate) fn get_or_capture(
        &mut self,
        vert: u32,
        live: impl Fn(u32) -> (Vec3, Vec3),
    ) -> Vec3 {
        let v = vert as usize;
        self.ensure_len(v + 1);
        if !self.captured[v] {
            let (co, no) = live(vert);
            self.positions[v] = co;
            self.normals[v] = no;
            self.captured[v] = true;
        }
        self.positions[v]
    }

    pub(crate) fn capture(&mut self, verts: &[u32], live: impl Fn(u32) -> (Vec3, Vec3)) {
        for &v in verts {
            self.get_or_capture(v, &live);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lazy_capture_sticks_within_a_stroke() {
        let mut oc = OriginalCoords::default();
        assert!(oc.begin_stroke(1, 3));
        let p = oc.get_or_capture(2, |_| (Vec3::X, Vec3::Z));
        assert_eq!(p, Vec3::X);
        // Live data moved; the snapshot must not.
        let p = oc.get_or_capture(2, |_| (Vec3::Y, Vec3::Z));
        assert_eq!(p, Vec3::X);
        assert!(!oc.begin_stroke(1, 3));
        assert_eq!(oc.get(2), Some(Vec3::X));
        assert_eq!(oc.normal(2), Some(Vec3::Z));
        assert_eq!(oc.get(0), None);
    }

    #[test]
    fn new_stroke_resnapshots_once() {
        let mut oc = OriginalCoords::default();
        oc.begin_stroke(1, 2);
        oc.capture(&[0, 1], |_| (Vec3::ONE, Vec3::Z));
        assert!(oc.begin_stroke(2, 2));
        assert_eq!(oc.get(0), None);
        assert!(!oc.begin_stroke(2, 2));
        assert_eq!(oc.stroke_id(), Some(2));
    }
}
