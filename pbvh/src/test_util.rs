// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small meshes shared by unit tests.

use alloc::vec;
use alloc::vec::Vec;

use glam::Vec3;

/// `n` by `n` unit quads in the XY plane, counter-clockwise seen from +Z.
#[allow(
    clippy::cast_possible_truncation,
    reason = "test meshes are tiny"
)]
pub(crate) fn quad_grid(n: usize) -> (Vec<Vec3>, Vec<u32>, Vec<u32>) {
    let mut positions = Vec::new();
    for y in 0..=n {
        for x in 0..=n {
            positions.push(Vec3::new(x as f32, y as f32, 0.0));
        }
    }
    let row = n as u32 + 1;
    let mut offsets = vec![0];
    let mut corners = Vec::new();
    for y in 0..n as u32 {
        for x in 0..n as u32 {
            let v = y * row + x;
            corners.extend_from_slice(&[v, v + 1, v + 1 + row, v + row]);
            offsets.push(corners.len() as u32);
        }
    }
    (positions, offsets, corners)
}

/// `count` grids of side `size` laid edge to edge along +X in the XY plane, one base face
/// each. Grid `g` covers `x` in `[g * (size - 1), (g + 1) * (size - 1)]`.
#[allow(
    clippy::cast_possible_truncation,
    reason = "test meshes are tiny"
)]
pub(crate) fn grid_strip(count: usize, size: usize) -> (Vec<Vec3>, Vec<u32>) {
    let mut positions = Vec::with_capacity(count * size * size);
    for g in 0..count {
        for y in 0..size {
            for x in 0..size {
                positions.push(Vec3::new((g * (size - 1) + x) as f32, y as f32, 0.0));
            }
        }
    }
    (positions, (0..count as u32).collect())
}

/// Unit cube `[0, 1]³` as six outward-facing quads.
pub(crate) fn unit_cube() -> (Vec<Vec3>, Vec<u32>, Vec<u32>) {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(0.0, 1.0, 1.0),
    ];
    let corners = vec![
        0, 3, 2, 1, // -z
        4, 5, 6, 7, // +z
        0, 1, 5, 4, // -y
        3, 7, 6, 2, // +y
        0, 4, 7, 3, // -x
        1, 2, 6, 5, // +x
    ];
    let offsets = vec![0, 4, 8, 12, 16, 20, 24];
    (positions, offsets, corners)
}
