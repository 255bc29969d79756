// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sculpt stroke.
//!
//! Build a tree over a grid, pull up the vertices under a brush, refresh only the touched
//! leaves, and pick against both the live and the pre-stroke surface.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p pbvh_demos --example sculpt_stroke`

use glam::Vec3;
use pbvh::{BuildSettings, MeshSource, NodeFlags, RaycastOptions, Tree};

const N: u32 = 32;

fn grid() -> (Vec<Vec3>, Vec<u32>, Vec<u32>) {
    let mut positions = Vec::new();
    for y in 0..=N {
        for x in 0..=N {
            positions.push(Vec3::new(x as f32, y as f32, 0.0));
        }
    }
    let row = N + 1;
    let mut offsets = vec![0];
    let mut corners = Vec::new();
    for y in 0..N {
        for x in 0..N {
            let v = y * row + x;
            corners.extend_from_slice(&[v, v + 1, v + 1 + row, v + row]);
            offsets.push(corners.len() as u32);
        }
    }
    (positions, offsets, corners)
}

fn main() {
    env_logger::init();

    let (mut positions, offsets, corners) = grid();
    let src = MeshSource::new(&positions, &offsets, &corners).unwrap();
    let mut tree = Tree::build(&src, BuildSettings::default().with_leaf_limit(64));
    tree.update_normals(&src);
    println!("{} nodes, {} leaves", tree.nodes().len(), tree.leaf_count());

    // Leaves under the brush.
    let center = Vec3::new(16.0, 16.0, 0.0);
    let radius = 4.0;
    let brush = pbvh::Aabb3::new(center - Vec3::splat(radius), center + Vec3::splat(radius));
    let touched = tree.search_gather(|node| !node.bounds().intersect(&brush).is_empty());
    log::info!("brush touches {} leaves", touched.len());

    // Snapshot before moving anything.
    tree.begin_stroke(1);
    tree.capture_original(&src, &touched);

    for p in &mut positions {
        let d = p.distance(center);
        if d < radius {
            p.z += (1.0 - d / radius) * 2.0;
        }
    }
    let src = MeshSource::new(&positions, &offsets, &corners).unwrap();
    for &leaf in &touched {
        tree.node_mut(leaf).mark_update();
    }
    tree.update_bounds(&src, NodeFlags::UPDATE_BB);
    tree.update_normals(&src);
    println!("redraw region: {:?}", tree.redraw_bounds());
    tree.update_bounds(&src, NodeFlags::UPDATE_REDRAW);

    let origin = Vec3::new(16.0, 16.0, 10.0);
    let live = tree.raycast(&src, origin, -Vec3::Z, &RaycastOptions::default());
    let original = tree.raycast(
        &src,
        origin,
        -Vec3::Z,
        &RaycastOptions {
            use_original: true,
            stroke_id: Some(1),
            ..RaycastOptions::default()
        },
    );
    println!("live depth {:.3}, original depth {:.3}", live.depth, original.depth);
    assert!(live.depth < original.depth, "the brush pulled the surface up");
    tree.end_stroke();
}
