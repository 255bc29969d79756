// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree cache.
//!
//! Keep trees per object across frames and watch them get dropped when the mesh layout
//! changes or a shared dynamic-topology mesh goes away.
//!
//! Run:
//! - `RUST_LOG=debug cargo run -p pbvh_demos --example tree_cache`

use std::sync::Arc;

use glam::Vec3;
use pbvh::{DynTopoMesh, DynTopoSource, MeshSource, Tree, TreeCache};

fn main() {
    env_logger::init();

    let positions = [Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y];
    let quad = MeshSource::new(&positions, &[0, 4], &[0, 1, 2, 3]).unwrap();

    let mesh = Arc::new(
        DynTopoMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            vec![[0, 1, 2], [1, 3, 2]],
        )
        .unwrap(),
    );
    let dyntopo = DynTopoSource::new(Arc::clone(&mesh));

    let mut cache = TreeCache::new();
    let quad_key = cache.key_for(1);
    let dyn_key = cache.key_for(2);
    cache.put(quad_key, Tree::from_source(&quad), &quad);
    cache.put(dyn_key, Tree::from_source(&dyntopo), &dyntopo);
    println!("cached {} trees", cache.len());

    // Same source: reused.
    assert!(cache.get_or_invalidate(&quad_key, &quad).is_some());

    // A mask layer appeared: the layout changed, the tree is dropped.
    let mask = [0.0; 4];
    let masked = MeshSource::new(&positions, &[0, 4], &[0, 1, 2, 3])
        .unwrap()
        .with_mask(&mask)
        .unwrap();
    assert!(cache.get_or_invalidate(&quad_key, &masked).is_none());

    drop(dyntopo);
    let released = cache.release_mesh(&mesh);
    println!("released {released} trees, mesh holders left: {}", Arc::strong_count(&mesh));

    cache.clear_all(None);
    cache.shutdown();
}
