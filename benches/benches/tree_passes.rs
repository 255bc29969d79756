// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use glam::Vec3;
use pbvh::{BuildSettings, MeshSource, NodeFlags, RaycastOptions, Tree};

/// `n` by `n` quads on a gentle wave so boxes have some depth.
fn wave_grid(n: u32) -> (Vec<Vec3>, Vec<u32>, Vec<u32>) {
    let mut positions = Vec::with_capacity(((n + 1) * (n + 1)) as usize);
    for y in 0..=n {
        for x in 0..=n {
            let (fx, fy) = (x as f32, y as f32);
            positions.push(Vec3::new(fx, fy, (fx * 0.1).sin() * (fy * 0.1).cos()));
        }
    }
    let row = n + 1;
    let mut offsets = vec![0];
    let mut corners = Vec::with_capacity((n * n * 4) as usize);
    for y in 0..n {
        for x in 0..n {
            let v = y * row + x;
            corners.extend_from_slice(&[v, v + 1, v + 1 + row, v + row]);
            offsets.push(corners.len() as u32);
        }
    }
    (positions, offsets, corners)
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for &n in &[64_u32, 256] {
        let (p, o, cv) = wave_grid(n);
        let src = MeshSource::new(&p, &o, &cv).unwrap();
        group.throughput(Throughput::Elements(u64::from(n * n * 2)));
        group.bench_function(format!("mesh_n{}", n), |b| {
            b.iter(|| black_box(Tree::build(&src, BuildSettings::default().with_leaf_limit(256))));
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");
    let n = 256;
    let (p, o, cv) = wave_grid(n);
    let src = MeshSource::new(&p, &o, &cv).unwrap();
    let mut tree = Tree::build(&src, BuildSettings::default().with_leaf_limit(256));
    let region = pbvh::Aabb3::new(Vec3::new(10.0, 10.0, -2.0), Vec3::new(40.0, 40.0, 2.0));

    group.bench_function("gather_box", |b| {
        b.iter(|| {
            black_box(tree.search_gather(|node| !node.bounds().intersect(&region).is_empty()))
        });
    });
    group.bench_function("raycast_down", |b| {
        let opts = RaycastOptions::default();
        b.iter(|| black_box(tree.raycast(&src, Vec3::new(100.5, 80.25, 5.0), -Vec3::Z, &opts)));
    });
    group.bench_function("nearest_to_ray", |b| {
        let opts = RaycastOptions::default();
        b.iter(|| {
            black_box(tree.find_nearest_to_ray(&src, Vec3::new(-5.0, 30.5, 3.0), Vec3::X, &opts))
        });
    });
    group.finish();
}

fn bench_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("updates");
    let n = 256;
    let (p, o, cv) = wave_grid(n);
    let src = MeshSource::new(&p, &o, &cv).unwrap();
    let base = Tree::build(&src, BuildSettings::default().with_leaf_limit(256));
    let leaves = base.search_gather(|_| true);
    drop(base);

    group.bench_function("normals_all_leaves", |b| {
        b.iter_batched(
            || Tree::build(&src, BuildSettings::default().with_leaf_limit(256)),
            |mut tree| {
                tree.update_normals(&src);
                tree
            },
            BatchSize::LargeInput,
        );
    });
    group.bench_function("bounds_quarter_leaves", |b| {
        b.iter_batched(
            || {
                let mut tree = Tree::build(&src, BuildSettings::default().with_leaf_limit(256));
                for &leaf in leaves.iter().step_by(4) {
                    tree.node_mut(leaf).mark_update();
                }
                tree
            },
            |mut tree| {
                tree.update_bounds(&src, NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
                tree
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_queries, bench_updates);
criterion_main!(benches);
