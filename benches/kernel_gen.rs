//! Benchmarks for kernel source generation and CPU-side helpers.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;

use plume::boundary::{Boundary, BoundaryShape};
use plume::forcefield;
use plume::kernels;
use plume::materials::MaterialTable;
use plume::shader_utils;

fn bench_kernel_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_gen");
    let materials = MaterialTable::default();
    let boundary = Boundary::with_shape(Vec3::splat(64.0), BoundaryShape::Box);

    group.bench_function("all_passes", |b| {
        b.iter(|| black_box(kernels::generate(&materials, &boundary)))
    });

    group.bench_function("material_stress", |b| {
        b.iter(|| black_box(materials.stress_wgsl()))
    });

    group.bench_function("force_field_evaluator", |b| {
        b.iter(|| black_box(forcefield::evaluator_wgsl()))
    });

    group.bench_function("collision_block", |b| {
        b.iter(|| black_box(boundary.emit_collision("pos", "vel", "sim.dt")))
    });

    group.finish();
}

fn bench_cpu_helpers(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_helpers");

    group.bench_function("tri_noise3d_vec", |b| {
        let p = Vec3::new(12.3, 4.5, 6.7);
        b.iter(|| black_box(shader_utils::tri_noise3d_vec(black_box(p), 1.0, 0.5)))
    });

    group.bench_function("bspline_weights", |b| {
        let d = Vec3::new(0.2, -0.4, 0.1);
        b.iter(|| black_box(kernels::bspline_weights(black_box(d))))
    });

    group.bench_function("curl_noise", |b| {
        let p = Vec3::new(3.0, 1.0, 2.0);
        b.iter(|| black_box(plume::forcefield::curl_noise(black_box(p), 1.0, 0.3)))
    });

    group.finish();
}

criterion_group!(benches, bench_kernel_generation, bench_cpu_helpers);
criterion_main!(benches);
