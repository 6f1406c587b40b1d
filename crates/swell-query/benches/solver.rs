//! Solver throughput benchmarks
//!
//! Measures:
//! - Direct vs iterative solve cost per query
//! - Iterative solve cost as the active grid count grows
//! - Raw bilinear sampling cost

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use swell_query::{
    DISPLACEMENT_CHANNELS, GridScaling, InterpolatedGrid, MAX_GRIDS, QueryDescriptor, QueryMode,
    solve,
};

const GRID_SIZE: usize = 128;
const WORLD_SIZES: [f32; MAX_GRIDS] = [512.0, 128.0, 32.0, 8.0];

/// Gentle rolling wave: amplitude well inside the solver's contraction range
fn wave_grid(amplitude: f32, phase: f32) -> InterpolatedGrid {
    let mut grid = InterpolatedGrid::new(GRID_SIZE, GRID_SIZE, DISPLACEMENT_CHANNELS)
        .expect("valid grid")
        .with_half_pixel_offset(true);
    for y in 0..GRID_SIZE {
        for x in 0..GRID_SIZE {
            let u = (x as f32 + 0.5) / GRID_SIZE as f32 * std::f32::consts::TAU;
            let v = (y as f32 + 0.5) / GRID_SIZE as f32 * std::f32::consts::TAU;
            grid.set(x, y, 0, amplitude * (u + phase).sin());
            grid.set(x, y, 1, amplitude * (u + v + phase).cos());
            grid.set(x, y, 2, amplitude * (v - phase).sin());
        }
    }
    grid
}

fn grids() -> Vec<InterpolatedGrid> {
    WORLD_SIZES
        .iter()
        .enumerate()
        .map(|(i, size)| wave_grid(size * 0.02, i as f32))
        .collect()
}

fn queries(count: usize, mode: QueryMode) -> Vec<QueryDescriptor> {
    (0..count)
        .map(|i| {
            let t = i as f32 * 0.618;
            QueryDescriptor::new(t.sin() * 300.0, t.cos() * 300.0).with_mode(mode)
        })
        .collect()
}

/// Benchmark direct vs iterative solves over one batch
fn bench_solve_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_modes");
    let grids = grids();
    let batch = 1_000;
    group.throughput(Throughput::Elements(batch as u64));

    for (name, mode) in [
        ("direct", QueryMode::Displacement),
        ("iterative", QueryMode::Position),
    ] {
        let mut scaling = GridScaling::new(MAX_GRIDS, WORLD_SIZES, [1.0; MAX_GRIDS], 1.0);
        let mut descriptors = queries(batch, mode);
        group.bench_function(name, |b| {
            b.iter(|| {
                for descriptor in descriptors.iter_mut() {
                    solve(black_box(&grids), &mut scaling, descriptor);
                }
            })
        });
    }

    group.finish();
}

/// Benchmark iterative solves with 2, 3 and 4 active grids
fn bench_active_grids(c: &mut Criterion) {
    let mut group = c.benchmark_group("active_grids");
    let grids = grids();
    let batch = 1_000;
    group.throughput(Throughput::Elements(batch as u64));

    for active in 2..=MAX_GRIDS {
        let mut scaling = GridScaling::new(active, WORLD_SIZES, [1.0; MAX_GRIDS], 1.0);
        let mut descriptors = queries(batch, QueryMode::Position);
        group.bench_with_input(BenchmarkId::from_parameter(active), &active, |b, _| {
            b.iter(|| {
                for descriptor in descriptors.iter_mut() {
                    solve(black_box(&grids), &mut scaling, descriptor);
                }
            })
        });
    }

    group.finish();
}

/// Benchmark a single bilinear sample
fn bench_bilinear(c: &mut Criterion) {
    let grid = wave_grid(1.0, 0.0);
    let mut out = [0.0; DISPLACEMENT_CHANNELS];
    c.bench_function("bilinear_sample", |b| {
        b.iter(|| {
            grid.sample(black_box(0.3712), black_box(-1.284), &mut out);
            out
        })
    });
}

criterion_group!(benches, bench_solve_modes, bench_active_grids, bench_bilinear);
criterion_main!(benches);
