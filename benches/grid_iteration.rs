//! Benchmarks for structured grid traversal and adjacency queries.
//!
//! Run with: cargo bench --bench grid_iteration

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use wrfdc::StructuredGrid;

fn bench_cell_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_iteration");

    for dims in [vec![100, 100], vec![425, 300], vec![100, 100, 40]] {
        let grid = StructuredGrid::new(&dims).unwrap();
        let label = dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");

        group.throughput(Throughput::Elements(grid.cell_count() as u64));
        group.bench_with_input(BenchmarkId::new("cells", &label), &grid, |b, grid| {
            b.iter(|| grid.cell_begin().count());
        });
        group.bench_with_input(BenchmarkId::new("cell_nodes", &label), &grid, |b, grid| {
            b.iter(|| {
                grid.cell_begin()
                    .filter_map(|cell| grid.get_cell_nodes(black_box(&cell)))
                    .count()
            });
        });
    }

    group.finish();
}

fn bench_node_cells(c: &mut Criterion) {
    let grid = StructuredGrid::new(&[425, 300]).unwrap();

    c.bench_function("node_cells_425x300", |b| {
        b.iter(|| {
            grid.node_begin()
                .filter_map(|node| grid.get_node_cells(black_box(&node)).ok().flatten())
                .count()
        });
    });
}

fn bench_clamp_coord(c: &mut Criterion) {
    let grid = StructuredGrid::new(&[361, 181])
        .unwrap()
        .with_periodic(&[true, false])
        .with_extents(&[0.0, -90.0], &[360.0, 90.0]);
    let coords: Vec<[f64; 2]> = (0..10_000)
        .map(|i| [i as f64 * 0.37 - 1800.0, (i % 180) as f64 - 90.0])
        .collect();

    c.bench_function("clamp_coord_periodic", |b| {
        b.iter(|| {
            coords
                .iter()
                .filter_map(|c| grid.clamp_coord(black_box(c)).ok())
                .count()
        });
    });
}

criterion_group!(
    benches,
    bench_cell_iteration,
    bench_node_cells,
    bench_clamp_coord,
);
criterion_main!(benches);
