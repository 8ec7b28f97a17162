use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use struct_mv::prelude::*;

fn vector(n: i64) -> StructVector {
    let domain = IndexBox::new(&[0, 0, 0], &[n - 1, n - 1, n - 1]).unwrap();
    let boxes = domain.split_slabs(4).into_iter().map(|b| (0, b));
    let grid = Arc::new(StructGrid::from_boxes(3, 0, boxes).unwrap());
    let mut v = StructVector::new(grid);
    v.initialize().unwrap();
    v
}

fn bench_box_values(c: &mut Criterion) {
    let queue = WorkQueue::new(NUM_THREADS).unwrap();
    let mut group = c.benchmark_group("set_box_values");
    for &n in &[16i64, 32, 64] {
        let mut v = vector(n);
        let target = IndexBox::new(&[0, 0, 0], &[n - 1, n - 1, n - 1]).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let vals: Vec<f64> = (0..target.volume()).map(|_| rng.r#gen()).collect();

        group.bench_with_input(BenchmarkId::new("serial", n), &n, |b, _| {
            b.iter(|| v.set_box_values(&target, &vals).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("threaded", n), &n, |b, _| {
            b.iter(|| v.set_box_values_threaded(&queue, &target, &vals).unwrap())
        });
    }
    group.finish();
}

fn bench_migrate(c: &mut Criterion) {
    let n = 32i64;
    let from = vector(n);
    let domain = IndexBox::new(&[0, 0, 0], &[n - 1, n - 1, n - 1]).unwrap();
    let boxes = domain.split_slabs(7).into_iter().map(|b| (0, b));
    let grid = Arc::new(StructGrid::from_boxes(3, 0, boxes).unwrap());
    let mut to = StructVector::new(grid);
    to.initialize().unwrap();

    c.bench_function("build_plan_32", |b| {
        b.iter(|| CommPlan::build(&from, &to).unwrap())
    });
    let plan = CommPlan::build(&from, &to).unwrap();
    c.bench_function("migrate_32", |b| {
        b.iter(|| migrate(&plan, &from, &mut to, &NoComm, CommTag::new(1)).unwrap())
    });
}

criterion_group!(benches, bench_box_values, bench_migrate);
criterion_main!(benches);
