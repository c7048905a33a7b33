//! Allocator microbenchmarks over the locked heap.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use segalloc::LockedHeap;
use std::hint::black_box;

static HEAP: LockedHeap = LockedHeap::new();

fn bench_alloc_release_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 256, 1024, 4096, 32768];
    let mut group = c.benchmark_group("alloc_release_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &sz| {
            b.iter(|| unsafe {
                let p = HEAP.allocate(black_box(sz)).expect("allocation failed");
                black_box(p.as_ptr());
                HEAP.release(p.as_ptr()).expect("release failed");
            });
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("churn");

    group.bench_function("128_mixed_lifo", |b| {
        let mut ptrs = Vec::with_capacity(128);
        b.iter(|| unsafe {
            for i in 0..128usize {
                let size = 16 + (i * 24) % 480;
                ptrs.push(HEAP.allocate(size).expect("allocation failed"));
            }
            while let Some(p) = ptrs.pop() {
                HEAP.release(p.as_ptr()).expect("release failed");
            }
        });
    });

    group.bench_function("128_mixed_fifo", |b| {
        let mut ptrs = Vec::with_capacity(128);
        b.iter(|| unsafe {
            for i in 0..128usize {
                let size = 16 + (i * 24) % 480;
                ptrs.push(HEAP.allocate(size).expect("allocation failed"));
            }
            for p in ptrs.drain(..) {
                HEAP.release(p.as_ptr()).expect("release failed");
            }
        });
    });

    group.finish();
}

fn bench_realloc_growth(c: &mut Criterion) {
    c.bench_function("realloc_growth_16_to_8192", |b| {
        b.iter(|| unsafe {
            let mut ptr = HEAP.allocate(16).expect("allocation failed").as_ptr();
            let mut size = 16;
            while size < 8192 {
                size *= 2;
                ptr = HEAP
                    .reallocate(ptr, size)
                    .expect("reallocation failed")
                    .expect("non-zero size")
                    .as_ptr();
            }
            HEAP.release(ptr).expect("release failed");
        });
    });
}

fn bench_zero_allocate(c: &mut Criterion) {
    c.bench_function("zero_allocate_64x16", |b| {
        b.iter(|| unsafe {
            let p = HEAP.zero_allocate(black_box(64), 16).expect("allocation failed");
            HEAP.release(p.as_ptr()).expect("release failed");
        });
    });
}

criterion_group!(
    benches,
    bench_alloc_release_cycle,
    bench_churn,
    bench_realloc_growth,
    bench_zero_allocate
);
criterion_main!(benches);
