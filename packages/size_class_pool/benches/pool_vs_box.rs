//! Compares pooled allocation against the global allocator via `Box`.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::num::NonZero;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use size_class_pool::{Handle, PoolAllocator};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[derive(Clone, Copy, Default)]
struct Dummy {
    count: u64,
    value: f64,
}

const BATCH_SIZE: usize = 1000;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_vs_box");

    group.bench_function("pool_allocate_release_batch", |b| {
        b.iter_custom(|iters| {
            let mut allocator = PoolAllocator::builder()
                .pool_capacity(NonZero::new(BATCH_SIZE).unwrap())
                .preallocate::<Dummy>()
                .build()
                .unwrap();

            let mut handles = vec![Handle::<Dummy>::empty(); BATCH_SIZE];

            let start = Instant::now();

            for _ in 0..iters {
                for handle in &mut handles {
                    *handle = allocator.allocate::<Dummy>().unwrap();
                }

                for handle in &mut handles {
                    allocator.release(black_box(handle)).unwrap();
                }
            }

            start.elapsed()
        });
    });

    group.bench_function("box_allocate_drop_batch", |b| {
        b.iter_custom(|iters| {
            let mut boxes = Vec::with_capacity(BATCH_SIZE);

            let start = Instant::now();

            for _ in 0..iters {
                for _ in 0..BATCH_SIZE {
                    boxes.push(black_box(Box::new(Dummy::default())));
                }

                boxes.clear();
            }

            start.elapsed()
        });
    });

    group.bench_function("pool_allocate_release_one", |b| {
        b.iter_custom(|iters| {
            let mut allocator = PoolAllocator::new(NonZero::new(1).unwrap());

            let start = Instant::now();

            for _ in 0..iters {
                let mut handle = black_box(allocator.allocate::<Dummy>().unwrap());
                allocator.release(&mut handle).unwrap();
            }

            start.elapsed()
        });
    });

    group.finish();
}
