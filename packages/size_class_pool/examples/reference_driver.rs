//! Drives a `PoolAllocator` through exhaustion, random release, reallocation and double
//! release, then times a batch of pooled allocations against `Box`.
//!
//! Run with `RUST_LOG=debug` to see the allocator's own diagnostics.

use std::num::NonZero;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use size_class_pool::{Handle, PoolAllocator};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default)]
struct Dummy {
    count: u64,
    value: f64,
}

const POOL_SIZE: usize = 100;
const TIMED_POOL_SIZE: usize = 1000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut allocator = PoolAllocator::new(NonZero::new(POOL_SIZE).unwrap());
    let mut handles = vec![Handle::<Dummy>::empty(); TIMED_POOL_SIZE];

    // Allocate past the limit. The last two requests find the pool exhausted.
    for (index, handle) in handles.iter_mut().take(POOL_SIZE + 2).enumerate() {
        match allocator.allocate::<Dummy>() {
            Ok(allocated) => {
                // SAFETY: The slot is freshly allocated to us and sized for a Dummy.
                unsafe {
                    allocated.ptr().write(Dummy {
                        count: index as u64,
                        value: 0.5,
                    });
                }
                *handle = allocated;
            }
            Err(error) => println!("allocation {index}: {error}"),
        }
    }

    // Release a random fifth of the slots. Picking an index twice reports a bad release.
    for _ in 0..POOL_SIZE / 5 {
        let index = rng.random_range(0..POOL_SIZE);

        if let Err(error) = allocator.release(&mut handles[index]) {
            println!("release of {index}: {error}");
        }
    }

    // Reallocate into fresh handle positions; at most one request runs out of slots.
    for iteration in 0..21 {
        let index = POOL_SIZE + iteration;

        match allocator.allocate::<Dummy>() {
            Ok(allocated) => handles[index] = allocated,
            Err(error) => println!("reallocation {iteration}: {error}"),
        }
    }

    // Try some double releases.
    let picks: [usize; 2] = std::array::from_fn(|_| rng.random_range(0..POOL_SIZE));

    let mut d0 = handles[picks[0]];
    let mut d1 = handles[picks[1]];

    report("release d0", allocator.release(&mut d0));
    report("release d0 again", allocator.release(&mut d0));
    report("release handle 1", allocator.release(&mut handles[picks[1]]));
    report("release stale handle 0", allocator.release(&mut handles[picks[0]]));

    report("allocate d0", allocator.allocate::<Dummy>().map(|_| ()));

    report("release emptied handle 1", allocator.release(&mut handles[picks[1]]));
    report("release stale copy d1", allocator.release(&mut d1));

    println!(
        "{} of {} slots allocated after the scenario",
        allocator.len_of::<Dummy>(),
        allocator.capacity_of::<Dummy>()
    );

    drop(allocator);

    let mut allocator = PoolAllocator::builder()
        .pool_capacity(NonZero::new(TIMED_POOL_SIZE).unwrap())
        .preallocate::<Dummy>()
        .build()
        .expect("a pool of 1000 small slots fits in memory");

    let start = Instant::now();

    for handle in &mut handles {
        *handle = allocator
            .allocate::<Dummy>()
            .expect("pool has room for exactly this many slots");
    }

    for handle in &mut handles {
        allocator
            .release(handle)
            .expect("every handle was just allocated");
    }

    let pooled = start.elapsed();

    let start = Instant::now();

    let boxes = (0..TIMED_POOL_SIZE)
        .map(|_| Box::new(Dummy::default()))
        .collect::<Vec<_>>();
    drop(boxes);

    let boxed = start.elapsed();

    println!("time taken with pool allocator = {pooled:?}");
    println!("time taken with Box = {boxed:?}");
}

fn report(what: &str, result: size_class_pool::Result<()>) {
    match result {
        Ok(()) => println!("{what}: ok"),
        Err(error) => println!("{what}: {error}"),
    }
}
