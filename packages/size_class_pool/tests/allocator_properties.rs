//! Observable guarantees of `PoolAllocator`, exercised through the public API only.
#![allow(
    missing_docs,
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code"
)]

use std::collections::HashSet;
use std::num::NonZero;

use size_class_pool::{Error, Handle, PoolAllocator};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Dummy {
    count: u64,
    value: f64,
}

fn allocator(capacity: usize) -> PoolAllocator {
    PoolAllocator::new(NonZero::new(capacity).unwrap())
}

fn address<T>(handle: &Handle<T>) -> usize {
    handle.ptr().addr().get()
}

#[test]
fn conservation_holds_through_mixed_operations() {
    let mut allocator = allocator(16);
    let mut live = Vec::new();

    for round in 0..40_usize {
        if round % 3 == 2 {
            if let Some(mut handle) = live.pop() {
                allocator.release::<Dummy>(&mut handle).unwrap();
            }
        } else if let Ok(handle) = allocator.allocate::<Dummy>() {
            live.push(handle);
        }

        assert_eq!(allocator.len_of::<Dummy>(), live.len());
        assert!(allocator.len_of::<Dummy>() <= allocator.capacity_of::<Dummy>());
    }

    for mut handle in live {
        allocator.release(&mut handle).unwrap();
    }

    assert!(allocator.is_empty());
}

#[test]
fn lifo_reuse_order() {
    let mut allocator = allocator(5);

    let mut h0 = allocator.allocate::<Dummy>().unwrap();
    let mut h1 = allocator.allocate::<Dummy>().unwrap();
    let mut h2 = allocator.allocate::<Dummy>().unwrap();

    let (a0, a1, a2) = (address(&h0), address(&h1), address(&h2));

    allocator.release(&mut h0).unwrap();
    allocator.release(&mut h1).unwrap();
    allocator.release(&mut h2).unwrap();

    assert_eq!(address(&allocator.allocate::<Dummy>().unwrap()), a2);
    assert_eq!(address(&allocator.allocate::<Dummy>().unwrap()), a1);
    assert_eq!(address(&allocator.allocate::<Dummy>().unwrap()), a0);
}

#[test]
fn exhaustion_boundary() {
    let mut allocator = allocator(100);
    let mut addresses = HashSet::new();

    for call in 1..=102 {
        let result = allocator.allocate::<Dummy>();

        if call <= 100 {
            let handle = result.unwrap();
            assert!(addresses.insert(address(&handle)), "call {call} reused an address");
        } else {
            assert_eq!(result, Err(Error::Exhausted { capacity: 100 }));
        }
    }

    assert_eq!(addresses.len(), 100);
    assert_eq!(allocator.len_of::<Dummy>(), 100);
}

#[test]
fn double_free_is_safe() {
    let mut allocator = allocator(4);

    let mut other = allocator.allocate::<Dummy>().unwrap();
    // SAFETY: The slot is allocated to us and sized for a Dummy.
    unsafe {
        other.ptr().write(Dummy {
            count: 9,
            value: 1.5,
        });
    }

    let mut h = allocator.allocate::<Dummy>().unwrap();
    let mut copy = h;

    allocator.release(&mut h).unwrap();

    assert!(matches!(
        allocator.release(&mut copy),
        Err(Error::DoubleFree { .. })
    ));

    // The other slot is still allocated and intact.
    assert_eq!(allocator.len_of::<Dummy>(), 1);
    assert_eq!(
        unsafe { other.ptr().read() },
        Dummy {
            count: 9,
            value: 1.5
        }
    );

    allocator.release(&mut other).unwrap();
}

#[test]
fn released_handle_is_emptied() {
    let mut allocator = allocator(4);

    let mut h = allocator.allocate::<Dummy>().unwrap();
    allocator.release(&mut h).unwrap();

    assert!(h.is_empty());
    assert!(matches!(
        allocator.release(&mut h),
        Err(Error::InvalidArgument { .. })
    ));
}

#[test]
fn release_after_reuse_does_not_free_live_slot() {
    let mut allocator = allocator(4);

    let mut h0 = allocator.allocate::<Dummy>().unwrap();
    let mut stale_h0 = h0;

    allocator.release(&mut h0).unwrap();

    let mut h2 = allocator.allocate::<Dummy>().unwrap();
    assert_eq!(address(&h2), address(&stale_h0));

    // SAFETY: h2 owns the slot.
    unsafe {
        h2.ptr().write(Dummy {
            count: 2,
            value: 2.0,
        });
    }

    assert!(matches!(
        allocator.release(&mut stale_h0),
        Err(Error::DoubleFree { .. })
    ));

    // h2's slot is still allocated: the next allocation gets a different slot.
    assert_eq!(allocator.len_of::<Dummy>(), 1);
    let next = allocator.allocate::<Dummy>().unwrap();
    assert_ne!(address(&next), address(&h2));

    allocator.release(&mut h2).unwrap();
}

#[test]
fn round_trip_restores_full_capacity() {
    const CAPACITY: usize = 64;

    let mut allocator = allocator(CAPACITY);

    let mut handles = (0..CAPACITY)
        .map(|_| allocator.allocate::<Dummy>().unwrap())
        .collect::<Vec<_>>();

    let original = handles.iter().map(address).collect::<HashSet<_>>();

    // Release in a fixed but mixed order.
    for index in (0..CAPACITY).filter(|i| i % 2 == 1) {
        allocator.release(&mut handles[index]).unwrap();
    }
    for index in (0..CAPACITY).filter(|i| i % 2 == 0).rev() {
        allocator.release(&mut handles[index]).unwrap();
    }

    assert!(allocator.is_empty());

    // The free list covers every slot exactly once.
    let reallocated = (0..CAPACITY)
        .map(|_| address(&allocator.allocate::<Dummy>().unwrap()))
        .collect::<HashSet<_>>();

    assert_eq!(reallocated, original);
    assert!(matches!(
        allocator.allocate::<Dummy>(),
        Err(Error::Exhausted { .. })
    ));
}

#[test]
fn different_sizes_are_isolated() {
    let mut allocator = allocator(8);

    let small = (0..8)
        .map(|_| allocator.allocate::<u64>().unwrap())
        .collect::<Vec<_>>();
    let large = (0..8)
        .map(|_| allocator.allocate::<[u64; 4]>().unwrap())
        .collect::<Vec<_>>();

    // No byte of any small slot lies inside any large slot.
    for s in &small {
        let s_start = address(s);
        let s_end = s_start + size_of::<u64>();

        for l in &large {
            let l_start = address(l);
            let l_end = l_start + size_of::<[u64; 4]>();

            assert!(s_end <= l_start || l_end <= s_start);
        }
    }

    // Exhausting one size does not affect the other.
    assert!(matches!(
        allocator.allocate::<u64>(),
        Err(Error::Exhausted { .. })
    ));

    let mut large = large;
    allocator.release(&mut large[0]).unwrap();

    assert!(allocator.allocate::<[u64; 4]>().is_ok());
    assert!(matches!(
        allocator.allocate::<u64>(),
        Err(Error::Exhausted { .. })
    ));
}

#[test]
fn same_size_types_do_not_share_a_pool() {
    let mut allocator = allocator(1);

    let _a = allocator.allocate::<u64>().unwrap();

    // i64 has the same size as u64 but gets its own pool.
    assert!(allocator.allocate::<i64>().is_ok());
    assert_eq!(allocator.pool_count(), 2);
}

#[test]
fn values_survive_neighbouring_operations() {
    let mut allocator = allocator(32);

    let mut handles = (0..32_u64)
        .map(|i| {
            let handle = allocator.allocate::<Dummy>().unwrap();
            // SAFETY: The slot is allocated to us and sized for a Dummy.
            unsafe {
                handle.ptr().write(Dummy {
                    count: i,
                    value: 0.5,
                });
            }
            handle
        })
        .collect::<Vec<_>>();

    for handle in handles.iter_mut().step_by(3) {
        allocator.release(handle).unwrap();
    }

    for (i, handle) in (0..32_u64).zip(&handles) {
        if !handle.is_empty() {
            // SAFETY: Non-empty handles still own their initialized slots.
            assert_eq!(unsafe { handle.ptr().read() }.count, i);
        }
    }
}
