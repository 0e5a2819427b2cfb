//! Allocation and accounting tests against the process runtime

mod common;

use common::{serial, RUNTIME_FIXTURE};
use hipmem::{
    allocate, clear_allocator, copy_device_to_host_sync, copy_host_to_device_sync, deallocate,
    tracked_allocate, tracked_deallocate, HipError, HipResult,
};
use proptest::prelude::*;

#[test]
#[serial]
fn test_allocate_deallocate_leaves_no_live_allocation() -> HipResult<()> {
    let leaks = RUNTIME_FIXTURE.leak_check();

    let ptr = allocate::<f32>(1000)?;
    assert_eq!(ptr.len(), 1000);
    assert_eq!(ptr.byte_size(), 4000);
    deallocate(ptr)?;

    leaks.assert_no_leak();
    Ok(())
}

#[cfg(not(feature = "rocm"))]
#[test]
#[serial]
fn test_allocate_deallocate_restores_live_bytes() -> HipResult<()> {
    let host = hipmem::backend::host_runtime();
    let before = host.live_bytes();

    let ptr = allocate::<u32>(4096)?;
    assert_eq!(host.live_bytes(), before + 16384);
    deallocate(ptr)?;

    assert_eq!(host.live_bytes(), before);
    Ok(())
}

#[test]
#[serial]
fn test_allocate_uses_runtime_primitive_once() -> HipResult<()> {
    let before = RUNTIME_FIXTURE.stats();
    let ptr = allocate::<u64>(16)?;
    let during = RUNTIME_FIXTURE.stats();
    deallocate(ptr)?;
    let after = RUNTIME_FIXTURE.stats();

    assert_eq!(during.malloc_calls, before.malloc_calls + 1);
    assert_eq!(during.bytes_allocated, before.bytes_allocated + 128);
    assert_eq!(after.free_calls, before.free_calls + 1);
    Ok(())
}

#[test]
#[serial]
fn test_tracked_allocations_accumulate_bytes() -> HipResult<()> {
    clear_allocator()?;
    let leaks = RUNTIME_FIXTURE.leak_check();
    let mut allocation = 0usize;

    let a = tracked_allocate::<f64>(10, &mut allocation)?;
    assert_eq!(allocation, 80);
    let b = tracked_allocate::<u8>(3, &mut allocation)?;
    assert_eq!(allocation, 83);

    tracked_deallocate(a, 10, &mut allocation)?;
    assert_eq!(allocation, 3);
    tracked_deallocate(b, 3, &mut allocation)?;
    assert_eq!(allocation, 0);

    leaks.assert_no_leak();
    Ok(())
}

#[test]
#[serial]
fn test_separate_counters_are_independent() -> HipResult<()> {
    clear_allocator()?;
    let mut weights = 0usize;
    let mut scratch = 0usize;

    let w = tracked_allocate::<f32>(256, &mut weights)?;
    let s = tracked_allocate::<f32>(64, &mut scratch)?;
    assert_eq!(weights, 1024);
    assert_eq!(scratch, 256);

    tracked_deallocate(w, 256, &mut weights)?;
    tracked_deallocate(s, 64, &mut scratch)?;
    assert_eq!((weights, scratch), (0, 0));
    Ok(())
}

#[test]
#[serial]
fn test_allocation_failure_names_the_call() {
    let mut allocation = 0usize;
    // Exceeds both real devices and the emulated capacity.
    let len = usize::MAX / 2;
    let err = tracked_allocate::<u8>(len, &mut allocation).unwrap_err();

    match &err {
        HipError::Runtime { call, file, line, .. } => {
            assert!(call.contains("malloc"), "call was {}", call);
            assert!(file.ends_with(".rs"));
            assert!(*line > 0);
        }
        other => panic!("expected runtime error, got {:?}", other),
    }
    assert!(err.is_runtime_failure());
    assert!(err.to_string().contains("failed in"));
    assert_eq!(allocation, 0);
}

#[test]
#[serial]
fn test_zero_sized_type_allocates_nothing() -> HipResult<()> {
    let before = RUNTIME_FIXTURE.stats();
    let mut allocation = 0usize;

    let ptr = tracked_allocate::<()>(1_000, &mut allocation)?;
    assert!(ptr.is_null());
    assert_eq!(ptr.len(), 1_000);
    assert_eq!(allocation, 0);
    tracked_deallocate(ptr, 1_000, &mut allocation)?;

    assert_eq!(RUNTIME_FIXTURE.stats().malloc_calls, before.malloc_calls);
    Ok(())
}

#[test]
#[serial]
fn test_handle_moves_across_threads() -> HipResult<()> {
    let mut ptr = allocate::<u32>(4)?;
    copy_host_to_device_sync(&[1, 2, 3, 4], &mut ptr, 4)?;

    let ptr = std::thread::spawn(move || -> HipResult<_> {
        let mut host = [0u32; 4];
        copy_device_to_host_sync(&ptr, &mut host, 4)?;
        assert_eq!(host, [1, 2, 3, 4]);
        Ok(ptr)
    })
    .join()
    .unwrap()?;

    deallocate(ptr)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    #[serial]
    fn prop_tracked_counter_is_conserved(lens in prop::collection::vec(0usize..4096, 1..16)) {
        clear_allocator().unwrap();
        let start = 12_345usize;
        let mut allocation = start;

        let mut live = Vec::new();
        for &len in &lens {
            live.push((tracked_allocate::<u32>(len, &mut allocation).unwrap(), len));
        }
        let expected: usize = lens.iter().map(|len| len * 4).sum();
        prop_assert_eq!(allocation, start + expected);

        // Release in reverse to mix up the order relative to allocation.
        while let Some((ptr, len)) = live.pop() {
            tracked_deallocate(ptr, len, &mut allocation).unwrap();
        }
        prop_assert_eq!(allocation, start);
    }
}
