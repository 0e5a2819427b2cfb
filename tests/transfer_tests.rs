//! Host/device copy and fill tests

mod common;

use common::{pattern_i32, serial, RUNTIME_FIXTURE};
use hipmem::backend::RuntimeStatus;
use hipmem::{
    allocate, copy_device_to_host, copy_device_to_host_sync, copy_host_to_device,
    copy_host_to_device_sync, deallocate, fill_bytes, fill_bytes_sync, zero_fill, zero_fill_sync,
    HipError, HipResult, HipStream, Stream,
};
use proptest::prelude::*;

#[test]
#[serial]
fn test_1024_i32_zero_fill_then_round_trip() -> HipResult<()> {
    let leaks = RUNTIME_FIXTURE.leak_check();
    let mut dev = allocate::<i32>(1024)?;

    zero_fill_sync(&mut dev, 1024)?;
    let mut dst = vec![-1i32; 1024];
    copy_device_to_host_sync(&dev, &mut dst, 1024)?;
    assert!(dst.iter().all(|&v| v == 0));

    let src: Vec<i32> = (0..1024).collect();
    copy_host_to_device_sync(&src, &mut dev, 1024)?;
    copy_device_to_host_sync(&dev, &mut dst, 1024)?;
    deallocate(dev)?;

    assert_eq!(dst, src);
    leaks.assert_no_leak();
    Ok(())
}

#[test]
#[serial]
fn test_pattern_round_trip_sync() -> HipResult<()> {
    let src = pattern_i32(1000, 7);
    let mut dev = allocate::<i32>(1000)?;
    copy_host_to_device_sync(&src, &mut dev, 1000)?;
    let mut dst = vec![0i32; 1000];
    copy_device_to_host_sync(&dev, &mut dst, 1000)?;
    deallocate(dev)?;
    assert_eq!(dst, src);
    Ok(())
}

#[test]
#[serial]
fn test_zero_fill_sync_overwrites_previous_contents() -> HipResult<()> {
    let mut dev = allocate::<f32>(64)?;
    copy_host_to_device_sync(&[1.5f32; 64], &mut dev, 64)?;
    zero_fill_sync(&mut dev, 64)?;

    let mut host = [9.0f32; 64];
    copy_device_to_host_sync(&dev, &mut host, 64)?;
    deallocate(dev)?;

    assert!(host.iter().all(|&v| v == 0.0));
    Ok(())
}

#[test]
#[serial]
fn test_fill_bytes_with_all_ones() -> HipResult<()> {
    let mut dev = allocate::<u16>(8)?;
    fill_bytes_sync(&mut dev, 0xFF, 8)?;

    let mut host = [0u16; 8];
    copy_device_to_host_sync(&dev, &mut host, 8)?;
    deallocate(dev)?;

    assert_eq!(host, [u16::MAX; 8]);
    Ok(())
}

#[test]
#[serial]
fn test_stream_ordered_upload_fill_download() -> HipResult<()> {
    let stream = HipStream::new()?;
    let src = pattern_i32(256, -3);
    let mut dst = vec![0i32; 256];
    let mut dev = allocate::<i32>(256)?;

    // SAFETY: `src` and `dst` outlive the synchronize below and are not touched
    // until it returns.
    unsafe {
        copy_host_to_device(&src, &mut dev, 256, stream.token())?;
        copy_device_to_host(&dev, &mut dst, 256, stream.token())?;
    }
    stream.synchronize()?;
    assert_eq!(dst, src);

    zero_fill(&mut dev, 128, stream.token())?;
    // SAFETY: as above.
    unsafe { copy_device_to_host(&dev, &mut dst, 256, stream.token())? };
    stream.synchronize()?;

    assert!(dst[..128].iter().all(|&v| v == 0));
    assert_eq!(&dst[128..], &src[128..]);
    deallocate(dev)
}

#[test]
#[serial]
fn test_default_stream_async_fill() -> HipResult<()> {
    let rt = RUNTIME_FIXTURE.runtime();
    let mut dev = allocate::<u8>(32)?;
    fill_bytes(&mut dev, 0x5A, 32, Stream::DEFAULT)?;
    assert!(rt.stream_synchronize(Stream::DEFAULT).is_ok());

    let mut host = [0u8; 32];
    copy_device_to_host_sync(&dev, &mut host, 32)?;
    deallocate(dev)?;
    assert_eq!(host, [0x5A; 32]);
    Ok(())
}

#[cfg(not(feature = "rocm"))]
#[test]
#[serial]
fn test_destroyed_stream_is_reported_as_runtime_error() -> HipResult<()> {
    let stale = {
        let stream = HipStream::new()?;
        stream.token()
    };
    let mut dev = allocate::<u32>(4)?;

    let err = zero_fill(&mut dev, 4, stale).unwrap_err();
    assert!(err.is_runtime_failure());
    assert_eq!(err.code(), Some(RuntimeStatus::INVALID_HANDLE.code()));
    assert!(err.to_string().contains("invalid resource handle"), "{}", err);

    let src = [1u32, 2, 3, 4];
    // SAFETY: the call is rejected before anything is enqueued.
    let err = unsafe { copy_host_to_device(&src, &mut dev, 4, stale) }.unwrap_err();
    assert!(matches!(err, HipError::Runtime { call, .. } if call.contains("memcpy_htod_async")));
    assert_eq!(err.code(), Some(RuntimeStatus::INVALID_HANDLE.code()));

    deallocate(dev)
}

#[test]
#[serial]
fn test_buffer_length_checks_come_before_runtime_calls() -> HipResult<()> {
    let mut dev = allocate::<u32>(4)?;
    let before = RUNTIME_FIXTURE.stats();

    let err = copy_host_to_device_sync(&[0u32; 2], &mut dev, 3).unwrap_err();
    assert_eq!(err, HipError::HostBufferTooSmall { needed: 3, actual: 2 });

    let err = zero_fill_sync(&mut dev, 5).unwrap_err();
    assert_eq!(err, HipError::DeviceBufferTooSmall { needed: 5, capacity: 4 });

    assert_eq!(RUNTIME_FIXTURE.stats(), before);
    deallocate(dev)
}

#[test]
#[serial]
fn test_zero_length_transfers_touch_nothing() -> HipResult<()> {
    let mut dev = allocate::<u8>(4)?;
    copy_host_to_device_sync(&[1u8, 2, 3, 4], &mut dev, 4)?;

    copy_host_to_device_sync(&[0u8; 0], &mut dev, 0)?;
    zero_fill_sync(&mut dev, 0)?;

    let mut host = [0u8; 4];
    copy_device_to_host_sync(&dev, &mut host, 4)?;
    deallocate(dev)?;
    assert_eq!(host, [1, 2, 3, 4]);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    #[serial]
    fn prop_byte_pattern_round_trips(bytes in prop::collection::vec(any::<u8>(), 1..2048)) {
        let len = bytes.len();
        let mut dev = allocate::<u8>(len).unwrap();
        copy_host_to_device_sync(&bytes, &mut dev, len).unwrap();
        let mut back = vec![0u8; len];
        copy_device_to_host_sync(&dev, &mut back, len).unwrap();
        deallocate(dev).unwrap();
        prop_assert_eq!(back, bytes);
    }

    #[test]
    #[serial]
    fn prop_uniform_patterns_round_trip(value in prop_oneof![Just(0u8), Just(0xFFu8), any::<u8>()], len in 1usize..512) {
        let src = vec![value; len];
        let mut dev = allocate::<u8>(len).unwrap();
        copy_host_to_device_sync(&src, &mut dev, len).unwrap();
        let mut back = vec![!value; len];
        copy_device_to_host_sync(&dev, &mut back, len).unwrap();
        deallocate(dev).unwrap();
        prop_assert_eq!(back, src);
    }
}
