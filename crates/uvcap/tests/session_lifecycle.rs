// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Capture session lifecycle tests
//
// Every test drives a Session over the in-memory SimDriver, so none of
// them need a camera. Hardware coverage lives in v4l2_hardware.rs.
//
//   cargo test -p uvcap --test session_lifecycle

use std::collections::HashSet;
use std::time::Duration;

use nix::errno::Errno;
use rand::seq::SliceRandom;
use rand::Rng;
use uvcap::driver::{Format, Fraction};
use uvcap::fourcc::FourCC;
use uvcap::session::{Owner, Session, DEFAULT_BUFFER_COUNT, MAX_BUFFER_COUNT};
use uvcap::sim::{SimConfig, SimDriver, SimHandle, SimOp};
use uvcap::Error;

const N: usize = DEFAULT_BUFFER_COUNT as usize;

fn open(config: SimConfig) -> (Session<SimDriver>, SimHandle) {
    let driver = SimDriver::new(config);
    let handle = driver.handle();
    (Session::with_driver("sim0", driver), handle)
}

fn open_default() -> (Session<SimDriver>, SimHandle) {
    open(SimConfig::default())
}

fn owners(session: &Session<SimDriver>) -> Vec<Owner> {
    session.slots().map(|slot| slot.owner).collect()
}

fn assert_idle(session: &Session<SimDriver>, handle: &SimHandle) {
    assert!(!session.is_streaming());
    assert_eq!(session.slots().count(), 0);
    assert_eq!(handle.live_mappings(), 0);
    assert_eq!(handle.allocated(), 0);
    assert!(!handle.is_streaming());
}

// -----------------------------------------------------------------------------
// Allocation and mapping
// -----------------------------------------------------------------------------

#[test]
fn test_stream_on_maps_every_slot() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();

    let slots: Vec<_> = session.slots().collect();
    assert_eq!(slots.len(), N);
    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot.index as usize, i);
        assert!(slot.mapped);
        assert!(slot.length > 0);
        assert_eq!(slot.owner, Owner::Kernel);
    }
    assert_eq!(handle.live_mappings(), N);
    assert_eq!(handle.queued().len(), N);
    assert!(handle.is_streaming());
}

#[test]
fn test_stream_off_unmaps_and_restart_remaps() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();
    session.stream_off().unwrap();
    assert_idle(&session, &handle);
    assert_eq!(handle.count(SimOp::Unmap), N);

    session.stream_on().unwrap();
    assert_eq!(session.slots().filter(|slot| slot.mapped).count(), N);
    assert_eq!(handle.count(SimOp::Map), 2 * N);
    assert_eq!(handle.live_mappings(), N);
}

#[test]
fn test_stream_off_when_idle_is_noop() {
    let (mut session, handle) = open_default();
    session.stream_off().unwrap();
    assert!(handle.calls().is_empty());
}

#[test]
fn test_teardown_unmaps_before_free() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();
    handle.clear_calls();
    session.stream_off().unwrap();

    let ops: Vec<_> = handle.calls().iter().map(|call| call.op).collect();
    assert_eq!(ops.first(), Some(&SimOp::StreamOff));
    assert_eq!(ops.last(), Some(&SimOp::RequestBuffers));
    assert_eq!(handle.calls().last().and_then(|call| call.arg), Some(0));
}

#[test]
fn test_buffer_count_limit() {
    let (mut session, handle) = open_default();
    let err = session.set_buffer_count(u32::MAX).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{}", err);

    session.stream_on().unwrap();
    assert_eq!(session.slots().count(), N);
    session.stream_off().unwrap();

    session.set_buffer_count(MAX_BUFFER_COUNT).unwrap();
    session.stream_on().unwrap();
    assert_eq!(session.slots().count(), MAX_BUFFER_COUNT as usize);
    assert_eq!(handle.live_mappings(), MAX_BUFFER_COUNT as usize);
}

// -----------------------------------------------------------------------------
// Unwinding a failed stream_on
// -----------------------------------------------------------------------------

#[test]
fn test_allocation_shortfall_unwinds() {
    let (mut session, handle) = open(SimConfig::default().with_max_buffers(4));
    let err = session.stream_on().unwrap_err();
    assert!(matches!(err, Error::AllocationFailed(_)), "{}", err);
    assert_eq!(handle.count(SimOp::Map), 0);
    assert_idle(&session, &handle);
}

#[test]
fn test_request_buffers_failure() {
    let (mut session, handle) = open_default();
    handle.fail_next(SimOp::RequestBuffers, Errno::ENOMEM);
    let err = session.stream_on().unwrap_err();
    assert!(matches!(err, Error::AllocationFailed(_)));
    assert_eq!(err.raw_os_error(), Some(Errno::ENOMEM as i32));
    assert_idle(&session, &handle);
}

#[test]
fn test_map_failure_releases_earlier_mappings() {
    let (mut session, handle) = open_default();
    handle.fail_nth(SimOp::Map, 3, Errno::ENOMEM);

    let err = session.stream_on().unwrap_err();
    assert!(matches!(err, Error::MapFailed(_)));
    assert_eq!(handle.count(SimOp::Map), 4);
    assert_eq!(handle.count(SimOp::Unmap), 3);
    assert_eq!(handle.count(SimOp::QueueBuffer), 0);
    assert_idle(&session, &handle);

    session.stream_on().unwrap();
    assert_eq!(handle.live_mappings(), N);
}

#[test]
fn test_queue_failure_during_start_unwinds() {
    let (mut session, handle) = open_default();
    handle.fail_nth(SimOp::QueueBuffer, 2, Errno::EIO);
    let err = session.stream_on().unwrap_err();
    assert!(matches!(err, Error::StreamStartFailed(_)));
    assert_idle(&session, &handle);
    assert!(handle.queued().is_empty());
}

#[test]
fn test_stream_on_failure_unwinds() {
    let (mut session, handle) = open_default();
    handle.fail_next(SimOp::StreamOn, Errno::ENOSPC);
    let err = session.stream_on().unwrap_err();
    assert!(matches!(err, Error::StreamStartFailed(_)));
    assert_eq!(err.raw_os_error(), Some(Errno::ENOSPC as i32));
    assert_idle(&session, &handle);

    session.stream_on().unwrap();
    assert!(session.is_streaming());
}

// -----------------------------------------------------------------------------
// Format and frame rate
// -----------------------------------------------------------------------------

#[test]
fn test_set_format_exact() {
    let (mut session, handle) = open_default();
    session.set_format(640, 480, FourCC(*b"MJPG")).unwrap();
    assert_eq!(
        session.get_format().unwrap(),
        Format::new(640, 480, FourCC(*b"MJPG"))
    );
    assert_eq!(handle.format(), Format::new(640, 480, FourCC(*b"MJPG")));
}

#[test]
fn test_set_format_coerced_is_rejected() {
    let coerced = Format::new(1280, 720, FourCC(*b"YUYV"));
    let (mut session, _) = open(SimConfig::default().with_coerced_format(coerced));

    match session.set_format(640, 480, FourCC(*b"MJPG")) {
        Err(Error::UnsupportedFormat {
            requested,
            confirmed,
            source,
        }) => {
            assert_eq!(requested, Format::new(640, 480, FourCC(*b"MJPG")));
            assert_eq!(confirmed, Some(coerced));
            assert!(source.is_none());
        }
        other => panic!("expected UnsupportedFormat, got {:?}", other),
    }
    assert!(matches!(session.get_format(), Err(Error::NotConfigured)));
}

#[test]
fn test_coerced_size_only_is_rejected() {
    let coerced = Format::new(640, 360, FourCC(*b"MJPG"));
    let (mut session, _) = open(SimConfig::default().with_coerced_format(coerced));
    let err = session.set_format(640, 480, FourCC(*b"MJPG")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { .. }));
}

#[test]
fn test_set_framerate_records_interval() {
    let (mut session, handle) = open_default();
    session.set_framerate(15).unwrap();
    assert_eq!(session.framerate(), Some(Fraction::new(1, 15)));
    assert_eq!(handle.stream_params().time_per_frame, Fraction::new(1, 15));
}

// -----------------------------------------------------------------------------
// Dequeue and queue
// -----------------------------------------------------------------------------

#[test]
fn test_dequeue_queue_round_trip() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();

    let frame = session.dequeue_frame(None).unwrap();
    let index = frame.index();
    assert_eq!(owners(&session)[index as usize], Owner::User);
    assert!(!handle.queued().contains(&index));

    session.queue_frame(frame).unwrap();
    assert_eq!(owners(&session)[index as usize], Owner::Kernel);
    assert_eq!(handle.queued().last(), Some(&index));
    assert!(owners(&session).iter().all(|owner| *owner == Owner::Kernel));
}

#[test]
fn test_frame_data_matches_slot() {
    let (mut session, _) = open(SimConfig::default().with_frame_bytes(4096));
    session.set_format(320, 240, FourCC(*b"YUYV")).unwrap();
    session.stream_on().unwrap();

    for _ in 0..N {
        let frame = session.dequeue_frame(None).unwrap();
        let data = session.frame_data(&frame).unwrap();
        assert_eq!(data.len(), 4096);
        assert_eq!(data[0], frame.index() as u8);
        assert!(!frame.is_error());
        session.queue_frame(frame).unwrap();
    }
}

#[test]
fn test_foreign_frame_rejected() {
    let (mut a, _) = open_default();
    let (mut b, b_handle) = open_default();
    a.stream_on().unwrap();
    b.stream_on().unwrap();

    let frame = a.dequeue_frame(None).unwrap();
    let index = frame.index() as usize;
    b_handle.clear_calls();

    assert!(matches!(b.frame_data(&frame), Err(Error::InvalidState(_))));
    let err = b.queue_frame(frame).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    assert!(b_handle.calls().is_empty());
    assert!(owners(&b).iter().all(|owner| *owner == Owner::Kernel));
    assert_eq!(owners(&a)[index], Owner::User);
    assert_eq!(
        owners(&a)
            .iter()
            .filter(|owner| **owner == Owner::Kernel)
            .count(),
        N - 1
    );
}

#[test]
fn test_stale_frame_rejected_after_restart() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();
    let stale = session.dequeue_frame(None).unwrap();

    session.stream_off().unwrap();
    assert!(matches!(
        session.frame_data(&stale),
        Err(Error::InvalidState(_))
    ));

    session.stream_on().unwrap();
    let held = session.dequeue_frame(None).unwrap();
    handle.clear_calls();

    let err = session.queue_frame(stale).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(handle.count(SimOp::QueueBuffer), 0);

    let user: Vec<_> = session
        .slots()
        .filter(|slot| slot.owner == Owner::User)
        .map(|slot| slot.index)
        .collect();
    assert_eq!(user, vec![held.index()]);
    session.queue_frame(held).unwrap();
}

#[test]
fn test_dequeue_timeout_when_all_slots_held() {
    let (mut session, _) = open_default();
    session.stream_on().unwrap();

    let held: Vec<_> = (0..N)
        .map(|_| session.dequeue_frame(None).unwrap())
        .collect();

    let err = session
        .dequeue_frame(Some(Duration::from_millis(50)))
        .unwrap_err();
    assert!(err.is_timeout(), "{}", err);
    assert!(owners(&session).iter().all(|owner| *owner == Owner::User));

    let mut held = held.into_iter();
    if let Some(frame) = held.next() {
        session.queue_frame(frame).unwrap();
    }
    let frame = session
        .dequeue_frame(Some(Duration::from_millis(50)))
        .unwrap();
    session.queue_frame(frame).unwrap();
    for frame in held {
        session.queue_frame(frame).unwrap();
    }
}

#[test]
fn test_blocking_dequeue_on_empty_queue_fails() {
    let (mut session, _) = open_default();
    session.set_buffer_count(1).unwrap();
    session.stream_on().unwrap();
    let frame = session.dequeue_frame(None).unwrap();

    let err = session.dequeue_frame(None).unwrap_err();
    assert!(matches!(err, Error::DequeueFailed(_)));
    assert_eq!(err.raw_os_error(), Some(Errno::EAGAIN as i32));
    session.queue_frame(frame).unwrap();
}

#[test]
fn test_driver_dequeue_error_propagates() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();
    handle.fail_next(SimOp::DequeueBuffer, Errno::EIO);
    let err = session.dequeue_frame(None).unwrap_err();
    assert!(matches!(err, Error::DequeueFailed(_)));
    assert_eq!(err.raw_os_error(), Some(Errno::EIO as i32));
    assert!(owners(&session).iter().all(|owner| *owner == Owner::Kernel));
}

#[test]
fn test_random_requeue_order() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();

    let mut rng = rand::rng();
    let mut seen = HashSet::new();
    let mut held = Vec::new();

    for _ in 0..200 {
        let hold = rng.random_range(1..=N);
        while held.len() < hold {
            let frame = session.dequeue_frame(None).unwrap();
            seen.insert(frame.index());
            held.push(frame);
        }
        held.shuffle(&mut rng);
        let release = rng.random_range(1..=held.len());
        for frame in held.drain(..release) {
            session.queue_frame(frame).unwrap();
        }

        let user = owners(&session)
            .iter()
            .filter(|owner| **owner == Owner::User)
            .count();
        assert_eq!(user, held.len());
        assert_eq!(handle.queued().len(), N - held.len());
    }

    assert_eq!(seen.len(), N);
    for frame in held {
        session.queue_frame(frame).unwrap();
    }
    session.stream_off().unwrap();
    assert_idle(&session, &handle);
}

// -----------------------------------------------------------------------------
// Close
// -----------------------------------------------------------------------------

#[test]
fn test_close_without_streaming() {
    let (mut session, handle) = open_default();
    session.set_format(640, 480, FourCC(*b"MJPG")).unwrap();
    handle.clear_calls();
    session.close();

    assert!(handle.calls().is_empty());
    assert_eq!(handle.count(SimOp::RequestBuffers), 0);
    assert_eq!(handle.count(SimOp::StreamOff), 0);
}

#[test]
fn test_close_while_streaming_with_held_frame() {
    let (mut session, handle) = open_default();
    session.stream_on().unwrap();
    let _frame = session.dequeue_frame(None).unwrap();
    session.close();

    assert_eq!(handle.count(SimOp::StreamOff), 1);
    assert!(!handle.is_streaming());
    assert_eq!(handle.live_mappings(), 0);
    assert_eq!(handle.allocated(), 0);
}

// -----------------------------------------------------------------------------
// End to end
// -----------------------------------------------------------------------------

#[test]
fn test_capture_ten_frames() -> Result<(), Error> {
    let (mut session, handle) = open_default();
    session.set_format(640, 480, FourCC(*b"MJPG"))?;
    session.set_framerate(30)?;
    session.stream_on()?;

    let mut indices = Vec::new();
    let mut last = None;
    for _ in 0..10 {
        let frame = session.dequeue_frame(Some(Duration::from_secs(1)))?;
        if let Some(last) = last {
            assert!(frame.timestamp() >= last);
        }
        last = Some(frame.timestamp());
        indices.push(frame.index());
        session.queue_frame(frame)?;
    }

    session.stream_off()?;
    session.close();

    let first: HashSet<_> = indices[..N].iter().copied().collect();
    assert_eq!(first, (0..N as u32).collect::<HashSet<_>>());
    for i in N..indices.len() {
        assert_eq!(indices[i], indices[i - N]);
    }
    assert_eq!(handle.live_mappings(), 0);
    assert_eq!(handle.allocated(), 0);
    Ok(())
}

#[test]
fn test_timestamps_follow_frame_interval() -> Result<(), Error> {
    let (mut session, _) = open(SimConfig::default().with_fixed_interval(Fraction::new(1, 25)));
    session.set_framerate(30)?;
    assert_eq!(session.framerate(), Some(Fraction::new(1, 25)));
    session.stream_on()?;

    let a = session.dequeue_frame(None)?;
    let (ta, sa) = (a.timestamp(), a.sequence());
    session.queue_frame(a)?;
    let b = session.dequeue_frame(None)?;
    assert_eq!(b.timestamp() - ta, Duration::from_millis(40));
    assert_eq!(b.sequence(), sa + 1);
    session.queue_frame(b)?;
    Ok(())
}
