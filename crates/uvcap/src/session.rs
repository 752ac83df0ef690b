// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture device session
//!
//! A [`Session`] owns one open device and a fixed pool of `N` buffer slots.
//! Its lifecycle has four phases:
//!
//! 1. **configure** - [`set_format`](Session::set_format) and
//!    [`set_framerate`](Session::set_framerate) while not streaming
//! 2. **allocate and stream** - [`stream_on`](Session::stream_on) requests,
//!    maps and queues all slots, then starts the stream
//! 3. **exchange** - [`dequeue_frame`](Session::dequeue_frame) moves a slot
//!    from the kernel to the caller, [`queue_frame`](Session::queue_frame)
//!    moves it back
//! 4. **teardown** - [`stream_off`](Session::stream_off) stops the stream,
//!    unmaps every slot and frees the allocation;
//!    [`close`](Session::close) releases the device
//!
//! Slot indices are assigned by the kernel and the kernel alone decides
//! which slot completes next, so callers must never assume sequential
//! order.
//!
//! # Threading
//!
//! A session is driven by one thread at a time. It is `Send` when its
//! driver is, but not `Sync`: buffer ownership is the only synchronisation
//! between the kernel and the caller and it is not safe to race on it.

use std::{
    fmt, io,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use log::{debug, info, trace, warn};
use uvcap_sys as sys;

use crate::device::{Capabilities, FormatDescription};
use crate::driver::{BufferInfo, CaptureDriver, Format, Fraction, MappedRegion};
use crate::fourcc::FourCC;
use crate::v4l2::V4l2Driver;
use crate::Error;

/// Number of buffer slots a session allocates unless told otherwise
pub const DEFAULT_BUFFER_COUNT: u32 = 6;

/// Largest buffer count the kernel will allocate for one queue
pub const MAX_BUFFER_COUNT: u32 = sys::VIDEO_MAX_FRAME;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Which side may touch a slot's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Queued; the driver may be writing into it
    Kernel,
    /// Dequeued or not yet queued; readable by the caller
    User,
}

struct Slot<R> {
    info: BufferInfo,
    region: Option<R>,
    owner: Owner,
    /// Ticket of the dequeue that handed this slot to the caller
    ticket: u64,
}

/// Snapshot of one buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub index: u32,
    pub length: u32,
    pub offset: u32,
    pub mapped: bool,
    pub owner: Owner,
}

/// A filled buffer held by the caller
///
/// A frame does not own memory. It names a slot of the session that
/// dequeued it; read it with [`Session::frame_data`] and give it back with
/// [`Session::queue_frame`]. It is valid until it is queued or the session
/// stops streaming.
#[derive(Debug)]
pub struct Frame {
    session: u64,
    index: u32,
    ticket: u64,
    bytes_used: u32,
    timestamp: Duration,
    sequence: u32,
    flags: u32,
}

impl Frame {
    /// Kernel-assigned slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Bytes the driver filled
    pub fn bytes_used(&self) -> u32 {
        self.bytes_used
    }

    /// Capture time on the driver's clock (normally `CLOCK_MONOTONIC`)
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Driver frame counter, gaps mean dropped frames
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The driver flagged the data as possibly corrupted
    pub fn is_error(&self) -> bool {
        self.flags & sys::V4L2_BUF_FLAG_ERROR != 0
    }
}

/// One open capture device
pub struct Session<D: CaptureDriver = V4l2Driver> {
    id: u64,
    device: String,
    driver: D,
    num_buffers: u32,
    format: Option<Format>,
    frame_interval: Option<Fraction>,
    slots: Vec<Slot<D::Region>>,
    streaming: bool,
    next_ticket: u64,
    closed: bool,
}

impl Session<V4l2Driver> {
    /// Opens a V4L2 device node for read-write access.
    ///
    /// No buffers are allocated until [`stream_on`](Session::stream_on).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        info!("open camera {}", path.display());
        let driver = V4l2Driver::open(path).map_err(|err| {
            debug!("failed to open {}: {}", path.display(), err);
            Error::DeviceUnavailable(err)
        })?;
        Ok(Session::with_driver(path.to_string_lossy(), driver))
    }
}

impl<D: CaptureDriver> Session<D> {
    /// Wraps an already opened driver.
    pub fn with_driver(device: impl Into<String>, driver: D) -> Self {
        Session {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            device: device.into(),
            driver,
            num_buffers: DEFAULT_BUFFER_COUNT,
            format: None,
            frame_interval: None,
            slots: Vec::new(),
            streaming: false,
            next_ticket: 0,
            closed: false,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn buffer_count(&self) -> u32 {
        self.num_buffers
    }

    /// Sets how many slots the next [`stream_on`](Session::stream_on) allocates.
    ///
    /// The count must be between 1 and [`MAX_BUFFER_COUNT`].
    pub fn set_buffer_count(&mut self, count: u32) -> Result<(), Error> {
        if self.streaming {
            return Err(Error::InvalidState(
                "buffer count cannot change while streaming",
            ));
        }
        if count == 0 || count > MAX_BUFFER_COUNT {
            return Err(Error::InvalidArgument(format!(
                "buffer count must be between 1 and {}, got {}",
                MAX_BUFFER_COUNT, count
            )));
        }
        self.num_buffers = count;
        Ok(())
    }

    pub fn capabilities(&mut self) -> Result<Capabilities, Error> {
        Ok(self.driver.capabilities()?)
    }

    /// Pixel formats the device can capture
    pub fn formats(&mut self) -> Result<Vec<FormatDescription>, Error> {
        Ok(self.driver.enum_formats()?)
    }

    /// Negotiates an exact capture format.
    ///
    /// The driver may pick the nearest format it supports; anything other
    /// than the requested width, height and pixel format is reported as
    /// [`Error::UnsupportedFormat`] with the confirmed values. After any
    /// failure the session is unconfigured until a later call succeeds.
    pub fn set_format(&mut self, width: u32, height: u32, fourcc: FourCC) -> Result<(), Error> {
        if self.streaming {
            return Err(Error::InvalidState("set_format called while streaming"));
        }

        let requested = Format::new(width, height, fourcc);
        let rejected = |err: io::Error| Error::UnsupportedFormat {
            requested,
            confirmed: None,
            source: Some(err),
        };

        // A failed S_FMT may still have changed the driver's format
        self.format = None;
        self.driver.set_format(&requested).map_err(rejected)?;
        let confirmed = self.driver.get_format().map_err(rejected)?;

        if confirmed != requested {
            warn!(
                "{}: requested {} but driver confirmed {}",
                self.device, requested, confirmed
            );
            return Err(Error::UnsupportedFormat {
                requested,
                confirmed: Some(confirmed),
                source: None,
            });
        }

        debug!("{}: format {}", self.device, confirmed);
        self.format = Some(confirmed);
        Ok(())
    }

    /// The format confirmed by the last successful [`set_format`](Session::set_format)
    pub fn get_format(&self) -> Result<Format, Error> {
        self.format.ok_or(Error::NotConfigured)
    }

    /// Sets the frame interval to `1/fps`.
    ///
    /// Drivers may round to the nearest interval they support; the applied
    /// interval is available from [`framerate`](Session::framerate).
    pub fn set_framerate(&mut self, fps: u32) -> Result<(), Error> {
        if fps == 0 {
            return Err(Error::InvalidArgument(
                "frame rate must be at least 1 fps".to_owned(),
            ));
        }

        let mut params = self
            .driver
            .get_stream_params()
            .map_err(Error::UnsupportedFramerate)?;
        if !params.supports_time_per_frame() {
            debug!("{}: driver does not advertise TIMEPERFRAME", self.device);
        }

        let requested = Fraction::from_fps(fps);
        params.time_per_frame = requested;
        let applied = self
            .driver
            .set_stream_params(&params)
            .map_err(Error::UnsupportedFramerate)?;

        let interval = if applied.time_per_frame.denominator == 0 {
            requested
        } else {
            applied.time_per_frame
        };
        if interval != requested {
            warn!(
                "{}: requested {} fps, driver applied {:.2} fps",
                self.device,
                fps,
                interval.fps()
            );
        }
        debug!("{}: frame interval {}", self.device, interval);
        self.frame_interval = Some(interval);
        Ok(())
    }

    /// Frame interval applied by the last successful [`set_framerate`](Session::set_framerate)
    pub fn framerate(&self) -> Option<Fraction> {
        self.frame_interval
    }

    /// Allocates, maps and queues every slot, then starts streaming.
    ///
    /// On failure every mapping made so far is released and the allocation
    /// is freed, leaving the session idle; calling `stream_on` again starts
    /// from scratch.
    pub fn stream_on(&mut self) -> Result<(), Error> {
        if self.streaming {
            return Err(Error::InvalidState("stream_on called while streaming"));
        }

        let mut slots = Vec::new();
        if let Err(err) = self.start(&mut slots) {
            warn!("{}: stream on failed: {}", self.device, err);
            drop(slots);
            self.release_allocation();
            return Err(err);
        }

        self.slots = slots;
        self.streaming = true;
        info!(
            "{}: streaming with {} buffers",
            self.device,
            self.slots.len()
        );
        Ok(())
    }

    fn start(&mut self, slots: &mut Vec<Slot<D::Region>>) -> Result<(), Error> {
        let count = self.num_buffers;

        let granted = self
            .driver
            .request_buffers(count)
            .map_err(Error::AllocationFailed)?;
        if granted != count {
            return Err(Error::AllocationFailed(io::Error::new(
                io::ErrorKind::Other,
                format!("driver granted {} of {} buffers", granted, count),
            )));
        }

        slots.reserve_exact(granted as usize);
        for index in 0..count {
            let info = self
                .driver
                .query_buffer(index)
                .map_err(Error::AllocationFailed)?;
            debug!(
                "{}: buffer {} length {} offset {:#x}",
                self.device, info.index, info.length, info.offset
            );
            slots.push(Slot {
                info,
                region: None,
                owner: Owner::User,
                ticket: 0,
            });
        }

        for slot in slots.iter_mut() {
            let region = self.driver.map(&slot.info).map_err(Error::MapFailed)?;
            slot.region = Some(region);
        }

        for slot in slots.iter_mut() {
            self.driver
                .queue_buffer(slot.info.index)
                .map_err(Error::StreamStartFailed)?;
            slot.owner = Owner::Kernel;
        }

        self.driver.stream_on().map_err(Error::StreamStartFailed)
    }

    /// Stops streaming, unmaps every slot and frees the allocation.
    ///
    /// Slots still held by the kernel are reclaimed by the stop; frames
    /// still held by the caller become stale. A no-op when not streaming.
    pub fn stream_off(&mut self) -> Result<(), Error> {
        if !self.streaming {
            return Ok(());
        }

        self.driver.stream_off().map_err(Error::StreamStopFailed)?;
        self.streaming = false;
        self.release_buffers();
        info!("{}: stream off", self.device);
        Ok(())
    }

    fn release_buffers(&mut self) {
        // Unmap before freeing, the driver refuses to free mapped buffers
        self.slots.clear();
        self.release_allocation();
    }

    fn release_allocation(&mut self) {
        if let Err(err) = self.driver.request_buffers(0) {
            warn!("{}: failed to free buffers: {}", self.device, err);
        }
    }

    /// Waits for the next filled buffer and hands its slot to the caller.
    ///
    /// With `Some(timeout)` the device is polled first and a timeout fails
    /// with [`Error::DequeueFailed`] of kind [`io::ErrorKind::TimedOut`]
    /// (see [`Error::is_timeout`]). With `None` the call blocks in the
    /// driver until a frame completes, with no way to cancel it.
    pub fn dequeue_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, Error> {
        if !self.streaming {
            return Err(Error::InvalidState(
                "dequeue_frame called while not streaming",
            ));
        }

        if let Some(timeout) = timeout {
            let ready = self
                .driver
                .wait_readable(timeout)
                .map_err(Error::DequeueFailed)?;
            if !ready {
                return Err(Error::DequeueFailed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no frame within {:?}", timeout),
                )));
            }
        }

        let buf = self.driver.dequeue_buffer().map_err(Error::DequeueFailed)?;

        let slot = match self.slots.get_mut(buf.index as usize) {
            Some(slot) if slot.owner == Owner::Kernel => slot,
            _ => {
                return Err(Error::DequeueFailed(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("driver returned buffer {} which it does not own", buf.index),
                )))
            }
        };

        self.next_ticket += 1;
        slot.owner = Owner::User;
        slot.ticket = self.next_ticket;

        trace!(
            "{}: DQ {} seq {} {} bytes",
            self.device,
            buf.index,
            buf.sequence,
            buf.bytes_used
        );

        Ok(Frame {
            session: self.id,
            index: buf.index,
            ticket: self.next_ticket,
            bytes_used: buf.bytes_used,
            timestamp: buf.timestamp,
            sequence: buf.sequence,
            flags: buf.flags,
        })
    }

    /// Returns a frame's slot to the kernel.
    ///
    /// Frames from another session, or whose slot has already been queued
    /// or reallocated, are rejected with [`Error::InvalidState`] and leave
    /// every slot untouched. If the driver fails the queue the slot stays
    /// with the caller until [`stream_off`](Session::stream_off).
    pub fn queue_frame(&mut self, frame: Frame) -> Result<(), Error> {
        let index = self.held_slot(&frame)?;
        self.driver
            .queue_buffer(frame.index)
            .map_err(Error::QueueFailed)?;
        self.slots[index].owner = Owner::Kernel;
        trace!("{}: Q  {}", self.device, frame.index);
        Ok(())
    }

    /// The filled bytes of a frame held by the caller.
    pub fn frame_data(&self, frame: &Frame) -> Result<&[u8], Error> {
        let index = self.held_slot(frame)?;
        let data = self.slots[index]
            .region
            .as_ref()
            .map(|region| region.as_slice())
            .ok_or(Error::InvalidState("slot is not mapped"))?;
        let len = data.len().min(frame.bytes_used as usize);
        Ok(&data[..len])
    }

    fn held_slot(&self, frame: &Frame) -> Result<usize, Error> {
        if frame.session != self.id {
            return Err(Error::InvalidState("frame belongs to another session"));
        }
        let index = frame.index as usize;
        match self.slots.get(index) {
            Some(slot) if slot.owner == Owner::User && slot.ticket == frame.ticket => Ok(index),
            _ => Err(Error::InvalidState(
                "frame is stale: its slot is not held by the caller",
            )),
        }
    }

    /// The current buffer slots, empty while not streaming
    pub fn slots(&self) -> impl Iterator<Item = SlotInfo> + '_ {
        self.slots.iter().map(|slot| SlotInfo {
            index: slot.info.index,
            length: slot.info.length,
            offset: slot.info.offset,
            mapped: slot.region.is_some(),
            owner: slot.owner,
        })
    }

    /// Stops streaming if needed and releases the device.
    ///
    /// Never fails; teardown errors are logged.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.streaming {
            if let Err(err) = self.stream_off() {
                warn!("{}: {}", self.device, err);
                self.streaming = false;
                self.release_buffers();
            }
        }
        info!("close dev {}", self.device);
    }
}

impl<D: CaptureDriver> Drop for Session<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<D: CaptureDriver> fmt::Debug for Session<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("format", &self.format)
            .field("frame_interval", &self.frame_interval)
            .field("num_buffers", &self.num_buffers)
            .field("streaming", &self.streaming)
            .finish()
    }
}
