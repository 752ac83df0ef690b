// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! In-memory capture driver
//!
//! [`SimDriver`] behaves like a well-mannered vb2 driver: it confirms or
//! coerces formats, grants a bounded number of buffers, keeps queued
//! buffers in FIFO order and stamps each dequeued buffer with a monotonic
//! timestamp advanced by the configured frame interval. It never blocks;
//! dequeuing from an empty queue fails with `EAGAIN`.
//!
//! A [`SimHandle`] shares the driver state and stays usable after the
//! session that owns the driver is closed, so tests can inspect the call
//! log, the live mapping count and inject failures.
//!
//! ```
//! use uvcap::fourcc::FourCC;
//! use uvcap::session::Session;
//! use uvcap::sim::{SimDriver, SimOp};
//!
//! let driver = SimDriver::default();
//! let handle = driver.handle();
//! let mut session = Session::with_driver("sim0", driver);
//! session.set_format(640, 480, FourCC(*b"YUYV"))?;
//! session.stream_on()?;
//! assert_eq!(handle.live_mappings(), 6);
//! session.close();
//! assert_eq!(handle.live_mappings(), 0);
//! assert_eq!(handle.count(SimOp::StreamOff), 1);
//! # Ok::<(), uvcap::Error>(())
//! ```

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use nix::errno::Errno;
use uvcap_sys as sys;

use crate::device::{Capabilities, FormatDescription};
use crate::driver::{
    BufferInfo, CaptureDriver, DequeuedBuffer, Format, Fraction, MappedRegion, StreamParams,
};
use crate::fourcc::FourCC;

const PAGE_SIZE: u32 = 4096;
const MAX_BUFFER_LENGTH: u32 = 64 << 20;

/// Driver entry points, used to filter the call log and target failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Capabilities,
    EnumFormats,
    SetFormat,
    GetFormat,
    GetStreamParams,
    SetStreamParams,
    RequestBuffers,
    QueryBuffer,
    Map,
    Unmap,
    QueueBuffer,
    DequeueBuffer,
    WaitReadable,
    StreamOn,
    StreamOff,
}

/// One recorded driver call with its index or count argument, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimCall {
    pub op: SimOp,
    pub arg: Option<u32>,
}

/// Static behaviour of a simulated device
#[derive(Debug, Clone)]
pub struct SimConfig {
    formats: Vec<FormatDescription>,
    initial_format: Format,
    coerce_format: Option<Format>,
    max_buffers: u32,
    frame_bytes: Option<u32>,
    fixed_interval: Option<Fraction>,
}

impl SimConfig {
    /// Formats reported by `enum_formats`
    pub fn with_formats(self, formats: Vec<FormatDescription>) -> SimConfig {
        SimConfig { formats, ..self }
    }

    /// Confirm this format after every `set_format`, whatever was requested
    pub fn with_coerced_format(self, format: Format) -> SimConfig {
        SimConfig {
            coerce_format: Some(format),
            ..self
        }
    }

    /// Grant at most `max_buffers` on `request_buffers`
    pub fn with_max_buffers(self, max_buffers: u32) -> SimConfig {
        SimConfig {
            max_buffers,
            ..self
        }
    }

    /// Report `bytes` filled per frame instead of the whole buffer
    pub fn with_frame_bytes(self, bytes: u32) -> SimConfig {
        SimConfig {
            frame_bytes: Some(bytes),
            ..self
        }
    }

    /// Apply this interval on every `set_stream_params`
    pub fn with_fixed_interval(self, interval: Fraction) -> SimConfig {
        SimConfig {
            fixed_interval: Some(interval),
            ..self
        }
    }
}

impl Default for SimConfig {
    fn default() -> SimConfig {
        SimConfig {
            formats: vec![
                FormatDescription {
                    fourcc: FourCC(*b"YUYV"),
                    description: "YUYV 4:2:2".to_owned(),
                    compressed: false,
                },
                FormatDescription {
                    fourcc: FourCC(*b"MJPG"),
                    description: "Motion-JPEG".to_owned(),
                    compressed: true,
                },
            ],
            initial_format: Format::new(640, 480, FourCC(*b"YUYV")),
            coerce_format: None,
            max_buffers: sys::VIDEO_MAX_FRAME,
            frame_bytes: None,
            fixed_interval: None,
        }
    }
}

#[derive(Debug)]
struct Failure {
    op: SimOp,
    remaining: usize,
    errno: Errno,
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    format: Format,
    params: StreamParams,
    allocated: u32,
    buffer_length: u32,
    queue: VecDeque<u32>,
    streaming: bool,
    clock: Duration,
    sequence: u32,
    live_mappings: usize,
    calls: Vec<SimCall>,
    failures: Vec<Failure>,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        SimState {
            format: config.initial_format,
            params: StreamParams {
                capability: sys::V4L2_CAP_TIMEPERFRAME,
                time_per_frame: Fraction::from_fps(30),
                ..StreamParams::default()
            },
            config,
            allocated: 0,
            buffer_length: 0,
            queue: VecDeque::new(),
            streaming: false,
            clock: Duration::from_secs(1),
            sequence: 0,
            live_mappings: 0,
            calls: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Records the call and fails it if an injected failure is due.
    fn enter(&mut self, op: SimOp, arg: Option<u32>) -> io::Result<()> {
        self.calls.push(SimCall { op, arg });
        let due = self.failures.iter_mut().position(|failure| {
            if failure.op != op {
                return false;
            }
            if failure.remaining == 0 {
                return true;
            }
            failure.remaining -= 1;
            false
        });
        match due {
            Some(pos) => Err(self.failures.remove(pos).errno.into()),
            None => Ok(()),
        }
    }

    fn frame_length(&self) -> u32 {
        let bytes = self
            .format
            .width
            .saturating_mul(self.format.height)
            .saturating_mul(2);
        bytes.clamp(PAGE_SIZE, MAX_BUFFER_LENGTH)
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Simulated capture device
#[derive(Debug)]
pub struct SimDriver {
    state: Arc<Mutex<SimState>>,
}

impl SimDriver {
    pub fn new(config: SimConfig) -> Self {
        SimDriver {
            state: Arc::new(Mutex::new(SimState::new(config))),
        }
    }

    /// A handle observing this driver's state
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        SimDriver::new(SimConfig::default())
    }
}

/// Memory standing in for a mapped kernel buffer
///
/// Filled with the slot index so tests can tell slots apart.
#[derive(Debug)]
pub struct SimRegion {
    index: u32,
    data: Box<[u8]>,
    state: Arc<Mutex<SimState>>,
}

impl MappedRegion for SimRegion {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for SimRegion {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(SimCall {
            op: SimOp::Unmap,
            arg: Some(self.index),
        });
        state.live_mappings -= 1;
    }
}

impl CaptureDriver for SimDriver {
    type Region = SimRegion;

    fn capabilities(&mut self) -> io::Result<Capabilities> {
        lock(&self.state).enter(SimOp::Capabilities, None)?;
        let caps = sys::V4L2_CAP_VIDEO_CAPTURE | sys::V4L2_CAP_STREAMING;
        Ok(Capabilities {
            driver: "uvcap-sim".to_owned(),
            card: "Simulated Camera".to_owned(),
            bus_info: "platform:uvcap-sim".to_owned(),
            version: 0x0006_0000,
            capabilities: caps | sys::V4L2_CAP_DEVICE_CAPS,
            device_caps: caps,
        })
    }

    fn enum_formats(&mut self) -> io::Result<Vec<FormatDescription>> {
        let mut state = lock(&self.state);
        state.enter(SimOp::EnumFormats, None)?;
        Ok(state.config.formats.clone())
    }

    fn set_format(&mut self, format: &Format) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.enter(SimOp::SetFormat, None)?;
        if state.allocated > 0 {
            return Err(Errno::EBUSY.into());
        }
        state.format = state.config.coerce_format.unwrap_or(*format);
        Ok(())
    }

    fn get_format(&mut self) -> io::Result<Format> {
        let mut state = lock(&self.state);
        state.enter(SimOp::GetFormat, None)?;
        Ok(state.format)
    }

    fn get_stream_params(&mut self) -> io::Result<StreamParams> {
        let mut state = lock(&self.state);
        state.enter(SimOp::GetStreamParams, None)?;
        Ok(state.params)
    }

    fn set_stream_params(&mut self, params: &StreamParams) -> io::Result<StreamParams> {
        let mut state = lock(&self.state);
        state.enter(SimOp::SetStreamParams, None)?;
        if params.time_per_frame.denominator == 0 {
            return Err(Errno::EINVAL.into());
        }
        let time_per_frame = state.config.fixed_interval.unwrap_or(params.time_per_frame);
        state.params = StreamParams {
            time_per_frame,
            ..*params
        };
        Ok(state.params)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut state = lock(&self.state);
        state.enter(SimOp::RequestBuffers, Some(count))?;
        if state.streaming {
            return Err(Errno::EBUSY.into());
        }
        if count == 0 && state.live_mappings > 0 {
            // vb2 refuses to free buffers that are still mapped
            return Err(Errno::EBUSY.into());
        }
        state.queue.clear();
        state.allocated = count.min(state.config.max_buffers);
        state.buffer_length = state.frame_length();
        Ok(state.allocated)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let mut state = lock(&self.state);
        state.enter(SimOp::QueryBuffer, Some(index))?;
        if index >= state.allocated {
            return Err(Errno::EINVAL.into());
        }
        let stride = (state.buffer_length + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;
        Ok(BufferInfo {
            index,
            length: state.buffer_length,
            offset: index * stride,
        })
    }

    fn map(&mut self, info: &BufferInfo) -> io::Result<SimRegion> {
        let mut state = lock(&self.state);
        state.enter(SimOp::Map, Some(info.index))?;
        if info.index >= state.allocated || info.length != state.buffer_length {
            return Err(Errno::EINVAL.into());
        }
        state.live_mappings += 1;
        Ok(SimRegion {
            index: info.index,
            data: vec![info.index as u8; info.length as usize].into_boxed_slice(),
            state: Arc::clone(&self.state),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.enter(SimOp::QueueBuffer, Some(index))?;
        if index >= state.allocated || state.queue.contains(&index) {
            return Err(Errno::EINVAL.into());
        }
        state.queue.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let mut state = lock(&self.state);
        state.enter(SimOp::DequeueBuffer, None)?;
        if !state.streaming {
            return Err(Errno::EINVAL.into());
        }
        let index = state.queue.pop_front().ok_or(Errno::EAGAIN)?;
        let interval = state
            .params
            .time_per_frame
            .as_duration()
            .unwrap_or(Duration::from_millis(33));
        state.clock += interval;
        state.sequence += 1;
        let bytes_used = state
            .config
            .frame_bytes
            .unwrap_or(state.buffer_length)
            .min(state.buffer_length);
        Ok(DequeuedBuffer {
            index,
            bytes_used,
            timestamp: state.clock,
            sequence: state.sequence - 1,
            flags: sys::V4L2_BUF_FLAG_MAPPED
                | sys::V4L2_BUF_FLAG_DONE
                | sys::V4L2_BUF_FLAG_TIMESTAMP_MONOTONIC,
        })
    }

    fn wait_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        let mut state = lock(&self.state);
        state.enter(SimOp::WaitReadable, None)?;
        Ok(state.streaming && !state.queue.is_empty())
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.enter(SimOp::StreamOn, None)?;
        if state.allocated == 0 {
            return Err(Errno::EINVAL.into());
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.enter(SimOp::StreamOff, None)?;
        // Stopping reclaims every queued buffer
        state.streaming = false;
        state.queue.clear();
        Ok(())
    }
}

/// Shared view of a [`SimDriver`]'s state
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Every driver call so far, oldest first
    pub fn calls(&self) -> Vec<SimCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of calls of one kind
    pub fn count(&self, op: SimOp) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Fail the `nth` (0-based) future call of `op` with `errno`
    pub fn fail_nth(&self, op: SimOp, nth: usize, errno: Errno) {
        lock(&self.state).failures.push(Failure {
            op,
            remaining: nth,
            errno,
        });
    }

    /// Fail the next call of `op` with `errno`
    pub fn fail_next(&self, op: SimOp, errno: Errno) {
        self.fail_nth(op, 0, errno);
    }

    /// Buffers mapped and not yet released
    pub fn live_mappings(&self) -> usize {
        lock(&self.state).live_mappings
    }

    /// Buffers currently allocated by `request_buffers`
    pub fn allocated(&self) -> u32 {
        lock(&self.state).allocated
    }

    /// Indices owned by the driver, in completion order
    pub fn queued(&self) -> Vec<u32> {
        lock(&self.state).queue.iter().copied().collect()
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    pub fn format(&self) -> Format {
        lock(&self.state).format
    }

    pub fn stream_params(&self) -> StreamParams {
        lock(&self.state).params
    }
}
