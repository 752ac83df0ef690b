// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Kernel control surface consumed by a capture session
//!
//! [`CaptureDriver`] is the fixed set of calls a
//! [`Session`](crate::session::Session) makes: format and parameter
//! negotiation, buffer allocation, memory mapping, queue/dequeue and
//! stream on/off. [`V4l2Driver`](crate::v4l2::V4l2Driver) implements it
//! with ioctls on a device node and
//! [`SimDriver`](crate::sim::SimDriver) implements it in memory.
//!
//! Every call returns [`io::Result`] so the system error code survives up
//! to the caller.

use std::{fmt, io, time::Duration};

use uvcap_sys as sys;

use crate::device::{Capabilities, FormatDescription};
use crate::fourcc::FourCC;

/// Negotiated capture geometry and pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCC,
}

impl Format {
    pub fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            width,
            height,
            fourcc,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.fourcc)
    }
}

/// Frame interval in seconds as `numerator / denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Interval of one frame at `fps` frames per second
    pub fn from_fps(fps: u32) -> Self {
        Self::new(1, fps)
    }

    /// Frames per second, 0.0 for an unset interval
    pub fn fps(&self) -> f64 {
        if self.numerator == 0 {
            0.0
        } else {
            f64::from(self.denominator) / f64::from(self.numerator)
        }
    }

    /// The interval as a duration, `None` when the denominator is zero
    pub fn as_duration(&self) -> Option<Duration> {
        if self.denominator == 0 {
            return None;
        }
        let nanos = u64::from(self.numerator) * 1_000_000_000 / u64::from(self.denominator);
        Some(Duration::from_nanos(nanos))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Capture streaming parameters (`v4l2_captureparm`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamParams {
    pub capability: u32,
    pub capture_mode: u32,
    pub time_per_frame: Fraction,
    pub extended_mode: u32,
    pub read_buffers: u32,
}

impl StreamParams {
    /// True when the driver advertises `V4L2_CAP_TIMEPERFRAME`
    pub fn supports_time_per_frame(&self) -> bool {
        self.capability & sys::V4L2_CAP_TIMEPERFRAME != 0
    }
}

/// Geometry of one kernel buffer as returned by `VIDIOC_QUERYBUF`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub index: u32,
    pub length: u32,
    /// Offset token to pass to mmap
    pub offset: u32,
}

/// A filled buffer handed back by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: u32,
    pub bytes_used: u32,
    pub timestamp: Duration,
    pub sequence: u32,
    pub flags: u32,
}

/// A kernel buffer mapped into the process
///
/// The mapping lives exactly as long as the value; dropping it releases
/// the mapping.
pub trait MappedRegion {
    fn as_slice(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }
}

/// The control calls a capture session makes against a device
pub trait CaptureDriver {
    type Region: MappedRegion;

    fn capabilities(&mut self) -> io::Result<Capabilities>;

    fn enum_formats(&mut self) -> io::Result<Vec<FormatDescription>>;

    fn set_format(&mut self, format: &Format) -> io::Result<()>;

    fn get_format(&mut self) -> io::Result<Format>;

    fn get_stream_params(&mut self) -> io::Result<StreamParams>;

    /// Writes the parameters and returns what the driver actually applied.
    fn set_stream_params(&mut self, params: &StreamParams) -> io::Result<StreamParams>;

    /// Requests `count` memory-mapped capture buffers and returns how many
    /// the driver granted. A count of zero releases the allocation.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo>;

    fn map(&mut self, info: &BufferInfo) -> io::Result<Self::Region>;

    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Blocks until the driver hands back a filled buffer.
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    /// Waits up to `timeout` for a filled buffer; `Ok(false)` on timeout.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;
}
