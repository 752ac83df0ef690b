// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! uvcap - V4L2 capture sessions for Rust
//!
//! A small userspace capture driver for V4L2 video devices such as UVC
//! webcams. A [`Session`](session::Session) opens a device node, negotiates
//! the pixel format and frame rate, maps a fixed pool of kernel capture
//! buffers into the process and hands them back and forth with the kernel
//! while streaming.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use uvcap::fourcc::FourCC;
//! use uvcap::session::Session;
//!
//! let mut session = Session::open("/dev/video0")?;
//! session.set_format(640, 480, FourCC(*b"MJPG"))?;
//! session.set_framerate(30)?;
//! session.stream_on()?;
//!
//! for _ in 0..100 {
//!     let frame = session.dequeue_frame(Some(Duration::from_secs(2)))?;
//!     let data = session.frame_data(&frame)?;
//!     println!("slot {} {} bytes at {:?}", frame.index(), data.len(), frame.timestamp());
//!     session.queue_frame(frame)?;
//! }
//!
//! session.stream_off()?;
//! session.close();
//! # Ok::<(), uvcap::Error>(())
//! ```
//!
//! # Buffer ownership
//!
//! Every buffer slot is owned either by the kernel (queued, the driver may
//! DMA into it) or by the caller (dequeued, readable through
//! [`Session::frame_data`](session::Session::frame_data)). Ownership only
//! moves through `dequeue_frame` and `queue_frame`; a
//! [`Frame`](session::Frame) is a lookup key into the session, never an
//! owner of memory.
//!
//! # Support
//!
//! - Repository: <https://github.com/EdgeFirstAI/uvcap>
//! - Professional support: support@au-zone.com

use std::{error, fmt, io};

use driver::Format;

/// Error type for capture session operations
///
/// Every variant that originates in a kernel call carries the
/// [`io::Error`] built from the system error code, see
/// [`Error::raw_os_error`].
#[derive(Debug)]
pub enum Error {
    /// The device node could not be opened (missing, permission, busy)
    DeviceUnavailable(io::Error),

    /// The driver rejected the format, or confirmed different values than requested
    UnsupportedFormat {
        requested: Format,
        confirmed: Option<Format>,
        source: Option<io::Error>,
    },

    /// The driver rejected the streaming parameters
    UnsupportedFramerate(io::Error),

    /// Requesting or querying the kernel buffer pool failed
    AllocationFailed(io::Error),

    /// A kernel buffer could not be mapped into the process
    MapFailed(io::Error),

    /// Handing the buffers to the kernel or starting the stream failed
    StreamStartFailed(io::Error),

    /// The stream-stop control call failed
    StreamStopFailed(io::Error),

    /// Waiting for or dequeuing a filled buffer failed
    DequeueFailed(io::Error),

    /// Returning a buffer to the kernel failed
    QueueFailed(io::Error),

    /// The call is not valid in the session's current state
    InvalidState(&'static str),

    /// An argument can never be valid
    InvalidArgument(String),

    /// `get_format` was called before a successful `set_format`
    NotConfigured,

    /// Any other device query failed
    Io(io::Error),
}

impl Error {
    /// The system error code reported by the kernel, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    /// The underlying I/O error, if any
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Error::DeviceUnavailable(err)
            | Error::UnsupportedFramerate(err)
            | Error::AllocationFailed(err)
            | Error::MapFailed(err)
            | Error::StreamStartFailed(err)
            | Error::StreamStopFailed(err)
            | Error::DequeueFailed(err)
            | Error::QueueFailed(err)
            | Error::Io(err) => Some(err),
            Error::UnsupportedFormat { source, .. } => source.as_ref(),
            Error::InvalidState(_) | Error::InvalidArgument(_) | Error::NotConfigured => None,
        }
    }

    /// True when a dequeue gave up because its timeout expired
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::DequeueFailed(err) if err.kind() == io::ErrorKind::TimedOut)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DeviceUnavailable(err) => write!(f, "device unavailable: {}", err),
            Error::UnsupportedFormat {
                requested,
                confirmed: Some(confirmed),
                ..
            } => write!(
                f,
                "unsupported format: requested {} but driver confirmed {}",
                requested, confirmed
            ),
            Error::UnsupportedFormat {
                requested,
                source: Some(err),
                ..
            } => write!(f, "unsupported format {}: {}", requested, err),
            Error::UnsupportedFormat { requested, .. } => {
                write!(f, "unsupported format {}", requested)
            }
            Error::UnsupportedFramerate(err) => write!(f, "unsupported frame rate: {}", err),
            Error::AllocationFailed(err) => write!(f, "buffer allocation failed: {}", err),
            Error::MapFailed(err) => write!(f, "buffer mapping failed: {}", err),
            Error::StreamStartFailed(err) => write!(f, "stream start failed: {}", err),
            Error::StreamStopFailed(err) => write!(f, "stream stop failed: {}", err),
            Error::DequeueFailed(err) => write!(f, "dequeue failed: {}", err),
            Error::QueueFailed(err) => write!(f, "queue failed: {}", err),
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::NotConfigured => write!(f, "format has not been negotiated"),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.io_error()
            .map(|err| err as &(dyn error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

/// The config module provides a builder that opens and configures a session.
pub mod config;

/// The device module describes what a capture device reports about itself.
pub mod device;

/// The driver module defines the kernel control surface a session drives.
pub mod driver;

/// The fourcc module provides portable handling of fourcc codes.
pub mod fourcc;

/// The session module implements the capture buffer lifecycle.
pub mod session;

/// In-memory capture driver for tests and offline development.
pub mod sim;

/// The v4l2 module implements the driver over a real device node.
pub mod v4l2;

pub use config::CaptureConfig;
pub use session::{Frame, Session};
