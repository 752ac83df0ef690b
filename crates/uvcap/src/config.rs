// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;

use crate::driver::CaptureDriver;
use crate::fourcc::FourCC;
use crate::session::{Session, DEFAULT_BUFFER_COUNT};
use crate::v4l2::V4l2Driver;
use crate::Error;

/// Requested capture configuration
///
/// ```no_run
/// use uvcap::config::CaptureConfig;
/// use uvcap::fourcc::FourCC;
///
/// let mut session = CaptureConfig::default()
///     .with_device("/dev/video2")
///     .with_resolution(1280, 720)
///     .with_format(FourCC(*b"YUYV"))
///     .open()?;
/// session.stream_on()?;
/// # Ok::<(), uvcap::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// video device file for the camera
    device: String,

    /// requested width, must be confirmed exactly by the driver
    width: u32,

    /// requested height, must be confirmed exactly by the driver
    height: u32,

    /// requested pixel format
    format: FourCC,

    /// requested frame rate, the driver may round it
    fps: Option<u32>,

    /// number of capture buffers to allocate
    num_buffers: u32,
}

impl CaptureConfig {
    pub fn with_device(self, device: &str) -> CaptureConfig {
        CaptureConfig {
            device: device.to_owned(),
            ..self
        }
    }

    pub fn with_resolution(self, width: u32, height: u32) -> CaptureConfig {
        CaptureConfig {
            width,
            height,
            ..self
        }
    }

    pub fn with_format(self, format: FourCC) -> CaptureConfig {
        CaptureConfig { format, ..self }
    }

    /// `None` keeps whatever interval the driver currently uses
    pub fn with_framerate(self, fps: Option<u32>) -> CaptureConfig {
        CaptureConfig { fps, ..self }
    }

    pub fn with_buffers(self, num_buffers: u32) -> CaptureConfig {
        CaptureConfig {
            num_buffers,
            ..self
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> FourCC {
        self.format
    }

    pub fn fps(&self) -> Option<u32> {
        self.fps
    }

    pub fn num_buffers(&self) -> u32 {
        self.num_buffers
    }

    /// Opens the device and applies the configuration.
    ///
    /// The returned session is configured but not streaming.
    pub fn open(&self) -> Result<Session<V4l2Driver>, Error> {
        let session = Session::open(&self.device)?;
        self.apply(session)
    }

    /// Applies the configuration over an already opened driver.
    pub fn open_with_driver<D: CaptureDriver>(&self, driver: D) -> Result<Session<D>, Error> {
        self.apply(Session::with_driver(self.device.as_str(), driver))
    }

    fn apply<D: CaptureDriver>(&self, mut session: Session<D>) -> Result<Session<D>, Error> {
        session.set_buffer_count(self.num_buffers)?;
        session.set_format(self.width, self.height, self.format)?;
        if let Some(fps) = self.fps {
            session.set_framerate(fps)?;
        }
        Ok(session)
    }
}

impl Default for CaptureConfig {
    fn default() -> CaptureConfig {
        CaptureConfig {
            device: "/dev/video0".to_owned(),
            width: 640,
            height: 480,
            format: FourCC(*b"MJPG"),
            fps: Some(30),
            num_buffers: DEFAULT_BUFFER_COUNT,
        }
    }
}

impl fmt::Display for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}x{} {}",
            self.device, self.width, self.height, self.format
        )?;
        if let Some(fps) = self.fps {
            write!(f, " @{}fps", fps)?;
        }
        write!(f, " x{}", self.num_buffers)
    }
}
