// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Capture device descriptors
//!
//! - [`DeviceType`] - Classification of a device node from its capabilities
//! - [`Capabilities`] - Identity and capability flags from `VIDIOC_QUERYCAP`
//! - [`FormatDescription`] - One entry of `VIDIOC_ENUM_FMT`

use std::ffi::CStr;
use std::fmt;

use uvcap_sys as sys;

use crate::fourcc::FourCC;

/// Device node classification
///
/// UVC webcams usually expose two nodes per camera: one that captures
/// frames and one that only carries metadata. Only [`DeviceType::Camera`]
/// nodes can be streamed by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Single-planar video capture with streaming I/O
    Camera,

    /// Multi-planar capture, not supported by the session
    MultiplanarCamera,

    /// Anything else (metadata nodes, outputs, codecs)
    Other,
}

impl DeviceType {
    /// Get human-readable name for this device type
    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::Camera => "Camera",
            DeviceType::MultiplanarCamera => "Multiplanar Camera",
            DeviceType::Other => "Other",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identity and capabilities reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Driver name (e.g. "uvcvideo")
    pub driver: String,
    /// Card/device name (e.g. "HD Pro Webcam C920")
    pub card: String,
    /// Bus information (e.g. "usb-0000:00:14.0-1")
    pub bus_info: String,
    /// Kernel version the driver was built for, `KERNEL_VERSION` packed
    pub version: u32,
    /// Capabilities of the physical device as a whole
    pub capabilities: u32,
    /// Capabilities of this device node
    pub device_caps: u32,
}

impl Capabilities {
    pub(crate) fn from_raw(cap: &sys::V4l2Capability) -> Self {
        Capabilities {
            driver: c_string(&cap.driver),
            card: c_string(&cap.card),
            bus_info: c_string(&cap.bus_info),
            version: cap.version,
            capabilities: cap.capabilities,
            device_caps: cap.device_caps,
        }
    }

    /// Capability flags for this node, falling back to the physical
    /// device flags on drivers that predate `V4L2_CAP_DEVICE_CAPS`.
    pub fn node_caps(&self) -> u32 {
        if self.capabilities & sys::V4L2_CAP_DEVICE_CAPS != 0 {
            self.device_caps
        } else {
            self.capabilities
        }
    }

    pub fn device_type(&self) -> DeviceType {
        let caps = self.node_caps();
        if caps & sys::V4L2_CAP_VIDEO_CAPTURE != 0 {
            DeviceType::Camera
        } else if caps & sys::V4L2_CAP_VIDEO_CAPTURE_MPLANE != 0 {
            DeviceType::MultiplanarCamera
        } else {
            DeviceType::Other
        }
    }

    /// True when the node supports `VIDIOC_QBUF`/`VIDIOC_DQBUF` streaming
    pub fn supports_streaming(&self) -> bool {
        self.node_caps() & sys::V4L2_CAP_STREAMING != 0
    }

    /// Driver version as "major.minor.patch"
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.version >> 16) & 0xff,
            (self.version >> 8) & 0xff,
            self.version & 0xff
        )
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) on {} - {}",
            self.card,
            self.driver,
            self.bus_info,
            self.device_type()
        )
    }
}

/// Pixel format supported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescription {
    /// Four-character code (e.g., "YUYV", "MJPG")
    pub fourcc: FourCC,
    /// Human-readable description from driver
    pub description: String,
    /// Whether this is a compressed format
    pub compressed: bool,
}

impl FormatDescription {
    pub(crate) fn from_raw(desc: &sys::V4l2Fmtdesc) -> Self {
        FormatDescription {
            fourcc: FourCC::from_u32(desc.pixel_format),
            description: c_string(&desc.description),
            compressed: desc.flags & sys::V4L2_FMT_FLAG_COMPRESSED != 0,
        }
    }

    /// Name from the built-in table, or the driver's description.
    pub fn display_name(&self) -> &str {
        self.fourcc.name().unwrap_or(&self.description)
    }
}

impl fmt::Display for FormatDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fourcc, self.display_name())?;
        if self.compressed {
            write!(f, " (compressed)")?;
        }
        Ok(())
    }
}

fn c_string(buf: &[u8]) -> String {
    match CStr::from_bytes_until_nul(buf) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(buf).into_owned(),
    }
}
