// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Raw V4L2 kernel interface used by `uvcap`.
//!
//! The structures mirror `linux/videodev2.h` for the single-planar
//! memory-mapped capture path and nothing more. Every ioctl wrapper is
//! generated by the `nix` ioctl macros and is `unsafe` to call; the safe
//! layer lives in the `uvcap` crate.
//!
//! See <https://docs.kernel.org/userspace-api/media/v4l/user-func.html>.

#![allow(non_upper_case_globals)]
#![allow(clippy::missing_safety_doc)]

use std::os::raw::{c_int, c_ulong, c_void};

// Re-export nix so callers can name the errno type of the wrappers
pub use nix;
pub use nix::libc::timeval;

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;
pub const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;
pub const V4L2_CAP_DEVICE_CAPS: u32 = 0x8000_0000;

/// Most buffers a vb2 queue will allocate
pub const VIDEO_MAX_FRAME: u32 = 32;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_FIELD_ANY: u32 = 0;

pub const V4L2_FMT_FLAG_COMPRESSED: u32 = 0x0001;
pub const V4L2_CAP_TIMEPERFRAME: u32 = 0x1000;

pub const V4L2_BUF_FLAG_MAPPED: u32 = 0x0000_0001;
pub const V4L2_BUF_FLAG_QUEUED: u32 = 0x0000_0002;
pub const V4L2_BUF_FLAG_DONE: u32 = 0x0000_0004;
pub const V4L2_BUF_FLAG_ERROR: u32 = 0x0000_0040;
pub const V4L2_BUF_FLAG_TIMESTAMP_MONOTONIC: u32 = 0x0000_2000;

const VIDIOC: u8 = b'V';
const VIDIOC_QUERYCAP: u8 = 0;
const VIDIOC_ENUM_FMT: u8 = 2;
const VIDIOC_G_FMT: u8 = 4;
const VIDIOC_S_FMT: u8 = 5;
const VIDIOC_REQBUFS: u8 = 8;
const VIDIOC_QUERYBUF: u8 = 9;
const VIDIOC_QBUF: u8 = 15;
const VIDIOC_DQBUF: u8 = 17;
const VIDIOC_STREAMON: u8 = 18;
const VIDIOC_STREAMOFF: u8 = 19;
const VIDIOC_G_PARM: u8 = 21;
const VIDIOC_S_PARM: u8 = 22;

// https://docs.kernel.org/userspace-api/media/v4l/vidioc-querycap.html

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

nix::ioctl_read!(vidioc_querycap, VIDIOC, VIDIOC_QUERYCAP, V4l2Capability);

// https://docs.kernel.org/userspace-api/media/v4l/vidioc-enum-fmt.html

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2Fmtdesc {
    pub index: u32,
    pub typ: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixel_format: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

nix::ioctl_readwrite!(vidioc_enum_fmt, VIDIOC, VIDIOC_ENUM_FMT, V4l2Fmtdesc);

// https://docs.kernel.org/userspace-api/media/v4l/vidioc-g-fmt.html

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2PixFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: u32,
    pub field: u32,
    pub bytes_per_line: u32,
    pub size_image: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

/// The kernel union also holds `v4l2_window`, which carries pointers, so
/// the union is pointer aligned.
#[repr(C)]
#[derive(Clone, Copy)]
pub union V4l2FormatUnion {
    pub pix: V4l2PixFormat,
    pub raw_data: [u8; 200],
    _align: [usize; 0],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Format {
    pub typ: u32,
    pub fmt: V4l2FormatUnion,
}

nix::ioctl_readwrite!(vidioc_g_fmt, VIDIOC, VIDIOC_G_FMT, V4l2Format);
nix::ioctl_readwrite!(vidioc_s_fmt, VIDIOC, VIDIOC_S_FMT, V4l2Format);

// https://docs.kernel.org/userspace-api/media/v4l/vidioc-reqbufs.html

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2RequestBuffers {
    pub count: u32,
    pub typ: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

nix::ioctl_readwrite!(vidioc_reqbufs, VIDIOC, VIDIOC_REQBUFS, V4l2RequestBuffers);

// https://docs.kernel.org/userspace-api/media/v4l/buffer.html

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2Timecode {
    pub typ: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union V4l2BufferM {
    pub offset: u32,
    pub userptr: c_ulong,
    pub planes: *mut c_void,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2Buffer {
    pub index: u32,
    pub typ: u32,
    pub bytes_used: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: timeval,
    pub timecode: V4l2Timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: V4l2BufferM,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

nix::ioctl_readwrite!(vidioc_querybuf, VIDIOC, VIDIOC_QUERYBUF, V4l2Buffer);
nix::ioctl_readwrite!(vidioc_qbuf, VIDIOC, VIDIOC_QBUF, V4l2Buffer);
nix::ioctl_readwrite!(vidioc_dqbuf, VIDIOC, VIDIOC_DQBUF, V4l2Buffer);

// https://docs.kernel.org/userspace-api/media/v4l/vidioc-streamon.html

nix::ioctl_write_ptr!(vidioc_streamon, VIDIOC, VIDIOC_STREAMON, c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, VIDIOC, VIDIOC_STREAMOFF, c_int);

// https://docs.kernel.org/userspace-api/media/v4l/vidioc-g-parm.html

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2Fract {
    pub numerator: u32,
    pub denominator: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct V4l2CaptureParm {
    pub capability: u32,
    pub capture_mode: u32,
    pub time_per_frame: V4l2Fract,
    pub extended_mode: u32,
    pub read_buffers: u32,
    pub reserved: [u32; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union V4l2StreamParmUnion {
    pub capture: V4l2CaptureParm,
    pub raw_data: [u8; 200],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct V4l2StreamParm {
    pub typ: u32,
    pub parm: V4l2StreamParmUnion,
}

nix::ioctl_readwrite!(vidioc_g_parm, VIDIOC, VIDIOC_G_PARM, V4l2StreamParm);
nix::ioctl_readwrite!(vidioc_s_parm, VIDIOC, VIDIOC_S_PARM, V4l2StreamParm);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_struct_sizes_match_kernel_abi() {
        assert_eq!(size_of::<V4l2Capability>(), 104);
        assert_eq!(size_of::<V4l2Fmtdesc>(), 64);
        assert_eq!(size_of::<V4l2PixFormat>(), 48);
        assert_eq!(size_of::<V4l2RequestBuffers>(), 20);
        assert_eq!(size_of::<V4l2StreamParm>(), 204);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_pointer_sized_structs_64bit() {
        assert_eq!(size_of::<V4l2Format>(), 208);
        assert_eq!(size_of::<V4l2Buffer>(), 88);
    }
}
