// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! V4L2 device node driver
//!
//! [`V4l2Driver`] implements [`CaptureDriver`](crate::driver::CaptureDriver)
//! with the single-planar, memory-mapped streaming I/O path of the V4L2
//! API:
//!
//! | Session step | ioctl |
//! |--------------|-------|
//! | negotiate format | `VIDIOC_S_FMT`, then `VIDIOC_G_FMT` |
//! | frame rate | `VIDIOC_G_PARM`, then `VIDIOC_S_PARM` |
//! | allocate | `VIDIOC_REQBUFS`, `VIDIOC_QUERYBUF` |
//! | map | `mmap(PROT_READ \| PROT_WRITE, MAP_SHARED)` |
//! | exchange | `VIDIOC_QBUF`, `VIDIOC_DQBUF` |
//! | stream | `VIDIOC_STREAMON`, `VIDIOC_STREAMOFF` |
//!
//! See <https://docs.kernel.org/userspace-api/media/v4l/mmap.html>.
//!
//! # Cancellation
//!
//! `VIDIOC_DQBUF` on a blocking descriptor has no timeout. Pass a timeout
//! to [`Session::dequeue_frame`](crate::session::Session::dequeue_frame) to
//! poll first. Without one, a dequeue blocks for as long as the device
//! produces no frame, possibly forever on an unplugged or stalled camera.

mod driver;
mod mmap;

pub use driver::V4l2Driver;
pub use mmap::MmapRegion;
