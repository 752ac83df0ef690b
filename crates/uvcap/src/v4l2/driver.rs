// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{
    fs::File,
    io, mem,
    os::{
        fd::{AsRawFd, RawFd},
        raw::c_int,
    },
    path::Path,
    time::Duration,
};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use uvcap_sys as sys;

use super::MmapRegion;
use crate::device::{Capabilities, FormatDescription};
use crate::driver::{BufferInfo, CaptureDriver, DequeuedBuffer, Format, Fraction, StreamParams};
use crate::fourcc::FourCC;

const BUF_TYPE: u32 = sys::V4L2_BUF_TYPE_VIDEO_CAPTURE;

/// Capture driver over an open V4L2 device node
///
/// Owns the file descriptor; it is closed when the driver is dropped.
#[derive(Debug)]
pub struct V4l2Driver {
    file: File,
}

impl V4l2Driver {
    /// Opens the device node read-write in blocking mode.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(V4l2Driver { file })
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn buffer(index: u32) -> sys::V4l2Buffer {
        // SAFETY: v4l2_buffer is plain data; all-zero is a valid value
        let mut buf: sys::V4l2Buffer = unsafe { mem::zeroed() };
        buf.index = index;
        buf.typ = BUF_TYPE;
        buf.memory = sys::V4L2_MEMORY_MMAP;
        buf
    }
}

impl AsRawFd for V4l2Driver {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}

impl CaptureDriver for V4l2Driver {
    type Region = MmapRegion;

    fn capabilities(&mut self) -> io::Result<Capabilities> {
        // SAFETY: zeroed plain data, filled in by the kernel
        let mut cap: sys::V4l2Capability = unsafe { mem::zeroed() };
        unsafe { sys::vidioc_querycap(self.fd(), &mut cap) }?;
        Ok(Capabilities::from_raw(&cap))
    }

    fn enum_formats(&mut self) -> io::Result<Vec<FormatDescription>> {
        let mut formats = Vec::new();
        for index in 0.. {
            // SAFETY: zeroed plain data, filled in by the kernel
            let mut desc: sys::V4l2Fmtdesc = unsafe { mem::zeroed() };
            desc.index = index;
            desc.typ = BUF_TYPE;
            match unsafe { sys::vidioc_enum_fmt(self.fd(), &mut desc) } {
                Ok(_) => formats.push(FormatDescription::from_raw(&desc)),
                // EINVAL returned after last index
                Err(Errno::EINVAL) => break,
                Err(errno) => return Err(errno.into()),
            }
        }
        Ok(formats)
    }

    fn set_format(&mut self, format: &Format) -> io::Result<()> {
        // SAFETY: zeroed plain data
        let mut fmt: sys::V4l2Format = unsafe { mem::zeroed() };
        fmt.typ = BUF_TYPE;
        fmt.fmt.pix = sys::V4l2PixFormat {
            width: format.width,
            height: format.height,
            pixel_format: format.fourcc.as_u32(),
            field: sys::V4L2_FIELD_ANY,
            bytes_per_line: 0,
            size_image: 0,
            colorspace: 0,
            priv_: 0,
            flags: 0,
            ycbcr_enc: 0,
            quantization: 0,
            xfer_func: 0,
        };
        unsafe { sys::vidioc_s_fmt(self.fd(), &mut fmt) }?;
        Ok(())
    }

    fn get_format(&mut self) -> io::Result<Format> {
        // SAFETY: zeroed plain data, filled in by the kernel
        let mut fmt: sys::V4l2Format = unsafe { mem::zeroed() };
        fmt.typ = BUF_TYPE;
        unsafe { sys::vidioc_g_fmt(self.fd(), &mut fmt) }?;
        // SAFETY: the kernel fills the pix member for VIDEO_CAPTURE
        let pix = unsafe { fmt.fmt.pix };
        Ok(Format::new(
            pix.width,
            pix.height,
            FourCC::from_u32(pix.pixel_format),
        ))
    }

    fn get_stream_params(&mut self) -> io::Result<StreamParams> {
        // SAFETY: zeroed plain data, filled in by the kernel
        let mut parm: sys::V4l2StreamParm = unsafe { mem::zeroed() };
        parm.typ = BUF_TYPE;
        unsafe { sys::vidioc_g_parm(self.fd(), &mut parm) }?;
        // SAFETY: the kernel fills the capture member for VIDEO_CAPTURE
        Ok(stream_params(&unsafe { parm.parm.capture }))
    }

    fn set_stream_params(&mut self, params: &StreamParams) -> io::Result<StreamParams> {
        // SAFETY: zeroed plain data
        let mut parm: sys::V4l2StreamParm = unsafe { mem::zeroed() };
        parm.typ = BUF_TYPE;
        parm.parm.capture = sys::V4l2CaptureParm {
            capability: params.capability,
            capture_mode: params.capture_mode,
            time_per_frame: sys::V4l2Fract {
                numerator: params.time_per_frame.numerator,
                denominator: params.time_per_frame.denominator,
            },
            extended_mode: params.extended_mode,
            read_buffers: params.read_buffers,
            reserved: [0; 4],
        };
        unsafe { sys::vidioc_s_parm(self.fd(), &mut parm) }?;
        // SAFETY: the kernel writes back the applied capture parameters
        Ok(stream_params(&unsafe { parm.parm.capture }))
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        let mut req = sys::V4l2RequestBuffers {
            count,
            typ: BUF_TYPE,
            memory: sys::V4L2_MEMORY_MMAP,
            capabilities: 0,
            flags: 0,
            reserved: [0; 3],
        };
        unsafe { sys::vidioc_reqbufs(self.fd(), &mut req) }?;
        Ok(req.count)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let mut buf = Self::buffer(index);
        unsafe { sys::vidioc_querybuf(self.fd(), &mut buf) }?;
        Ok(BufferInfo {
            index: buf.index,
            length: buf.length,
            // SAFETY: the kernel fills m.offset for MMAP buffers
            offset: unsafe { buf.m.offset },
        })
    }

    fn map(&mut self, info: &BufferInfo) -> io::Result<MmapRegion> {
        MmapRegion::map(self.fd(), info.length, info.offset)
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        let mut buf = Self::buffer(index);
        unsafe { sys::vidioc_qbuf(self.fd(), &mut buf) }?;
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let mut buf = Self::buffer(0);
        unsafe { sys::vidioc_dqbuf(self.fd(), &mut buf) }?;

        // Driver timestamps are CLOCK_MONOTONIC and never negative in practice
        let secs = buf.timestamp.tv_sec.max(0) as u64;
        let nanos = (buf.timestamp.tv_usec.max(0) as u32).saturating_mul(1000);

        Ok(DequeuedBuffer {
            index: buf.index,
            bytes_used: buf.bytes_used,
            timestamp: Duration::new(secs, nanos),
            sequence: buf.sequence,
            flags: buf.flags,
        })
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = c_int::try_from(poll_millis(timeout)).unwrap_or(c_int::MAX);
        let mut fds = [PollFd::new(self.fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, millis)?;
        if ready == 0 {
            return Ok(false);
        }
        let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
        if revents.contains(PollFlags::POLLERR) {
            // vb2 reports POLLERR when nothing is queued or streaming stopped
            return Err(io::Error::from_raw_os_error(nix::libc::EIO));
        }
        Ok(revents.contains(PollFlags::POLLIN))
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let typ = BUF_TYPE as c_int;
        unsafe { sys::vidioc_streamon(self.fd(), &typ) }?;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let typ = BUF_TYPE as c_int;
        unsafe { sys::vidioc_streamoff(self.fd(), &typ) }?;
        Ok(())
    }
}

fn stream_params(capture: &sys::V4l2CaptureParm) -> StreamParams {
    StreamParams {
        capability: capture.capability,
        capture_mode: capture.capture_mode,
        time_per_frame: Fraction::new(
            capture.time_per_frame.numerator,
            capture.time_per_frame.denominator,
        ),
        extended_mode: capture.extended_mode,
        read_buffers: capture.read_buffers,
    }
}

/// Milliseconds to hand to `poll(2)`, rounded up so a short timeout still waits
fn poll_millis(timeout: Duration) -> u128 {
    timeout.as_nanos().saturating_add(999_999) / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_poll_millis_rounds_up() {
        assert_eq!(poll_millis(Duration::ZERO), 0);
        assert_eq!(poll_millis(Duration::from_nanos(1)), 1);
        assert_eq!(poll_millis(Duration::from_micros(500)), 1);
        assert_eq!(poll_millis(Duration::from_millis(2)), 2);
        assert_eq!(poll_millis(Duration::from_micros(2001)), 3);
        assert_eq!(poll_millis(Duration::MAX), Duration::MAX.as_millis() + 1);
    }

    #[test]
    fn test_open_missing_device() {
        let err = V4l2Driver::open("/dev/this-video-device-does-not-exist").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[ignore = "test requires a V4L2 camera at /dev/video0 (run with --include-ignored to enable)"]
    #[test]
    #[serial]
    fn test_query_camera() -> io::Result<()> {
        let mut driver = V4l2Driver::open("/dev/video0")?;
        let caps = driver.capabilities()?;
        println!("camera: {}", caps);
        let formats = driver.enum_formats()?;
        println!("formats: {:?}", formats);
        assert_ne!(formats.len(), 0);
        let fmt = driver.get_format()?;
        assert_ne!(fmt.width, 0);
        Ok(())
    }
}
