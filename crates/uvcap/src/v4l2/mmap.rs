// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::{ffi::c_void, fmt, io, num::NonZeroUsize, os::fd::RawFd, ptr::NonNull, slice};

use nix::libc::off_t;
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

use crate::driver::MappedRegion;

/// A kernel capture buffer mapped shared into the process
///
/// Unmapped on drop.
pub struct MmapRegion {
    ptr: NonNull<c_void>,
    len: usize,
}

// SAFETY: the region is plain shared memory with no thread affinity; the
// session serialises access through buffer ownership.
unsafe impl Send for MmapRegion {}

impl MmapRegion {
    pub(crate) fn map(fd: RawFd, length: u32, offset: u32) -> io::Result<Self> {
        let len = NonZeroUsize::new(length as usize).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "driver reported a zero-length buffer",
            )
        })?;
        let offset = off_t::try_from(offset)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        // SAFETY: a fresh mapping chosen by the kernel (addr = None) cannot
        // alias existing memory; fd is the open device the offset token
        // came from.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                offset,
            )
        }?;

        let ptr = NonNull::new(ptr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;

        Ok(MmapRegion {
            ptr,
            len: len.get(),
        })
    }
}

impl MappedRegion for MmapRegion {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr..ptr+len stays mapped until drop
        unsafe { slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: the region was returned by mmap with this length and no
        // slice borrowed from it can outlive self
        if let Err(err) = unsafe { munmap(self.ptr.as_ptr(), self.len) } {
            log::warn!("munmap of {} bytes at {:?} failed: {}", self.len, self.ptr, err);
        }
    }
}

impl fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmapRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
