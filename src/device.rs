// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::Result,
    format::{FormatDescriptor, FourCC},
};
use std::{
    ffi::c_void,
    io, mem,
    os::raw::c_int,
    path::Path,
    ptr::null_mut,
    slice::from_raw_parts,
    sync::Arc,
};
use tracing::{debug, trace, warn};
use v4l::{
    buffer::Type,
    capability::Flags,
    device::Handle,
    memory::Memory,
    v4l2::{self, vidioc},
    v4l_sys::{v4l2_buffer, v4l2_requestbuffers},
    video::Capture,
    Device, Format,
};

/// Device feature flags reported once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    /// V4L2 capability bits of the opened device node.
    pub flags: u32,
}

impl Capabilities {
    pub fn supports_capture(&self) -> bool {
        self.flags & Flags::VIDEO_CAPTURE.bits() != 0
    }
}

/// Control surface of a memory-mapped streaming capture device.
///
/// Buffers are addressed by index. The device owns a buffer from `queue`
/// until that index is returned by `dequeue`.
pub trait DeviceControl {
    /// Memory backing one capture buffer.
    type Region: AsRef<[u8]>;

    fn query_capabilities(&self) -> Result<Capabilities>;

    /// Formats in the order the device advertises them.
    fn list_formats(&self) -> Result<Vec<FormatDescriptor>>;

    fn set_format(&self, format: &FormatDescriptor) -> Result<()>;

    /// Currently applied format. The `index` of the returned descriptor is
    /// advisory, negotiation resolves it against the advertised list.
    fn get_format(&self) -> Result<FormatDescriptor>;

    /// Requests `count` buffers and returns how many the device granted.
    /// A count of zero releases every buffer.
    fn allocate_buffers(&self, count: u32) -> Result<u32>;

    fn map_buffer(&self, index: u32) -> Result<Self::Region>;

    fn queue(&self, index: u32) -> Result<()>;

    /// Blocks until the device has filled a buffer. Returns the buffer index
    /// and the number of bytes the device wrote into it.
    fn dequeue(&self) -> Result<(u32, usize)>;

    fn set_streaming(&self, enable: bool) -> Result<()>;
}

/// Read-only view of a kernel capture buffer mapped into our address space.
///
/// The mapping is removed when dropped.
pub struct MappedRegion {
    mmap: *mut u8,
    len: usize,
}

impl MappedRegion {
    pub fn as_slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.mmap, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for MappedRegion {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Err(e) = unsafe { v4l2::munmap(self.mmap.cast::<c_void>(), self.len) } {
            warn!("unmap failed: {}", e);
        }
    }
}

/// V4L2 capture device node such as `/dev/video0`.
///
/// Format control goes through [`v4l::video::Capture`]. Buffers are driven
/// one index at a time with the raw streaming ioctls so that the pool keeps
/// ownership of every slot.
pub struct V4l2Device {
    device: Device,
    handle: Arc<Handle>,
    path: String,
}

impl V4l2Device {
    /// Opens the device node in blocking read-write mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::with_path(path)?;
        let handle = device.handle();
        debug!("opened {}", path.display());
        Ok(Self {
            device,
            handle,
            path: path.display().to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn fd(&self) -> c_int {
        self.handle.fd()
    }

    fn capture_buffer(index: u32) -> v4l2_buffer {
        v4l2_buffer {
            index,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            ..unsafe { mem::zeroed() }
        }
    }

    /// Issues a streaming ioctl on `arg`.
    fn ioctl<T>(&self, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        unsafe { v4l2::ioctl(self.fd(), request, (arg as *mut T).cast::<c_void>()) }
    }
}

impl DeviceControl for V4l2Device {
    type Region = MappedRegion;

    fn query_capabilities(&self) -> Result<Capabilities> {
        let caps = self.device.query_caps()?;
        Ok(Capabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            flags: caps.capabilities.bits(),
        })
    }

    fn list_formats(&self) -> Result<Vec<FormatDescriptor>> {
        // advertised encodings carry the currently configured frame size
        let current = self.device.format()?;
        Ok(self
            .device
            .enum_formats()?
            .into_iter()
            .map(|desc| {
                let tag = FourCC(desc.fourcc.repr);
                trace!("{}: {}", tag, desc.description);
                FormatDescriptor {
                    tag,
                    index: desc.index,
                    width: current.width,
                    height: current.height,
                    stride: 0,
                }
            })
            .collect())
    }

    fn set_format(&self, format: &FormatDescriptor) -> Result<()> {
        let fmt = Format::new(
            format.width,
            format.height,
            v4l::FourCC::new(format.tag.as_bytes()),
        );
        let applied = self.device.set_format(&fmt)?;
        trace!(
            "applied {}x{} {} stride {} size {}",
            applied.width,
            applied.height,
            applied.fourcc,
            applied.stride,
            applied.size
        );
        Ok(())
    }

    fn get_format(&self) -> Result<FormatDescriptor> {
        let fmt = self.device.format()?;
        Ok(FormatDescriptor {
            tag: FourCC(fmt.fourcc.repr),
            index: 0,
            width: fmt.width,
            height: fmt.height,
            stride: fmt.stride,
        })
    }

    fn allocate_buffers(&self, count: u32) -> Result<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: Type::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            ..unsafe { mem::zeroed() }
        };
        self.ioctl(vidioc::VIDIOC_REQBUFS, &mut req)?;
        debug!("requested {} buffers, granted {}", count, req.count);
        Ok(req.count)
    }

    fn map_buffer(&self, index: u32) -> Result<MappedRegion> {
        let mut buf = Self::capture_buffer(index);
        self.ioctl(vidioc::VIDIOC_QUERYBUF, &mut buf)?;

        let len = buf.length as usize;
        let offset = unsafe { buf.m.offset } as libc::off_t;
        let mmap = unsafe {
            v4l2::mmap(
                null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                offset,
            )
        }?;
        trace!("mapped buffer {} length {} offset {}", index, len, offset);
        Ok(MappedRegion {
            mmap: mmap.cast::<u8>(),
            len,
        })
    }

    fn queue(&self, index: u32) -> Result<()> {
        let mut buf = Self::capture_buffer(index);
        self.ioctl(vidioc::VIDIOC_QBUF, &mut buf)?;
        Ok(())
    }

    fn dequeue(&self) -> Result<(u32, usize)> {
        let mut buf = Self::capture_buffer(0);
        loop {
            match self.ioctl(vidioc::VIDIOC_DQBUF, &mut buf) {
                Ok(()) => break,
                // a signal woke the wait, the frame is still pending
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        trace!(
            "dequeued buffer {} sequence {} bytesused {}",
            buf.index,
            buf.sequence,
            buf.bytesused
        );
        Ok((buf.index, buf.bytesused as usize))
    }

    fn set_streaming(&self, enable: bool) -> Result<()> {
        let mut typ = Type::VideoCapture as c_int;
        if enable {
            self.ioctl(vidioc::VIDIOC_STREAMON, &mut typ)?;
        } else {
            self.ioctl(vidioc::VIDIOC_STREAMOFF, &mut typ)?;
        }
        debug!("streaming {}", if enable { "on" } else { "off" });
        Ok(())
    }
}
