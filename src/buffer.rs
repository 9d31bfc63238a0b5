// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    device::DeviceControl,
    error::{Error, Result},
    format::FormatDescriptor,
};
use tracing::{debug, error, trace};

/// Ownership of a capture buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// Allocated and mapped but neither queued nor held.
    Free,
    /// Submitted to the device, which may write into it.
    Queued,
    /// Dequeued and held by the application for reading.
    Owned,
}

struct Buffer<R> {
    region: R,
    state: BufferState,
}

/// Proof of ownership of one dequeued buffer.
///
/// Only [`Streaming::dequeue`] creates tokens and [`Streaming::requeue`]
/// consumes them, so a buffer cannot be requeued twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a dequeued buffer must be requeued"]
pub struct BufferToken {
    index: u32,
}

impl BufferToken {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Borrowed view of one raw frame inside an owned capture buffer.
pub struct RawFrame<'a> {
    data: &'a [u8],
    format: &'a FormatDescriptor,
}

impl<'a> RawFrame<'a> {
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn format(&self) -> &'a FormatDescriptor {
        self.format
    }

    /// Copies the frame out of device memory.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

/// Fixed arena of memory-mapped capture buffers, addressed by index.
pub struct BufferPool<'d, D: DeviceControl> {
    device: &'d D,
    buffers: Vec<Buffer<D::Region>>,
    frame_size: usize,
}

impl<'d, D: DeviceControl> BufferPool<'d, D> {
    /// Requests `count` buffers from the device and maps each of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientBuffers`] when fewer than two buffers are
    /// requested or granted, and [`Error::BufferTooSmall`] when a mapped
    /// region cannot hold `frame_size` bytes.
    pub fn allocate(device: &'d D, count: u32, frame_size: usize) -> Result<Self> {
        if count < 2 {
            return Err(Error::InsufficientBuffers { count });
        }

        let granted = device.allocate_buffers(count)?;
        if granted < 2 {
            if granted > 0 {
                device.allocate_buffers(0)?;
            }
            return Err(Error::InsufficientBuffers { count: granted });
        }
        debug!("allocated {} of {} requested buffers", granted, count);

        let mut pool = Self {
            device,
            buffers: Vec::with_capacity(granted as usize),
            frame_size,
        };
        // on failure dropping the partial pool unmaps and releases
        for index in 0..granted {
            let region = device.map_buffer(index)?;
            let length = region.as_ref().len();
            if length < frame_size {
                return Err(Error::BufferTooSmall {
                    index,
                    length,
                    required: frame_size,
                });
            }
            pool.buffers.push(Buffer {
                region,
                state: BufferState::Free,
            });
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn state(&self, index: u32) -> Option<BufferState> {
        self.buffers.get(index as usize).map(|b| b.state)
    }

    pub fn states(&self) -> Vec<BufferState> {
        self.buffers.iter().map(|b| b.state).collect()
    }

    /// Submits every free buffer to the device.
    pub fn enqueue_all(&mut self) -> Result<()> {
        for (index, buf) in self.buffers.iter_mut().enumerate() {
            if buf.state == BufferState::Free {
                self.device.queue(index as u32)?;
                buf.state = BufferState::Queued;
            }
        }
        Ok(())
    }

    /// Enables streaming. Streaming stays enabled until the returned guard
    /// is stopped or dropped.
    pub fn start(&mut self) -> Result<Streaming<'_, 'd, D>> {
        self.device.set_streaming(true)?;
        Ok(Streaming {
            pool: self,
            active: true,
        })
    }

    fn halt(&mut self) -> Result<()> {
        // streamoff implicitly dequeues every outstanding buffer
        let result = self.device.set_streaming(false);
        for buf in &mut self.buffers {
            buf.state = BufferState::Free;
        }
        result
    }
}

impl<D: DeviceControl> Drop for BufferPool<'_, D> {
    fn drop(&mut self) {
        // regions must be unmapped before the device can release them
        self.buffers.clear();
        if let Err(e) = self.device.allocate_buffers(0) {
            error!("failed to release capture buffers: {}", e);
        }
        debug!("capture buffers released");
    }
}

/// Active streaming session over a [`BufferPool`].
pub struct Streaming<'p, 'd, D: DeviceControl> {
    pool: &'p mut BufferPool<'d, D>,
    active: bool,
}

impl<'d, D: DeviceControl> Streaming<'_, 'd, D> {
    /// Blocks until the device completes a buffer and takes ownership of it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotQueued`] when the device hands back a buffer we
    /// did not queue and [`Error::FrameLength`] when the device wrote
    /// anything but exactly one frame. The buffer stays owned until
    /// streaming stops.
    pub fn dequeue(&mut self) -> Result<BufferToken> {
        let (index, length) = self.pool.device.dequeue()?;
        let expected = self.pool.frame_size;
        let buf = self
            .pool
            .buffers
            .get_mut(index as usize)
            .filter(|b| b.state == BufferState::Queued)
            .ok_or(Error::NotQueued { index })?;
        buf.state = BufferState::Owned;
        if length != expected {
            return Err(Error::FrameLength {
                index,
                length,
                expected,
            });
        }
        trace!("buffer {} owned", index);
        Ok(BufferToken { index })
    }

    /// Raw frame stored in an owned buffer.
    pub fn frame<'a>(&'a self, token: &BufferToken, format: &'a FormatDescriptor) -> RawFrame<'a> {
        let region = self.pool.buffers[token.index as usize].region.as_ref();
        RawFrame {
            data: &region[..self.pool.frame_size],
            format,
        }
    }

    /// Returns an owned buffer to the device.
    pub fn requeue(&mut self, token: BufferToken) -> Result<()> {
        let buf = &mut self.pool.buffers[token.index as usize];
        assert_eq!(
            buf.state,
            BufferState::Owned,
            "requeue of buffer {} which is not owned",
            token.index
        );
        self.pool.device.queue(token.index)?;
        buf.state = BufferState::Queued;
        Ok(())
    }

    pub fn pool(&self) -> &BufferPool<'d, D> {
        self.pool
    }

    /// Disables streaming, returning every buffer to the free state.
    pub fn stop(mut self) -> Result<()> {
        self.active = false;
        self.pool.halt()
    }
}

impl<D: DeviceControl> Drop for Streaming<'_, '_, D> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.pool.halt() {
                error!("failed to stop streaming: {}", e);
            }
        }
    }
}
