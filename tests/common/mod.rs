// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

#![allow(dead_code)]

use edgefirst_capture::{
    capture::Publish,
    convert::CanonicalFrame,
    device::{Capabilities, DeviceControl},
    error::Result,
    format::{FormatDescriptor, FourCC},
};
use std::{
    cell::UnsafeCell,
    collections::{HashSet, VecDeque},
    io,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use v4l::capability::Flags;

/// Buffer memory shared by the mock and the pool, like a kernel mapping.
#[derive(Clone, Debug)]
pub struct MockRegion(Rc<UnsafeCell<Vec<u8>>>);

impl MockRegion {
    fn new(len: usize) -> Self {
        Self(Rc::new(UnsafeCell::new(vec![0; len])))
    }

    /// Writes a new frame, only called while the buffer is queued.
    fn fill(&self, value: u8) {
        // SAFETY: a queued buffer is never borrowed by the pool
        unsafe { (*self.0.get()).fill(value) }
    }
}

impl AsRef<[u8]> for MockRegion {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: writes happen only while the buffer is queued
        unsafe { &*self.0.get() }
    }
}

/// Everything the mock device observed, for assertions after a run.
#[derive(Debug, Default)]
pub struct MockState {
    pub format: Option<FormatDescriptor>,
    pub set_formats: Vec<FormatDescriptor>,
    pub allocated: u32,
    pub allocations: Vec<u32>,
    pub mapped: u32,
    pub queued: VecDeque<u32>,
    /// Indices handed to the application and not yet queued again.
    pub dequeued: HashSet<u32>,
    pub streaming: bool,
    pub stream_on_count: u32,
    pub stream_off_count: u32,
    /// Indices the application still held when streaming was turned off.
    pub held_at_stream_off: Vec<HashSet<u32>>,
    /// Every index returned by `dequeue`, in order.
    pub dequeue_log: Vec<u32>,
    /// Number of `queue` calls so far.
    pub queue_count: u32,
    pub regions: Vec<MockRegion>,
}

/// In-memory stand-in for a V4L2 capture device.
///
/// Queueing a buffer writes a frame whose bytes all equal the number of
/// earlier `queue` calls, so with FIFO delivery the n-th dequeued frame is
/// filled with `n`.
pub struct MockDevice {
    pub caps: u32,
    pub formats: Vec<FormatDescriptor>,
    /// Number of buffers granted regardless of the request.
    pub grant: Option<u32>,
    /// Region length, defaults to the frame size of the current format.
    pub region_len: Option<usize>,
    /// Bytes reported per dequeued frame, defaults to the frame size.
    pub bytesused: Option<usize>,
    /// Dequeue fails once this many frames were delivered.
    pub fail_after: Option<usize>,
    /// Replaces the confirmed format after `set_format`.
    pub adjust: Option<fn(FormatDescriptor) -> FormatDescriptor>,
    pub state: Mutex<MockState>,
}

pub fn desc(tag: &[u8; 4], index: u32, width: u32, height: u32) -> FormatDescriptor {
    FormatDescriptor {
        tag: FourCC(*tag),
        index,
        width,
        height,
        stride: 0,
    }
}

impl MockDevice {
    pub fn new(formats: Vec<FormatDescriptor>) -> Self {
        Self {
            caps: (Flags::VIDEO_CAPTURE | Flags::STREAMING).bits(),
            formats,
            grant: None,
            region_len: None,
            bytesused: None,
            fail_after: None,
            adjust: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Device advertising only YUYV at the given size.
    pub fn yuyv(width: u32, height: u32) -> Self {
        Self::new(vec![desc(b"YUYV", 0, width, height)])
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn current_frame_size(&self) -> usize {
        let state = self.state();
        let fmt = state.format.unwrap_or(self.formats[0]);
        let bpp = edgefirst_capture::format::lookup(fmt.tag)
            .map(|c| c.bytes_per_pixel())
            .unwrap_or(1);
        fmt.width as usize * fmt.height as usize * bpp
    }
}

impl DeviceControl for MockDevice {
    type Region = MockRegion;

    fn query_capabilities(&self) -> Result<Capabilities> {
        Ok(Capabilities {
            driver: "mock".into(),
            card: "Mock Camera".into(),
            bus_info: "platform:mock".into(),
            flags: self.caps,
        })
    }

    fn list_formats(&self) -> Result<Vec<FormatDescriptor>> {
        Ok(self.formats.clone())
    }

    fn set_format(&self, format: &FormatDescriptor) -> Result<()> {
        let confirmed = match self.adjust {
            Some(adjust) => adjust(*format),
            None => *format,
        };
        let mut state = self.state();
        state.set_formats.push(*format);
        state.format = Some(confirmed);
        Ok(())
    }

    fn get_format(&self) -> Result<FormatDescriptor> {
        Ok(self.state().format.unwrap_or(self.formats[0]))
    }

    fn allocate_buffers(&self, count: u32) -> Result<u32> {
        let granted = if count == 0 {
            0
        } else {
            self.grant.unwrap_or(count)
        };
        let mut state = self.state();
        assert!(!state.streaming, "buffers reallocated while streaming");
        state.allocated = granted;
        state.allocations.push(count);
        state.queued.clear();
        state.dequeued.clear();
        // released regions stay readable for assertions
        if count > 0 {
            state.regions.clear();
        }
        Ok(granted)
    }

    fn map_buffer(&self, index: u32) -> Result<MockRegion> {
        let len = self.region_len.unwrap_or_else(|| self.current_frame_size());
        let mut state = self.state();
        assert!(index < state.allocated, "mapping unallocated buffer {index}");
        assert_eq!(state.regions.len(), index as usize, "buffers mapped out of order");
        let region = MockRegion::new(len);
        state.regions.push(region.clone());
        state.mapped += 1;
        Ok(region)
    }

    fn queue(&self, index: u32) -> Result<()> {
        let mut state = self.state();
        assert!(index < state.allocated, "queueing unallocated buffer {index}");
        assert!(
            !state.queued.contains(&index),
            "buffer {index} queued twice"
        );
        let fill = state.queue_count as u8;
        state.regions[index as usize].fill(fill);
        state.queue_count += 1;
        state.dequeued.remove(&index);
        state.queued.push_back(index);
        Ok(())
    }

    fn dequeue(&self) -> Result<(u32, usize)> {
        let length = self.bytesused.unwrap_or_else(|| self.current_frame_size());
        let mut state = self.state();
        if !state.streaming {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not streaming").into());
        }
        if let Some(limit) = self.fail_after {
            if state.dequeue_log.len() >= limit {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "device unplugged").into());
            }
        }
        // an empty queue would block forever on real hardware
        let index = state
            .queued
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no queued buffers"))?;
        state.dequeued.insert(index);
        state.dequeue_log.push(index);
        Ok((index, length))
    }

    fn set_streaming(&self, enable: bool) -> Result<()> {
        let mut state = self.state();
        state.streaming = enable;
        if enable {
            state.stream_on_count += 1;
        } else {
            state.stream_off_count += 1;
            let held = std::mem::take(&mut state.dequeued);
            state.held_at_stream_off.push(held);
            state.queued.clear();
        }
        Ok(())
    }
}

/// Publisher keeping every posted frame.
#[derive(Default)]
pub struct CollectPublisher {
    pub frames: Vec<CanonicalFrame>,
    /// Raises the flag once this many frames were posted.
    pub stop_after: Option<(usize, Arc<AtomicBool>)>,
    /// Fails the post with this index.
    pub fail_at: Option<usize>,
}

impl Publish for CollectPublisher {
    fn post(&mut self, frame: CanonicalFrame) -> Result<()> {
        if self.fail_at == Some(self.frames.len()) {
            return Err(edgefirst_capture::Error::Publish("subscriber gone".into()));
        }
        self.frames.push(frame);
        if let Some((limit, flag)) = &self.stop_after {
            if self.frames.len() >= *limit {
                flag.store(true, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
