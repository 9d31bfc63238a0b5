// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_capture::{
    buffer::{BufferPool, BufferState},
    capture::{CaptureConfig, CaptureLoop, Publish},
    convert::CanonicalFrame,
    device::{DeviceControl, V4l2Device},
    format::negotiate,
    Result,
};
use serial_test::serial;
use std::{
    error::Error,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

const DEVICE: &str = "/dev/video0";

#[test]
#[serial]
#[ignore = "camera test is disabled by default (run with --include-ignored to enable)"]
fn test_capabilities() -> Result<(), Box<dyn Error>> {
    let device = V4l2Device::open(DEVICE)?;
    let caps = device.query_capabilities()?;
    println!(
        "driver: {} card: {} bus: {} flags: {:#010x}",
        caps.driver, caps.card, caps.bus_info, caps.flags
    );
    assert!(caps.supports_capture());

    for fmt in device.list_formats()? {
        println!("supported: {}", fmt);
    }
    Ok(())
}

#[test]
#[serial]
#[ignore = "camera test is disabled by default (run with --include-ignored to enable)"]
fn test_buffer_cycle() -> Result<(), Box<dyn Error>> {
    let device = V4l2Device::open(DEVICE)?;
    let negotiated = negotiate(&device, None)?;
    println!("selected format: {}", negotiated.format);

    let mut pool = BufferPool::allocate(&device, 4, negotiated.frame_size())?;
    pool.enqueue_all()?;
    let mut streaming = pool.start()?;

    let now = Instant::now();
    for _ in 0..10 {
        let token = streaming.dequeue()?;
        let raw = streaming.frame(&token, &negotiated.format).to_vec();
        let frame = negotiated.conversion.convert(
            &raw,
            negotiated.format.width,
            negotiated.format.height,
        )?;
        assert_eq!(frame.width, negotiated.format.width);
        streaming.requeue(token)?;
    }
    println!("10 frames in {:.2?}", now.elapsed());

    streaming.stop()?;
    assert!(pool.states().iter().all(|s| *s == BufferState::Free));
    Ok(())
}

struct Counter<'a> {
    frames: u64,
    stop: &'a AtomicBool,
}

impl Publish for Counter<'_> {
    fn post(&mut self, frame: CanonicalFrame) -> Result<()> {
        self.frames += 1;
        println!("frame {:?} {}", frame.shape(), frame.encoding());
        if self.frames == 30 {
            self.stop.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
#[serial]
#[ignore = "camera test is disabled by default (run with --include-ignored to enable)"]
fn test_capture() -> Result<(), Box<dyn Error>> {
    let device = V4l2Device::open(DEVICE)?;
    let stop = AtomicBool::new(false);
    let counter = Counter {
        frames: 0,
        stop: &stop,
    };
    let mut capture = CaptureLoop::new(&device, counter, CaptureConfig::default());
    let frames = capture.run(&stop)?;
    assert_eq!(frames, 30);
    Ok(())
}
