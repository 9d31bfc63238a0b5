// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    buffer::BufferPool,
    convert::CanonicalFrame,
    device::DeviceControl,
    error::{Error, Result},
    format::{negotiate, Negotiated},
};
use serde_json::{json, Map, Value};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error, info, info_span};

/// Receiver of converted frames.
///
/// Delivery is fire-and-forget: once `post` returns the publisher owns the
/// frame. An error is a transport failure and ends the capture session.
pub trait Publish {
    fn post(&mut self, frame: CanonicalFrame) -> Result<()>;
}

impl<P: Publish + ?Sized> Publish for &mut P {
    fn post(&mut self, frame: CanonicalFrame) -> Result<()> {
        (**self).post(frame)
    }
}

/// Settings of a capture session.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    /// Number of capture buffers requested from the device.
    pub buffers: u32,
    /// Frame size to request instead of the device's current one.
    pub size: Option<(u32, u32)>,
    /// Extra metadata attached to every published frame.
    pub attributes: Map<String, Value>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffers: 8,
            size: None,
            attributes: Map::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Initializing,
    Streaming,
    Stopping,
    Stopped,
}

/// Drives the acquire, convert, publish and requeue cycle of one device.
pub struct CaptureLoop<'d, D: DeviceControl, P: Publish> {
    device: &'d D,
    publisher: P,
    config: CaptureConfig,
    state: CaptureState,
    negotiated: Option<Negotiated>,
}

impl<'d, D: DeviceControl, P: Publish> CaptureLoop<'d, D, P> {
    pub fn new(device: &'d D, publisher: P, config: CaptureConfig) -> Self {
        Self {
            device,
            publisher,
            config,
            state: CaptureState::Initializing,
            negotiated: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Format in use, once negotiation has completed.
    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.as_ref()
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }

    /// Captures until `stop` is set or a fatal error occurs and returns the
    /// number of frames published.
    ///
    /// `stop` is only checked between frames, so a frame already dequeued is
    /// always converted, published and requeued before the loop exits.
    /// Streaming is disabled and the buffers released on every exit path.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<u64> {
        self.state = CaptureState::Initializing;
        let result = self.capture(stop);
        self.state = CaptureState::Stopped;
        match &result {
            Ok(frames) => info!("capture stopped after {} frames", frames),
            Err(e) => error!("capture failed: {}", e),
        }
        result
    }

    fn capture(&mut self, stop: &AtomicBool) -> Result<u64> {
        let caps = self.device.query_capabilities()?;
        info!(
            "capabilities driver: {} card: {} bus: {} flags: {:#010x}",
            caps.driver, caps.card, caps.bus_info, caps.flags
        );
        if !caps.supports_capture() {
            return Err(Error::NotACaptureDevice(caps.card));
        }

        let negotiated = negotiate(self.device, self.config.size)?;
        self.negotiated = Some(negotiated);
        let format = negotiated.format;
        let conversion = negotiated.conversion;

        let mut pool = BufferPool::allocate(self.device, self.config.buffers, negotiated.frame_size())?;
        info!("allocated frames: {}", pool.len());
        pool.enqueue_all()?;

        let mut streaming = pool.start()?;
        self.state = CaptureState::Streaming;

        let fourcc = format.tag.to_string();
        let mut sequence = 0u64;
        let outcome = loop {
            if stop.load(Ordering::SeqCst) {
                break Ok(sequence);
            }
            let _span = info_span!("frame", sequence).entered();

            let now = Instant::now();
            let token = match streaming.dequeue() {
                Ok(token) => token,
                Err(e) => break Err(e),
            };
            let capture_time = now.elapsed();

            // the device may overwrite the buffer as soon as it is requeued
            let raw = streaming.frame(&token, &format).to_vec();

            let now = Instant::now();
            let mut frame = match conversion.convert(&raw, format.width, format.height) {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            };
            let convert_time = now.elapsed();

            frame.metadata.extend(
                self.config
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            frame.metadata.insert("sequence".to_owned(), json!(sequence));
            frame.metadata.insert("buffer".to_owned(), json!(token.index()));
            frame.metadata.insert("fourcc".to_owned(), json!(fourcc));
            frame
                .metadata
                .insert("timestamp_ns".to_owned(), json!(timestamp_ns()));

            if let Err(e) = self.publisher.post(frame) {
                break Err(e);
            }
            if let Err(e) = streaming.requeue(token) {
                break Err(e);
            }

            debug!(
                "frame {} capture: {:?} convert: {:?}",
                sequence, capture_time, convert_time
            );
            sequence += 1;
        };

        self.state = CaptureState::Stopping;
        match outcome {
            Ok(frames) => {
                streaming.stop()?;
                Ok(frames)
            }
            Err(e) => {
                // the guard's drop stops streaming and logs any failure
                drop(streaming);
                Err(e)
            }
        }
    }
}

fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
