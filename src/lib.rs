// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Capture Library
//!
//! This library streams frames from a memory-mapped V4L2 capture device,
//! converts each raw frame into a canonical image array and hands it to a
//! publisher.
//!
//! ## Features
//!
//! - **Buffer Lifecycle**: A fixed pool of kernel capture buffers addressed by
//!   index, cycled between device and application ownership with a guard
//!   that always disables streaming on exit.
//! - **Format Negotiation**: Selects the richest advertised pixel encoding
//!   the converter understands and adopts the format the device confirms.
//! - **Color Conversion**: YUYV 4:2:2 to RGB, 16-bit little-endian gray,
//!   gray and RGB pass-through, and luma-only extraction for partially
//!   supported 4:2:2 layouts.
//! - **Publishing**: Frames are published over Zenoh as CDR encoded
//!   `sensor_msgs/Image` messages with their metadata attached as JSON.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_capture::{
//!     capture::{CaptureConfig, CaptureLoop},
//!     device::V4l2Device,
//!     publish::ZenohPublisher,
//! };
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let device = V4l2Device::open("/dev/video0")?;
//! let publisher = ZenohPublisher::open(zenoh::Config::default(), "rt/camera/image", "camera")?;
//! let stop = AtomicBool::new(false);
//!
//! let mut capture = CaptureLoop::new(&device, publisher, CaptureConfig::default());
//! let frames = capture.run(&stop)?;
//! println!("published {} frames", frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! The V4L2 streaming ioctls and buffer mappings use `unsafe` code which is
//! confined to the `device` module.

pub mod buffer;
pub mod capture;
pub mod convert;
pub mod device;
pub mod error;
pub mod format;
pub mod publish;

pub use error::{Error, Result};
