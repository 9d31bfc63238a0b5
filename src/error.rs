// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::format::FourCC;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal conditions of the capture pipeline.
///
/// None of these are retried. Any error raised once streaming has started
/// still passes through the stop path before it reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} is not a video capture device")]
    NotACaptureDevice(String),

    #[error("no supported pixel format advertised by the device")]
    NoSupportedFormat,

    #[error("requested pixel format {requested} but device confirmed unsupported {confirmed}")]
    FormatRejected { requested: FourCC, confirmed: FourCC },

    #[error("{format} rows are {stride} bytes, only packed rows of {packed} bytes are supported")]
    PaddedRows {
        format: FourCC,
        stride: u32,
        packed: usize,
    },

    #[error("device granted {count} capture buffers, at least 2 are required")]
    InsufficientBuffers { count: u32 },

    #[error("buffer {index} holds {length} bytes but a frame needs {required}")]
    BufferTooSmall {
        index: u32,
        length: usize,
        required: usize,
    },

    #[error("device returned buffer {index} which was not queued")]
    NotQueued { index: u32 },

    #[error("buffer {index} delivered {length} bytes, a frame is {expected} bytes")]
    FrameLength {
        index: u32,
        length: usize,
        expected: usize,
    },

    #[error("{format} frame {width}x{height} needs {expected} bytes, got {actual}")]
    FrameSize {
        format: &'static str,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("invalid {format} dimensions {width}x{height}")]
    InvalidDimensions {
        format: &'static str,
        width: u32,
        height: u32,
    },

    #[error("device i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("publish failed: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}
