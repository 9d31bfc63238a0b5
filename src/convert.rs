// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Inverse of the RGB to YCbCr matrix
/// `[[0.299, -0.16874, 0.5], [0.587, -0.33126, -0.41869], [0.114, 0.5, -0.08131]]`
/// for row vectors, so `rgb = yuv · YUV2RGB + YUV_OFFSET`.
const YUV2RGB: [[f64; 3]; 3] = [
    [1.0, 1.0, 1.0],
    [-7.152538445247538e-06, -0.34413312945150876, 1.772002505237112],
    [1.4019975861613254, -0.7141380485272951, 1.540546742053316e-05],
];

const YUV_OFFSET: [f64; 3] = [-179.45477266423404, 135.45870971679688, -226.8183044444304];

/// Owned pixel storage of a [`CanonicalFrame`].
#[derive(Clone, Debug, PartialEq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes of a single sample.
    pub fn sample_size(&self) -> usize {
        match self {
            PixelData::U8(_) => 1,
            PixelData::U16(_) => 2,
        }
    }

    /// Little-endian byte serialization of the samples.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            PixelData::U8(v) => v.clone(),
            PixelData::U16(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}

/// Converted frame, row-major and channel-last, independent of the capture
/// buffer it was produced from.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: PixelData,
    pub metadata: BTreeMap<String, Value>,
}

const fn sample_count(width: u32, height: u32, channels: u32) -> usize {
    width as usize * height as usize * channels as usize
}

impl CanonicalFrame {
    fn new(width: u32, height: u32, channels: u32, data: PixelData) -> Self {
        debug_assert_eq!(data.len(), sample_count(width, height, channels));
        Self {
            width,
            height,
            channels,
            data,
            metadata: BTreeMap::new(),
        }
    }

    /// `[height, width]` for single channel frames, `[height, width, 3]` for
    /// RGB frames.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = vec![self.height as usize, self.width as usize];
        if self.channels > 1 {
            shape.push(self.channels as usize);
        }
        shape
    }

    /// Bytes per row of the serialized frame.
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize * self.data.sample_size()
    }

    /// ROS `sensor_msgs/Image` encoding name.
    pub fn encoding(&self) -> &'static str {
        match (&self.data, self.channels) {
            (PixelData::U16(_), _) => "mono16",
            (PixelData::U8(_), 3) => "rgb8",
            (PixelData::U8(_), _) => "mono8",
        }
    }
}

/// Conversion strategy for one raw pixel encoding.
///
/// Resolved once during format negotiation and used for every frame of the
/// streaming session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conversion {
    /// Packed 4:2:2 `Y0 U Y1 V` to 8-bit RGB.
    Yuyv,
    /// Little-endian 16-bit gray, including 12-bit samples in 16-bit words.
    Gray16,
    /// 8-bit gray, copied through.
    Gray8,
    /// 8-bit RGB, copied through.
    Rgb24,
    /// Partial support for 2-byte-per-pixel luma-chroma layouts: only the
    /// luma byte at offset `byte` is kept, producing a gray image.
    LumaOnly { byte: usize },
}

impl Conversion {
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            Conversion::Yuyv | Conversion::Gray16 | Conversion::LumaOnly { .. } => 2,
            Conversion::Gray8 => 1,
            Conversion::Rgb24 => 3,
        }
    }

    /// Channel count of the converted frame.
    pub const fn channels(&self) -> u32 {
        match self {
            Conversion::Yuyv | Conversion::Rgb24 => 3,
            Conversion::Gray16 | Conversion::Gray8 | Conversion::LumaOnly { .. } => 1,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Conversion::Yuyv => "yuyv",
            Conversion::Gray16 => "gray16",
            Conversion::Gray8 => "gray8",
            Conversion::Rgb24 => "rgb24",
            Conversion::LumaOnly { .. } => "luma-only",
        }
    }

    pub const fn frame_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// Converts one raw frame of `width` x `height` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameSize`] when `data` is not exactly one frame long
    /// and [`Error::InvalidDimensions`] for a 4:2:2 frame of odd width.
    pub fn convert(&self, data: &[u8], width: u32, height: u32) -> Result<CanonicalFrame> {
        let expected = self.frame_size(width, height);
        if data.len() != expected {
            return Err(Error::FrameSize {
                format: self.name(),
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        let frame = match *self {
            Conversion::Yuyv => {
                if width % 2 != 0 {
                    return Err(Error::InvalidDimensions {
                        format: self.name(),
                        width,
                        height,
                    });
                }
                CanonicalFrame::new(width, height, 3, PixelData::U8(yuyv_to_rgb(data)))
            }
            Conversion::Gray16 => {
                let samples = data
                    .chunks_exact(2)
                    .map(|s| u16::from_le_bytes([s[0], s[1]]))
                    .collect();
                CanonicalFrame::new(width, height, 1, PixelData::U16(samples))
            }
            Conversion::Gray8 => CanonicalFrame::new(width, height, 1, PixelData::U8(data.to_vec())),
            Conversion::Rgb24 => CanonicalFrame::new(width, height, 3, PixelData::U8(data.to_vec())),
            Conversion::LumaOnly { byte } => {
                let luma = data.chunks_exact(2).map(|px| px[byte]).collect();
                CanonicalFrame::new(width, height, 1, PixelData::U8(luma))
            }
        };
        Ok(frame)
    }
}

#[inline]
fn yuv_to_rgb(yuv: [f64; 3], out: &mut [u8]) {
    for (c, px) in out.iter_mut().enumerate() {
        let v = yuv[0] * YUV2RGB[0][c] + yuv[1] * YUV2RGB[1][c] + yuv[2] * YUV2RGB[2][c]
            + YUV_OFFSET[c];
        // truncation after clipping matches a float to u8 array store
        *px = v.clamp(0.0, 255.0) as u8;
    }
}

fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = vec![0u8; data.len() / 2 * 3];
    for (pair, out) in data.chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        let (y1, u, y2, v) = (
            pair[0] as f64,
            pair[1] as f64,
            pair[2] as f64,
            pair[3] as f64,
        );
        let (even, odd) = out.split_at_mut(3);
        yuv_to_rgb([y1, u, v], even);
        yuv_to_rgb([y2, u, v], odd);
    }
    rgb
}
