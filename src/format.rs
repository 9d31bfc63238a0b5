// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    convert::Conversion,
    device::DeviceControl,
    error::{Error, Result},
};
use core::fmt;
use tracing::{debug, info, warn};

/// Four character pixel encoding tag as used by V4L2.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        FourCC(value.to_le_bytes())
    }
}

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        u32::from_le_bytes(value.0)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &c in &self.0 {
            let c = if c.is_ascii_graphic() || c == b' ' {
                c as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCC({:?})", self.to_string())
    }
}

/// YUYV 4:2:2 packed luma-chroma
pub const YUYV: FourCC = FourCC(*b"YUYV");
/// YVYU 4:2:2 packed, V before U
pub const YVYU: FourCC = FourCC(*b"YVYU");
/// UYVY 4:2:2 packed, chroma first
pub const UYVY: FourCC = FourCC(*b"UYVY");
/// 4:4:4 packed 16-bit, 4 bits per component
pub const Y444: FourCC = FourCC(*b"Y444");
/// 12-bit gray in little-endian 16-bit samples
pub const Y12: FourCC = FourCC(*b"Y12 ");
/// 16-bit little-endian gray
pub const Y16: FourCC = FourCC(*b"Y16 ");
/// 8-bit gray, V4L2 spelling
pub const GREY: FourCC = FourCC(*b"GREY");
/// 8-bit gray, alternate spelling accepted for compatibility
pub const GRAY: FourCC = FourCC(*b"GRAY");
/// RGB 24-bit pixel format (8 bits per channel, no alpha)
pub const RGB3: FourCC = FourCC(*b"RGB3");

const CATALOG: &[(FourCC, Conversion)] = &[
    (YUYV, Conversion::Yuyv),
    (Y12, Conversion::Gray16),
    (Y16, Conversion::Gray16),
    (GREY, Conversion::Gray8),
    (GRAY, Conversion::Gray8),
    (RGB3, Conversion::Rgb24),
    (Y444, Conversion::LumaOnly { byte: 1 }),
    (YVYU, Conversion::LumaOnly { byte: 0 }),
    (UYVY, Conversion::LumaOnly { byte: 1 }),
];

/// Returns the conversion strategy for a pixel encoding, if it is supported.
pub fn lookup(tag: FourCC) -> Option<Conversion> {
    CATALOG
        .iter()
        .find(|(fourcc, _)| *fourcc == tag)
        .map(|(_, conversion)| *conversion)
}

pub fn is_supported(tag: FourCC) -> bool {
    lookup(tag).is_some()
}

/// Iterates over every pixel encoding the catalog can convert.
pub fn supported() -> impl Iterator<Item = FourCC> {
    CATALOG.iter().map(|(fourcc, _)| *fourcc)
}

/// Pixel encoding and frame dimensions as reported by the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub tag: FourCC,
    /// Position in the device's advertised format list.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Bytes per row as reported by the device, 0 when not reported.
    pub stride: u32,
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#{} {} {}x{}",
            self.index, self.tag, self.width, self.height
        )
    }
}

/// Picks the last catalog-supported entry in device order.
///
/// Devices list single-channel gray encodings ahead of richer ones, so the
/// last supported entry is the richest format we know how to convert.
pub fn select_format(advertised: &[FormatDescriptor]) -> Option<FormatDescriptor> {
    let mut candidate = None;
    for desc in advertised {
        if is_supported(desc.tag) {
            candidate = Some(*desc);
        }
    }
    candidate
}

/// Result of format negotiation, fixed for the whole streaming session.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Negotiated {
    pub format: FormatDescriptor,
    pub conversion: Conversion,
}

impl Negotiated {
    /// Byte length of one raw frame in the negotiated format.
    pub fn frame_size(&self) -> usize {
        self.conversion
            .frame_size(self.format.width, self.format.height)
    }
}

/// Selects a supported format, applies it to the device and returns the
/// descriptor the device actually confirmed.
pub fn negotiate<D: DeviceControl>(
    device: &D,
    requested_size: Option<(u32, u32)>,
) -> Result<Negotiated> {
    let advertised = device.list_formats()?;
    for desc in &advertised {
        debug!("supported: {} catalog: {}", desc, is_supported(desc.tag));
    }

    let mut requested = select_format(&advertised).ok_or(Error::NoSupportedFormat)?;
    if let Some((width, height)) = requested_size {
        requested.width = width;
        requested.height = height;
    }

    device.set_format(&requested)?;
    let mut format = device.get_format()?;

    if format.width != requested.width || format.height != requested.height {
        warn!(
            "requested {}x{} resolution but device set {}x{} resolution",
            requested.width, requested.height, format.width, format.height
        );
    }

    format.index = if format.tag == requested.tag {
        requested.index
    } else {
        match advertised.iter().find(|desc| desc.tag == format.tag) {
            Some(desc) => desc.index,
            None => {
                warn!(
                    "device confirmed {} which it does not advertise, keeping index {}",
                    format.tag, requested.index
                );
                requested.index
            }
        }
    };

    let conversion = lookup(format.tag).ok_or(Error::FormatRejected {
        requested: requested.tag,
        confirmed: format.tag,
    })?;

    let packed = format.width as usize * conversion.bytes_per_pixel();
    if format.stride != 0 && format.stride as usize != packed {
        return Err(Error::PaddedRows {
            format: format.tag,
            stride: format.stride,
            packed,
        });
    }
    info!("selected format: {} conversion: {:?}", format, conversion);

    Ok(Negotiated { format, conversion })
}
