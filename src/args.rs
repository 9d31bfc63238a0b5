// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_capture::capture::CaptureConfig;
use serde_json::{json, Map, Value};
use zenoh::config::{Config, WhatAmI};

/// Parses a `KEY=VALUE` frame attribute. The value is read as JSON when
/// possible and kept as a plain string otherwise.
fn parse_attribute(arg: &str) -> Result<(String, Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", arg))?;
    if key.is_empty() {
        return Err(format!("empty attribute key in '{}'", arg));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

/// Command-line arguments for EdgeFirst Capture.
///
/// Arguments can be specified via command line or environment variables.
///
/// # Example
///
/// ```bash
/// # Via command line
/// edgefirst-capture /dev/video0 rt/camera/image --attribute lens=\"wide\"
///
/// # Via environment variables
/// export CAMERA=/dev/video0
/// export TOPIC=rt/camera/image
/// edgefirst-capture
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(env = "CAMERA")]
    pub camera: String,

    /// Zenoh topic for converted images (sensor_msgs/Image)
    #[arg(env = "TOPIC")]
    pub topic: String,

    /// Number of capture buffers to request from the device
    #[arg(long, env = "BUFFERS", default_value = "8")]
    pub buffers: u32,

    /// Camera capture resolution in pixels (width height), defaults to the
    /// resolution currently configured on the device
    #[arg(long, env = "CAMERA_SIZE", value_delimiter = ' ', num_args = 2)]
    pub camera_size: Option<Vec<u32>>,

    /// Extra metadata attached to every frame (can specify multiple)
    #[arg(long = "attribute", value_name = "KEY=VALUE", value_parser = parse_attribute)]
    pub attributes: Vec<(String, Value)>,

    /// TF frame ID for camera optical frame
    #[arg(long, default_value = "camera_optical")]
    pub camera_frame_id: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,

    /// Zenoh participant mode (peer, client, or router)
    #[arg(long, env = "MODE", default_value = "peer")]
    mode: WhatAmI,

    /// Zenoh endpoints to connect to (can specify multiple)
    #[arg(long, env = "CONNECT")]
    connect: Vec<String>,

    /// Zenoh endpoints to listen on (can specify multiple)
    #[arg(long, env = "LISTEN")]
    listen: Vec<String>,

    /// Disable Zenoh multicast peer discovery
    #[arg(long, env = "NO_MULTICAST_SCOUTING")]
    no_multicast_scouting: bool,
}

impl From<&Args> for CaptureConfig {
    fn from(args: &Args) -> Self {
        let size = args
            .camera_size
            .as_deref()
            .and_then(|size| match size {
                [width, height] => Some((*width, *height)),
                _ => None,
            });
        Self {
            buffers: args.buffers,
            size,
            attributes: args.attributes.iter().cloned().collect::<Map<_, _>>(),
        }
    }
}

impl TryFrom<&Args> for Config {
    type Error = zenoh::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(args.mode).to_string())?;

        if !args.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(args.connect).to_string())?;
        }

        if !args.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(args.listen).to_string())?;
        }

        if args.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        config.insert_json5("scouting/multicast/interface", &json!("lo").to_string())?;

        Ok(config)
    }
}
