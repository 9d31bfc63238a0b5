// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_capture::{
    capture::{CaptureConfig, CaptureLoop},
    device::V4l2Device,
    publish::ZenohPublisher,
};
use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stdout_log = tracing_subscriber::fmt::layer().with_filter(level);
    let journald = tracing_journald::layer()
        .ok()
        .map(|layer| layer.with_filter(level));
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn zenoh_config(args: &Args) -> Result<zenoh::Config, Box<dyn Error>> {
    zenoh::Config::try_from(args).map_err(|e| -> Box<dyn Error> { e })
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;
    info!("EdgeFirst Capture Publisher");

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let config = zenoh_config(&args)?;
    let device = V4l2Device::open(&args.camera)?;
    let publisher = ZenohPublisher::open(config, &args.topic, &args.camera_frame_id)?;

    let mut capture = CaptureLoop::new(&device, publisher, CaptureConfig::from(&args));
    capture.run(&stop)?;
    Ok(())
}
