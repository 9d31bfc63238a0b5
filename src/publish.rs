// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    capture::Publish,
    convert::CanonicalFrame,
    error::{Error, Result},
};
use cdr::{CdrLe, Infinite};
use edgefirst_schemas::{builtin_interfaces::Time, sensor_msgs::Image, std_msgs::Header};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use zenoh::{bytes::Encoding, pubsub::Publisher, Config, Session, Wait};

/// Builds the `sensor_msgs/Image` message for a converted frame.
pub fn image_msg(frame: &CanonicalFrame, stamp: Time, frame_id: &str) -> Image {
    Image {
        header: Header {
            stamp,
            frame_id: frame_id.to_owned(),
        },
        height: frame.height,
        width: frame.width,
        encoding: frame.encoding().to_owned(),
        is_bigendian: 0,
        step: frame.row_stride() as u32,
        data: frame.data.to_le_bytes(),
    }
}

/// Serializes a converted frame as a CDR little-endian `sensor_msgs/Image`.
pub fn encode_image(frame: &CanonicalFrame, stamp: Time, frame_id: &str) -> Result<Vec<u8>> {
    let msg = image_msg(frame, stamp, frame_id);
    cdr::serialize::<_, _, CdrLe>(&msg, Infinite).map_err(|e| Error::Publish(Box::new(e)))
}

/// Frame metadata as a JSON object, sent as the sample attachment.
pub fn encode_metadata(frame: &CanonicalFrame) -> Result<Vec<u8>> {
    serde_json::to_vec(&frame.metadata).map_err(|e| Error::Publish(Box::new(e)))
}

pub fn now() -> Time {
    let since_the_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Time {
        sec: since_the_epoch.as_secs() as i32,
        nanosec: since_the_epoch.subsec_nanos(),
    }
}

/// Publishes converted frames on a Zenoh key expression.
pub struct ZenohPublisher {
    // the session must outlive the publisher
    _session: Session,
    publisher: Publisher<'static>,
    frame_id: String,
}

impl ZenohPublisher {
    pub fn open(config: Config, topic: &str, frame_id: &str) -> Result<Self> {
        let session = zenoh::open(config).wait().map_err(Error::Publish)?;
        let publisher = session
            .declare_publisher(topic.to_owned())
            .encoding(Encoding::APPLICATION_CDR)
            .wait()
            .map_err(Error::Publish)?;
        info!("publishing frames on {}", topic);
        Ok(Self {
            _session: session,
            publisher,
            frame_id: frame_id.to_owned(),
        })
    }
}

impl Publish for ZenohPublisher {
    fn post(&mut self, frame: CanonicalFrame) -> Result<()> {
        let payload = encode_image(&frame, now(), &self.frame_id)?;
        let attachment = encode_metadata(&frame)?;
        let len = payload.len();
        self.publisher
            .put(payload)
            .attachment(attachment)
            .wait()
            .map_err(Error::Publish)?;
        debug!(
            "published {}x{} {} {}KB",
            frame.width,
            frame.height,
            frame.encoding(),
            len / 1024
        );
        Ok(())
    }
}
