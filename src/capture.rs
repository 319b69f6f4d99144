//! Frame acquisition.
//!
//! [`FrameSource`] is the seam between the state-advancement loop and the
//! physical capture device. The production implementation wraps a nokhwa
//! camera; tests drive the rest of the crate with scripted frame sequences.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use tracing::{info, warn};

use crate::frame::Frame;

/// Produces timestamped frames on demand. No interpretation happens here.
pub trait FrameSource {
    /// Block until a valid frame is available.
    ///
    /// Transient device read failures are retried internally without bound —
    /// a stalled device is expected to recover, and a device that never
    /// opens is a fatal startup error, not a capture error. Every successful
    /// capture also updates the most-recent slot.
    fn capture(&mut self) -> Result<Frame>;

    /// The last successfully captured frame, if any, without forcing a new
    /// capture.
    fn most_recent(&self) -> Option<&Frame>;

    /// Close and reopen the device. Recovery action after prolonged stalls.
    fn reinitialize(&mut self) -> Result<()>;
}

/// How long to back off between transient device read failures.
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// nokhwa-backed camera source.
pub struct CameraSource {
    camera: Camera,
    index: u32,
    width: u32,
    height: u32,
    recent: Option<Frame>,
}

impl CameraSource {
    /// Open the capture device. Failure here is fatal to the session — there
    /// is no automation without a frame source.
    pub fn open(index: u32, width: u32, height: u32) -> Result<Self> {
        let camera = open_camera(index, width, height)?;
        info!(index, width, height, "camera opened");
        Ok(Self {
            camera,
            index,
            width,
            height,
            recent: None,
        })
    }
}

fn open_camera(index: u32, width: u32, height: u32) -> Result<Camera> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30),
    ));
    let mut camera = Camera::new(CameraIndex::Index(index), requested)
        .with_context(|| format!("failed to open camera {index}"))?;
    camera
        .open_stream()
        .with_context(|| format!("failed to start camera {index} stream"))?;
    Ok(camera)
}

impl FrameSource for CameraSource {
    fn capture(&mut self) -> Result<Frame> {
        let image = loop {
            match self.camera.frame().and_then(|b| b.decode_image::<RgbFormat>()) {
                Ok(image) => break image,
                Err(e) => {
                    warn!(error = %e, "camera read failed, retrying");
                    thread::sleep(READ_RETRY_DELAY);
                }
            }
        };
        let frame = Frame::from_rgb8(
            image.width(),
            image.height(),
            image.into_raw(),
            Instant::now(),
        );
        self.recent = Some(frame.clone());
        Ok(frame)
    }

    fn most_recent(&self) -> Option<&Frame> {
        self.recent.as_ref()
    }

    fn reinitialize(&mut self) -> Result<()> {
        info!(index = self.index, "reinitializing camera");
        if let Err(e) = self.camera.stop_stream() {
            warn!(error = %e, "failed to stop camera stream before reopen");
        }
        self.camera = open_camera(self.index, self.width, self.height)?;
        Ok(())
    }
}
