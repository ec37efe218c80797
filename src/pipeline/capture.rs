use crate::camera::{CameraDevice, FrameSource};
use crate::common::config::CaptureConfig;
use crate::common::{RosterError, Result};
use crate::core::detector::{DetectionBackend, FaceBox, FaceLocator};
use crate::pipeline::session::EnrollmentSession;
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct CaptureLimits {
    /// Pixels added on every side of a detected face before cropping.
    pub padding: u32,
    pub frame_delay: Duration,
    pub max_frames: u64,
    pub timeout: Duration,
}

impl CaptureLimits {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            padding: config.padding,
            frame_delay: config.frame_delay(),
            max_frames: config.max_frames,
            timeout: config.timeout(),
        }
    }
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The mirrored frame with its detections, once per frame.
    Frame {
        frame: DynamicImage,
        faces: Vec<FaceBox>,
        saved: usize,
        target: usize,
    },
    Saved { saved: usize, target: usize },
    /// The camera has been released.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Completed { saved: usize },
    Stopped { saved: usize },
    TimedOut { saved: usize },
}

impl CaptureOutcome {
    pub fn saved(&self) -> usize {
        match *self {
            CaptureOutcome::Completed { saved }
            | CaptureOutcome::Stopped { saved }
            | CaptureOutcome::TimedOut { saved } => saved,
        }
    }
}

/// Bounded loop that saves padded face crops as `00000.png`, `00001.png`, ...
pub struct CaptureSession {
    session: Arc<EnrollmentSession>,
    output_dir: PathBuf,
    backend: DetectionBackend,
    limits: CaptureLimits,
}

impl CaptureSession {
    pub fn new(
        session: Arc<EnrollmentSession>,
        output_dir: impl Into<PathBuf>,
        backend: DetectionBackend,
        limits: CaptureLimits,
    ) -> Self {
        Self {
            session,
            output_dir: output_dir.into(),
            backend,
            limits,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn run(
        &self,
        camera: &dyn CameraDevice,
        locator: &dyn FaceLocator,
        events: &mut dyn FnMut(CaptureEvent),
    ) -> Result<CaptureOutcome> {
        let result = self.open_and_capture(camera, locator, events);
        events(CaptureEvent::Closed);

        match &result {
            Ok(outcome) => tracing::info!(
                "Capture for {} finished: {:?}",
                self.session.person_id(),
                outcome
            ),
            Err(e) => tracing::error!("Capture for {} failed: {}", self.session.person_id(), e),
        }
        result
    }

    fn open_and_capture(
        &self,
        camera: &dyn CameraDevice,
        locator: &dyn FaceLocator,
        events: &mut dyn FnMut(CaptureEvent),
    ) -> Result<CaptureOutcome> {
        fs::create_dir_all(&self.output_dir)?;

        let mut source = camera.open().map_err(|e| match e {
            RosterError::CameraUnavailable(_) => e,
            other => RosterError::CameraUnavailable(other.to_string()),
        })?;

        // `source` drops when this returns, on every path
        self.capture_loop(&mut *source, locator, events)
    }

    fn capture_loop(
        &self,
        source: &mut dyn FrameSource,
        locator: &dyn FaceLocator,
        events: &mut dyn FnMut(CaptureEvent),
    ) -> Result<CaptureOutcome> {
        let target = self.session.target();
        let started = Instant::now();
        let mut frames = 0u64;
        let mut saved = 0usize;

        tracing::info!(
            "Capturing {} faces for {} into {}",
            target,
            self.session.person_id(),
            self.output_dir.display()
        );

        loop {
            if self.session.is_cancelled() {
                return Ok(CaptureOutcome::Stopped { saved });
            }
            if saved >= target {
                return Ok(CaptureOutcome::Completed { saved });
            }
            if frames >= self.limits.max_frames || started.elapsed() >= self.limits.timeout {
                tracing::warn!(
                    "Capture gave up after {} frames ({:.1}s) with {}/{} faces",
                    frames,
                    started.elapsed().as_secs_f32(),
                    saved,
                    target
                );
                return Ok(CaptureOutcome::TimedOut { saved });
            }
            frames += 1;

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame.fliph(),
                Ok(None) => return Err(RosterError::CameraUnavailable("Camera stream ended".into())),
                Err(e @ RosterError::CameraUnavailable(_)) => return Err(e),
                Err(e) => return Err(RosterError::CameraUnavailable(format!("Frame read failed: {}", e))),
            };

            let faces = locator.locate(&frame, self.backend)?;

            for face in &faces {
                if saved >= target || self.session.is_cancelled() {
                    break;
                }
                let Some((x, y, width, height)) =
                    face.padded_rect(self.limits.padding, frame.width(), frame.height())
                else {
                    continue;
                };

                let path = self.output_dir.join(format!("{:05}.png", saved));
                frame.crop_imm(x, y, width, height).save(&path)?;
                saved += 1;
                self.session.set_captured(saved);

                tracing::debug!("Saved face {}/{} to {}", saved, target, path.display());
                events(CaptureEvent::Saved { saved, target });
            }

            events(CaptureEvent::Frame { frame, faces, saved, target });

            if saved < target && !self.limits.frame_delay.is_zero() {
                std::thread::sleep(self.limits.frame_delay);
            }
        }
    }
}
