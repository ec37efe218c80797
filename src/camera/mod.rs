pub mod v4l2;

pub use v4l2::{CameraInfo, V4lCamera};

use crate::common::Result;
use image::DynamicImage;

/// An open capture stream. Dropping it releases the device.
pub trait FrameSource {
    /// `Ok(None)` signals end of stream.
    fn read_frame(&mut self) -> Result<Option<DynamicImage>>;
}

/// Something that can be opened into a [`FrameSource`].
pub trait CameraDevice: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>>;
}
