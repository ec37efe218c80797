use crate::camera::{CameraDevice, FrameSource};
use crate::common::config::CameraConfig;
use crate::common::{RosterError, Result};
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb};
use std::fs;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const STREAM_BUFFERS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub formats: Vec<String>,
    pub video_capture: bool,
}

/// Webcam behind `/dev/video<N>`.
pub struct V4lCamera {
    config: CameraConfig,
}

impl V4lCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Every `/dev/video*` node that answers a capability query, sorted by index.
    pub fn list_all_cameras() -> Result<Vec<CameraInfo>> {
        let mut cameras = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let path = entry?.path();
            let Some(index) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            let Ok(device) = Device::new(index as usize) else {
                continue;
            };
            let Ok(caps) = device.query_caps() else {
                continue;
            };

            let formats = device
                .enum_formats()
                .unwrap_or_default()
                .iter()
                .map(|fmt| fmt.fourcc.str().unwrap_or("UNKNOWN").to_string())
                .collect();

            cameras.push(CameraInfo {
                index,
                name: caps.card.clone(),
                formats,
                video_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            });
        }

        cameras.sort_by_key(|c| c.index);
        Ok(cameras)
    }

    fn open_device(&self) -> Result<(Device, v4l::Format)> {
        let index = self.config.device_index;
        tracing::info!("Opening camera device {}...", index);

        let device = Device::new(index as usize)
            .map_err(|e| RosterError::CameraUnavailable(format!("Failed to open camera {}: {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| RosterError::CameraUnavailable(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} may not support standard video capture", index);
        }

        let mut fmt = device.format()
            .map_err(|e| RosterError::CameraUnavailable(format!("Failed to get format: {}", e)))?;

        fmt.width = self.config.width;
        fmt.height = self.config.height;
        // Keep GREY for IR sensors, everything else goes through MJPG
        if fmt.fourcc != FourCC::new(b"GREY") {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let actual = device.format()
            .map_err(|e| RosterError::CameraUnavailable(format!("Failed to get final format: {}", e)))?;
        tracing::debug!(
            "Camera format: {}x{} {}",
            actual.width,
            actual.height,
            actual.fourcc.str().unwrap_or("UNKNOWN")
        );

        if actual.width != self.config.width || actual.height != self.config.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                actual.width, actual.height, self.config.width, self.config.height
            );
        }

        Ok((device, actual))
    }
}

impl CameraDevice for V4lCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        let (device, format) = self.open_device()?;

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| RosterError::CameraUnavailable(format!("Failed to create stream: {}", e)))?;

        // Let exposure settle before frames are used
        let delay = Duration::from_millis(self.config.warmup_delay_ms);
        for i in 0..self.config.warmup_frames {
            stream.next()
                .map_err(|e| RosterError::CameraUnavailable(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(delay);
        }
        tracing::info!("Camera ready");

        Ok(Box::new(V4lStream {
            stream,
            format,
            _device: device,
        }))
    }
}

struct V4lStream {
    stream: Stream<'static>,
    format: v4l::Format,
    _device: Device,
}

impl FrameSource for V4lStream {
    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        let (buf, _meta) = self.stream.next()
            .map_err(|e| RosterError::CameraUnavailable(format!("Failed to capture: {}", e)))?;

        if buf.is_empty() {
            return Ok(None);
        }

        decode_frame(buf, &self.format).map(Some)
    }
}

fn decode_frame(data: &[u8], format: &v4l::Format) -> Result<DynamicImage> {
    let (width, height) = (format.width, format.height);

    match &format.fourcc.repr {
        b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?),
        b"GREY" => {
            let pixels = data.get(..(width * height) as usize).unwrap_or(data).to_vec();
            let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels)
                .ok_or_else(|| RosterError::CameraUnavailable("Short grayscale frame".into()))?;
            Ok(DynamicImage::ImageLuma8(buffer))
        }
        b"YUYV" => yuyv_to_image(data, width, height),
        other => Err(RosterError::CameraUnavailable(format!(
            "Unsupported pixel format {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn yuyv_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(RosterError::CameraUnavailable(format!(
            "Short YUYV frame: {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .ok_or_else(|| RosterError::CameraUnavailable("Failed to build RGB frame".into()))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}
