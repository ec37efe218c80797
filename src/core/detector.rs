use crate::common::{RosterError, Result, Config};
use ort::{Environment, Session, SessionBuilder, Value, GraphOptimizationLevel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Pixel rectangle `(x, y, width, height)` grown by `padding` on every side
    /// and clamped to an image of `image_width` x `image_height`. `None` when
    /// nothing of the box lies inside the image.
    pub fn padded_rect(&self, padding: u32, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let pad = padding as f32;
        let left = (self.x1 - pad).max(0.0).floor() as u32;
        let top = (self.y1 - pad).max(0.0).floor() as u32;
        let right = ((self.x2 + pad).max(0.0).ceil() as u32).min(image_width);
        let bottom = ((self.y2 + pad).max(0.0).ceil() as u32).min(image_height);

        if right <= left || bottom <= top {
            return None;
        }
        Some((left, top, right - left, bottom - top))
    }
}

/// Speed/accuracy trade-off for face localisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionBackend {
    #[default]
    Fast,
    Accurate,
}

impl std::str::FromStr for DetectionBackend {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "hog" => Ok(Self::Fast),
            "accurate" | "cnn" => Ok(Self::Accurate),
            other => Err(RosterError::InvalidInput(format!("Unknown detection backend: {}", other))),
        }
    }
}

/// Finds faces in a frame. Returning an empty list is not an error.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &DynamicImage, backend: DetectionBackend) -> Result<Vec<FaceBox>>;
}

pub struct FaceDetector {
    fast: Session,
    accurate: Option<Session>,
    _environment: Arc<Environment>,
    config: Config,
}

fn build_session(environment: &Arc<Environment>, model_path: &Path) -> Result<Session> {
    if !model_path.exists() {
        return Err(RosterError::Model(
            format!("Detector model not found at: {:?}", model_path)
        ));
    }

    let session = SessionBuilder::new(environment)?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_model_from_file(model_path)?;
    Ok(session)
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| RosterError::Model(format!("Failed to create environment: {}", e)))?
        );

        let fast = build_session(&environment, &config.models.detector_path)?;
        let accurate = match &config.models.accurate_detector_path {
            Some(path) => Some(build_session(&environment, path)?),
            None => None,
        };

        Ok(Self {
            fast,
            accurate,
            _environment: environment,
            config: config.clone(),
        })
    }

    pub fn detect(&self, image: &DynamicImage, backend: DetectionBackend) -> Result<Vec<FaceBox>> {
        let (session, filter) = match backend {
            DetectionBackend::Fast => (&self.fast, FilterType::Nearest),
            DetectionBackend::Accurate => (self.accurate.as_ref().unwrap_or(&self.fast), FilterType::Triangle),
        };

        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;
        let input_width = self.config.detector.input_width;
        let input_height = self.config.detector.input_height;

        let img_array = if image.width() == input_width && image.height() == input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(input_width, input_height, filter);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(session.allocator(), &cow_array)?;
        let outputs = session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        // Back to original image coordinates
        let scale_x = orig_width / input_width as f32;
        let scale_y = orig_height / input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let mut faces = Vec::new();

        // YOLOv8 output: [1, N, 5+] or transposed [1, 5+, N]
        let Some(first) = outputs.first() else {
            return Ok(faces);
        };
        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let values: Vec<f32> = output.iter().copied().collect();

        let (num_predictions, prediction_length, is_transposed) = if shape.len() >= 3 {
            if shape[2] > shape[1] && shape[1] <= 10 {
                (shape[2], shape[1], true)
            } else {
                (shape[1], shape[2], false)
            }
        } else if shape.len() == 2 {
            (shape[0], shape[1], false)
        } else {
            tracing::warn!("Unexpected detector output shape: {:?}", shape);
            return Ok(faces);
        };

        if prediction_length < 4 {
            tracing::warn!("Detector output too short per prediction: {}", prediction_length);
            return Ok(faces);
        }

        let input_width = self.config.detector.input_width as f32;
        let input_height = self.config.detector.input_height as f32;

        for i in 0..num_predictions {
            let at = |field: usize| -> f32 {
                if is_transposed {
                    values[field * num_predictions + i]
                } else {
                    values[i * prediction_length + field]
                }
            };

            let (x_center_raw, y_center_raw, width_raw, height_raw) = (at(0), at(1), at(2), at(3));
            let confidence = if prediction_length > 4 { at(4) } else { 0.0 };

            if confidence <= 0.001 {
                continue;
            }

            // Normalised coordinates need scaling to the input size
            let normalized = x_center_raw <= 1.0 && y_center_raw <= 1.0 && width_raw <= 1.0 && height_raw <= 1.0;
            let (sx, sy) = if normalized { (input_width, input_height) } else { (1.0, 1.0) };

            let x_center = x_center_raw * sx;
            let y_center = y_center_raw * sy;
            let width = width_raw * sx;
            let height = height_raw * sy;

            let x1 = (x_center - width / 2.0).max(0.0);
            let y1 = (y_center - height / 2.0).max(0.0);
            let x2 = (x_center + width / 2.0).min(input_width);
            let y2 = (y_center + height / 2.0).min(input_height);

            if x2 > x1 && y2 > y1 && (x2 - x1) > 10.0 && (y2 - y1) > 10.0 {
                faces.push(FaceBox { x1, y1, x2, y2, confidence });
            }
        }

        // NMS on everything first, then the confidence cut
        faces = apply_nms(faces, 0.45);
        faces.retain(|face| face.confidence >= self.config.detector.confidence);
        faces.truncate(5);

        Ok(faces)
    }
}

impl FaceLocator for FaceDetector {
    fn locate(&self, image: &DynamicImage, backend: DetectionBackend) -> Result<Vec<FaceBox>> {
        self.detect(image, backend)
    }
}

/// Greedy non-maximum suppression; output is sorted by descending confidence.
pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = box1.width() * box1.height();
    let area2 = box2.width() * box2.height();
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    #[test]
    fn padded_rect_is_clamped_to_frame() {
        let rect = face(10.0, 20.0, 110.0, 120.0, 0.9).padded_rect(70, 640, 480);
        assert_eq!(rect, Some((0, 0, 180, 190)));

        let rect = face(600.0, 400.0, 630.0, 470.0, 0.9).padded_rect(70, 640, 480);
        assert_eq!(rect, Some((530, 330, 110, 150)));
    }

    #[test]
    fn padded_rect_outside_frame_is_none() {
        assert_eq!(face(900.0, 900.0, 950.0, 950.0, 0.9).padded_rect(0, 640, 480), None);
    }

    #[test]
    fn nms_drops_overlapping_boxes() {
        let kept = apply_nms(
            vec![
                face(0.0, 0.0, 100.0, 100.0, 0.6),
                face(5.0, 5.0, 105.0, 105.0, 0.9),
                face(300.0, 300.0, 400.0, 400.0, 0.7),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("fast".parse::<DetectionBackend>().unwrap(), DetectionBackend::Fast);
        assert_eq!("CNN".parse::<DetectionBackend>().unwrap(), DetectionBackend::Accurate);
        assert!("quantum".parse::<DetectionBackend>().is_err());
    }
}
