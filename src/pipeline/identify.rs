use crate::common::{RosterError, Result};
use crate::core::detector::{DetectionBackend, FaceBox};
use crate::core::extractor::EmbeddingExtractor;
use crate::storage::{ModelStore, TrainedModel};
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub face: FaceBox,
    /// `None` when the best probability is under the threshold.
    pub person_id: Option<String>,
    pub probability: f32,
}

/// Names faces with the trained classifier.
pub struct Identifier {
    model: TrainedModel,
    threshold: f32,
}

impl Identifier {
    pub fn new(model: TrainedModel, threshold: f32) -> Self {
        Self { model, threshold }
    }

    pub fn load(models: &ModelStore, threshold: f32) -> Result<Self> {
        let model = models
            .load()?
            .ok_or_else(|| RosterError::Model("No trained model found, run `train` first".into()))?;
        Ok(Self::new(model, threshold))
    }

    pub fn classes(&self) -> &[String] {
        self.model.encoder.classes()
    }

    /// Best label for one embedding and its probability.
    pub fn classify(&self, embedding: &[f32]) -> Result<(Option<String>, f32)> {
        let (index, probability) = self.model.classifier.predict(embedding)?;
        if probability < self.threshold {
            return Ok((None, probability));
        }

        let label = self
            .model
            .encoder
            .inverse_transform(index)
            .ok_or_else(|| RosterError::Model(format!("Class index {} has no label", index)))?;
        Ok((Some(label.to_string()), probability))
    }

    pub fn identify(
        &self,
        extractor: &dyn EmbeddingExtractor,
        image: &DynamicImage,
        backend: DetectionBackend,
    ) -> Result<Vec<Identification>> {
        let faces = extractor.detect_and_embed(image, backend)?;
        tracing::debug!("Identifying {} faces", faces.len());

        faces
            .into_iter()
            .map(|(face, embedding)| {
                let (person_id, probability) = self.classify(&embedding)?;
                Ok(Identification { face, person_id, probability })
            })
            .collect()
    }
}

/// Copy of `image` with a box around every face: green when recognised, red
/// otherwise.
pub fn annotate(image: &DynamicImage, results: &[Identification]) -> DynamicImage {
    let mut img = image.to_rgb8();
    let (width, height) = (img.width() as f32, img.height() as f32);

    for result in results {
        let face = &result.face;
        if face.x1 >= width || face.y1 >= height || face.x2 <= 0.0 || face.y2 <= 0.0 {
            continue;
        }
        let x1 = face.x1.max(0.0) as i32;
        let y1 = face.y1.max(0.0) as i32;
        let x2 = face.x2.min(width) as i32;
        let y2 = face.y2.min(height) as i32;

        let rect_width = (x2 - x1).max(1) as u32;
        let rect_height = (y2 - y1).max(1) as u32;
        let color = if result.person_id.is_some() { KNOWN_COLOR } else { UNKNOWN_COLOR };

        draw_hollow_rect_mut(&mut img, Rect::at(x1, y1).of_size(rect_width, rect_height), color);
        if rect_width > 2 && rect_height > 2 {
            let inner = Rect::at(x1 + 1, y1 + 1).of_size(rect_width - 2, rect_height - 2);
            draw_hollow_rect_mut(&mut img, inner, color);
        }
    }

    DynamicImage::ImageRgb8(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::{LabelEncoder, LinearSvm, SvmParams};

    fn identifier(threshold: f32) -> Identifier {
        let features = vec![
            vec![1.0, 0.0],
            vec![0.95, 0.05],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
            vec![0.05, 0.95],
            vec![0.1, 0.9],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let model = TrainedModel {
            classifier: LinearSvm::fit(&features, &labels, 2, SvmParams::default()).unwrap(),
            encoder: LabelEncoder::fit(&["101", "102"]),
        };
        Identifier::new(model, threshold)
    }

    #[test]
    fn names_the_closest_person() {
        let (person, probability) = identifier(0.5).classify(&[0.0, 1.0]).unwrap();
        assert_eq!(person.as_deref(), Some("102"));
        assert!(probability >= 0.5);
    }

    #[test]
    fn low_confidence_is_unknown() {
        let (person, _) = identifier(1.01).classify(&[1.0, 0.0]).unwrap();
        assert_eq!(person, None);
    }

    #[test]
    fn annotation_colours_known_and_unknown_faces() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::new(100, 50));
        let face = |x1: f32| FaceBox { x1, y1: 10.0, x2: x1 + 20.0, y2: 30.0, confidence: 0.9 };
        let results = [
            Identification { face: face(10.0), person_id: Some("101".into()), probability: 0.9 },
            Identification { face: face(60.0), person_id: None, probability: 0.2 },
        ];

        let annotated = annotate(&image, &results).to_rgb8();
        assert_eq!(*annotated.get_pixel(10, 10), KNOWN_COLOR);
        assert_eq!(*annotated.get_pixel(60, 10), UNKNOWN_COLOR);
        assert_eq!(*annotated.get_pixel(20, 20), Rgb([0, 0, 0]));
    }
}
