use crate::common::{Config, Result};
use crate::core::detector::{DetectionBackend, FaceBox, FaceDetector, FaceLocator};
use crate::core::recognizer::{Embedding, FaceRecognizer};
use image::DynamicImage;

/// Turns an image into zero or more `(face box, embedding)` pairs.
pub trait EmbeddingExtractor: Send + Sync {
    fn detect_and_embed(&self, image: &DynamicImage, backend: DetectionBackend) -> Result<Vec<(FaceBox, Embedding)>>;
}

/// Detector and recognizer ONNX models chained together.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            detector: FaceDetector::new(config)?,
            recognizer: FaceRecognizer::new(config)?,
        })
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    fn detect_and_embed(&self, image: &DynamicImage, backend: DetectionBackend) -> Result<Vec<(FaceBox, Embedding)>> {
        let faces = self.detector.locate(image, backend)?;
        let mut results = Vec::with_capacity(faces.len());

        for face in faces {
            let embedding = self.recognizer.get_embedding(image, &face)?;
            results.push((face, embedding));
        }

        Ok(results)
    }
}
