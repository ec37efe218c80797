pub mod classifier;
pub mod detector;
pub mod extractor;
pub mod recognizer;

pub use classifier::{LabelEncoder, LinearSvm, SvmParams};
pub use detector::{DetectionBackend, FaceBox, FaceDetector, FaceLocator};
pub use extractor::{EmbeddingExtractor, OnnxExtractor};
pub use recognizer::{Embedding, FaceRecognizer};
