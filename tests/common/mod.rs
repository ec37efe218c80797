#![allow(dead_code)]

use face_roster::camera::{CameraDevice, FrameSource};
use face_roster::core::{DetectionBackend, Embedding, EmbeddingExtractor, FaceBox, FaceLocator};
use face_roster::storage::{PersonRecord, PersonStatus, RecordRepository};
use face_roster::{Config, Result, RosterError};
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const FRAME_WIDTH: u32 = 320;
pub const FRAME_HEIGHT: u32 = 240;

/// Config rooted in `root` with a short capture loop.
pub fn test_config(root: &Path, face_count: usize, max_frames: u64) -> Config {
    let root = root.display();
    let text = format!(
        r#"
[dataset]
path = "{root}/dataset"
class_name = "PROJECT"

[capture]
face_count = {face_count}
frame_delay_ms = 0
max_frames = {max_frames}
timeout_seconds = 60

[camera]
device_index = 0
width = {FRAME_WIDTH}
height = {FRAME_HEIGHT}
warmup_frames = 0

[models]
detector_path = "{root}/models/detector.onnx"
recognizer_path = "{root}/models/recognizer.onnx"

[detector]
input_width = 640
input_height = 640

[recognizer]
input_size = 112
normalization_value = 127.5

[storage]
records_path = "{root}/database/enroll.json"
attendance_path = "{root}/database/attendance.json"
embeddings_path = "{root}/output/encodings.bin"
classifier_path = "{root}/output/recognizer.bin"
label_encoder_path = "{root}/output/le.bin"

[training]
epochs = 20
"#
    );
    Config::from_toml(&text).expect("test config should parse")
}

/// Sorted file names in `dir`; empty when the directory does not exist.
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Camera that yields `frames` solid frames and then ends the stream.
pub struct ScriptedCamera {
    frames: usize,
    fail_open: bool,
    pub opened: AtomicUsize,
    pub released: Arc<AtomicUsize>,
}

impl ScriptedCamera {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            frames,
            fail_open: false,
            opened: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn endless() -> Self {
        Self::with_frames(usize::MAX)
    }

    pub fn broken() -> Self {
        Self {
            fail_open: true,
            ..Self::with_frames(0)
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl CameraDevice for ScriptedCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(RosterError::CameraUnavailable("no such device".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            remaining: self.frames,
            released: Arc::clone(&self.released),
        }))
    }
}

struct ScriptedStream {
    remaining: usize,
    released: Arc<AtomicUsize>,
}

impl FrameSource for ScriptedStream {
    fn read_frame(&mut self) -> Result<Option<DynamicImage>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let frame = RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([120, 90, 60]));
        Ok(Some(DynamicImage::ImageRgb8(frame)))
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reports `faces_per_frame` faces side by side on every frame.
pub struct StubLocator {
    faces_per_frame: usize,
    pub calls: AtomicUsize,
}

impl StubLocator {
    pub fn new(faces_per_frame: usize) -> Self {
        Self {
            faces_per_frame,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceLocator for StubLocator {
    fn locate(&self, _image: &DynamicImage, _backend: DetectionBackend) -> Result<Vec<FaceBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.faces_per_frame)
            .map(|i| {
                let x1 = 40.0 + i as f32 * 120.0;
                FaceBox { x1, y1: 60.0, x2: x1 + 100.0, y2: 180.0, confidence: 0.9 }
            })
            .collect())
    }
}

/// One fixed face and embedding per image.
pub struct StubExtractor {
    pub embedding: Embedding,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self {
            embedding: vec![0.5, 0.5, 0.0, 0.0],
        }
    }
}

impl EmbeddingExtractor for StubExtractor {
    fn detect_and_embed(&self, _image: &DynamicImage, _backend: DetectionBackend) -> Result<Vec<(FaceBox, Embedding)>> {
        let face = FaceBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0, confidence: 1.0 };
        Ok(vec![(face, self.embedding.clone())])
    }
}

/// Ordered in-memory record repository.
#[derive(Default)]
pub struct InMemoryRecords {
    records: Mutex<Vec<PersonRecord>>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PersonRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordRepository for InMemoryRecords {
    fn lookup(&self, person_id: &str) -> Result<Option<PersonRecord>> {
        Ok(self.records.lock().unwrap().iter().find(|r| r.person_id == person_id).cloned())
    }

    fn insert(&self, record: PersonRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.person_id == record.person_id) {
            return Err(RosterError::DuplicateId(record.person_id));
        }
        records.push(record);
        Ok(())
    }

    fn update(&self, person_id: &str, name: &str, status: PersonStatus) -> Result<PersonRecord> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.person_id == person_id)
            .ok_or_else(|| RosterError::NotFound(person_id.to_string()))?;
        record.name = name.to_string();
        record.status = status;
        Ok(record.clone())
    }

    fn delete(&self, person_id: &str) -> Result<PersonRecord> {
        let mut records = self.records.lock().unwrap();
        let index = records
            .iter()
            .position(|r| r.person_id == person_id)
            .ok_or_else(|| RosterError::NotFound(person_id.to_string()))?;
        Ok(records.remove(index))
    }

    fn list_all(&self) -> Result<Vec<PersonRecord>> {
        Ok(self.snapshot())
    }
}
