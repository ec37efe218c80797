use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One enrollment attempt, shared between the caller and the capture worker.
#[derive(Debug)]
pub struct EnrollmentSession {
    person_id: String,
    name: String,
    target: usize,
    captured: AtomicUsize,
    cancelled: AtomicBool,
}

impl EnrollmentSession {
    pub fn new(person_id: impl Into<String>, name: impl Into<String>, target: usize) -> Self {
        Self {
            person_id: person_id.into(),
            name: name.into(),
            target,
            captured: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn person_id(&self) -> &str {
        &self.person_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Ask the capture loop to stop; it notices before its next frame.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn captured(&self) -> usize {
        self.captured.load(Ordering::SeqCst)
    }

    pub(crate) fn set_captured(&self, count: usize) {
        self.captured.store(count, Ordering::SeqCst);
    }
}
