use crate::camera::CameraDevice;
use crate::common::{Config, RosterError, Result};
use crate::core::detector::FaceLocator;
use crate::pipeline::capture::{CaptureEvent, CaptureLimits, CaptureOutcome, CaptureSession};
use crate::pipeline::outcome::OutcomeKind;
use crate::pipeline::session::EnrollmentSession;
use crate::storage::records::PLACEHOLDER;
use crate::storage::{PersonRecord, PersonStatus, RecordRepository};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Values the old form widgets used as hints; never valid input.
const FORM_HINTS: [&str; 2] = ["Person ID", "Person Name"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    AlreadyEnrolled,
    /// Someone enrolled the same id while we were capturing.
    Conflict,
    CameraUnavailable(String),
    Incomplete { saved: usize, target: usize },
    Error(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::AlreadyEnrolled => write!(f, "already enrolled"),
            FailureReason::Conflict => write!(f, "enrolled concurrently by another session"),
            FailureReason::CameraUnavailable(message) => write!(f, "camera unavailable: {}", message),
            FailureReason::Incomplete { saved, target } => {
                write!(f, "only {}/{} faces captured before the time limit", saved, target)
            }
            FailureReason::Error(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentState {
    Idle,
    Validating,
    CheckingDuplicate,
    Capturing,
    Recording,
    Done,
    Failed(FailureReason),
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum EnrollmentEvent {
    State(EnrollmentState),
    Capture(CaptureEvent),
    Finished(EnrollmentOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub person_id: String,
    pub name: String,
}

impl EnrollmentRequest {
    pub fn new(person_id: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            person_id: person_id.as_ref().trim().to_string(),
            name: name.as_ref().trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentOutcome {
    pub kind: OutcomeKind,
    pub state: EnrollmentState,
    pub message: String,
    pub saved: usize,
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case(PLACEHOLDER)
        || FORM_HINTS.iter().any(|hint| value.eq_ignore_ascii_case(hint))
}

/// Rejects empty or placeholder fields and non-numeric ids.
pub fn validate_request(request: &EnrollmentRequest) -> Result<()> {
    if is_placeholder(&request.person_id) {
        return Err(RosterError::InvalidInput("Person ID is required".into()));
    }
    if !request.person_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(RosterError::InvalidInput(format!(
            "Person ID must be numeric, got '{}'",
            request.person_id
        )));
    }
    if is_placeholder(&request.name) {
        return Err(RosterError::InvalidInput("Person name is required".into()));
    }
    Ok(())
}

/// Holds the single-session flag until dropped.
struct ActiveGuard(Arc<AtomicBool>);

impl ActiveGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RosterError::SessionBusy)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A running background enrollment.
pub struct EnrollmentHandle {
    pub session: Arc<EnrollmentSession>,
    pub events: Receiver<EnrollmentEvent>,
    join: JoinHandle<EnrollmentOutcome>,
}

impl EnrollmentHandle {
    pub fn cancel(&self) {
        self.session.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn wait(self) -> Result<EnrollmentOutcome> {
        self.join
            .join()
            .map_err(|_| RosterError::Other(anyhow::anyhow!("Enrollment worker panicked")))
    }
}

/// Validates, checks for duplicates, captures faces and records the person.
/// Embedding and training are separate steps.
#[derive(Clone)]
pub struct EnrollmentCoordinator {
    config: Arc<Config>,
    records: Arc<dyn RecordRepository>,
    camera: Arc<dyn CameraDevice>,
    locator: Arc<dyn FaceLocator>,
    active: Arc<AtomicBool>,
}

impl EnrollmentCoordinator {
    pub fn new(
        config: Arc<Config>,
        records: Arc<dyn RecordRepository>,
        camera: Arc<dyn CameraDevice>,
        locator: Arc<dyn FaceLocator>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            records,
            camera,
            locator,
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn new_session(&self, request: &EnrollmentRequest) -> Arc<EnrollmentSession> {
        Arc::new(EnrollmentSession::new(
            &request.person_id,
            &request.name,
            self.config.capture.face_count,
        ))
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Runs one attempt on the calling thread. Only `SessionBusy` comes back as
    /// an error; everything else is in the outcome.
    pub fn enroll(
        &self,
        session: &Arc<EnrollmentSession>,
        events: &mut dyn FnMut(EnrollmentEvent),
    ) -> Result<EnrollmentOutcome> {
        let _guard = ActiveGuard::acquire(&self.active)?;
        Ok(self.run_attempt(session, events))
    }

    /// Runs one attempt on a worker thread. Dropping the handle's receiver
    /// cancels the capture.
    pub fn start(&self, request: EnrollmentRequest) -> Result<EnrollmentHandle> {
        let guard = ActiveGuard::acquire(&self.active)?;
        let session = self.new_session(&request);
        let (tx, rx) = mpsc::channel();

        let coordinator = self.clone();
        let worker_session = Arc::clone(&session);
        let join = std::thread::Builder::new()
            .name("enrollment".into())
            .spawn(move || {
                let mut forward = |event: EnrollmentEvent| {
                    if tx.send(event).is_err() && !worker_session.is_cancelled() {
                        tracing::info!("Preview closed, cancelling enrollment");
                        worker_session.cancel();
                    }
                };
                let outcome = coordinator.run_attempt(&worker_session, &mut forward);
                // Released before `Finished` is sent
                drop(guard);
                forward(EnrollmentEvent::Finished(outcome.clone()));
                outcome
            })?;

        Ok(EnrollmentHandle { session, events: rx, join })
    }

    fn run_attempt(
        &self,
        session: &Arc<EnrollmentSession>,
        events: &mut dyn FnMut(EnrollmentEvent),
    ) -> EnrollmentOutcome {
        let person_id = session.person_id();
        let request = EnrollmentRequest::new(person_id, session.name());

        events(EnrollmentEvent::State(EnrollmentState::Validating));
        if let Err(e) = validate_request(&request) {
            tracing::warn!("Enrollment rejected: {}", e);
            return self.finish(events, EnrollmentState::Idle, OutcomeKind::from(&e), e.to_string(), 0);
        }

        events(EnrollmentEvent::State(EnrollmentState::CheckingDuplicate));
        match self.records.lookup(&request.person_id) {
            Ok(None) => {}
            Ok(Some(existing)) => {
                return self.fail(
                    events,
                    FailureReason::AlreadyEnrolled,
                    OutcomeKind::AlreadyExists,
                    format!("ID {} is already enrolled as {}", existing.person_id, existing.name),
                    0,
                );
            }
            Err(e) => return self.fail_with(events, &e, 0),
        }

        events(EnrollmentEvent::State(EnrollmentState::Capturing));
        let capture = CaptureSession::new(
            Arc::clone(session),
            self.config.person_dir(&request.person_id),
            self.config.capture.detection_backend,
            CaptureLimits::from_config(&self.config.capture),
        );
        let result = capture.run(self.camera.as_ref(), self.locator.as_ref(), &mut |event| {
            events(EnrollmentEvent::Capture(event))
        });

        let saved = match result {
            Ok(CaptureOutcome::Completed { saved }) if saved >= session.target() => saved,
            Ok(CaptureOutcome::Stopped { saved }) => {
                tracing::info!("Enrollment of {} cancelled after {} faces", person_id, saved);
                return self.finish(
                    events,
                    EnrollmentState::Cancelled,
                    OutcomeKind::Cancelled,
                    format!("Enrollment cancelled after {} of {} faces", saved, session.target()),
                    saved,
                );
            }
            Ok(CaptureOutcome::Completed { saved }) | Ok(CaptureOutcome::TimedOut { saved }) => {
                let reason = FailureReason::Incomplete { saved, target: session.target() };
                let message = format!("Enrollment failed: {}", reason);
                return self.fail(events, reason, OutcomeKind::ResourceUnavailable, message, saved);
            }
            Err(RosterError::CameraUnavailable(message)) => {
                let text = format!("Camera unavailable: {}", message);
                return self.fail(
                    events,
                    FailureReason::CameraUnavailable(message),
                    OutcomeKind::ResourceUnavailable,
                    text,
                    session.captured(),
                );
            }
            Err(e) => return self.fail_with(events, &e, session.captured()),
        };

        events(EnrollmentEvent::State(EnrollmentState::Recording));
        match self.records.lookup(&request.person_id) {
            Ok(None) => {}
            Ok(Some(_)) => return self.conflict(events, &request.person_id, saved),
            Err(e) => return self.fail_with(events, &e, saved),
        }

        let record = PersonRecord::new(&request.person_id, &request.name, PersonStatus::Enrolled);
        match self.records.insert(record) {
            Ok(()) => {}
            Err(RosterError::DuplicateId(_)) => return self.conflict(events, &request.person_id, saved),
            Err(e) => return self.fail_with(events, &e, saved),
        }

        tracing::info!("Enrolled {} ({}) with {} faces", request.person_id, request.name, saved);
        self.finish(
            events,
            EnrollmentState::Done,
            OutcomeKind::Success,
            format!("Enrolled {} ({}) with {} face samples", request.person_id, request.name, saved),
            saved,
        )
    }

    fn conflict(&self, events: &mut dyn FnMut(EnrollmentEvent), person_id: &str, saved: usize) -> EnrollmentOutcome {
        tracing::warn!("ID {} was enrolled by another session during capture", person_id);
        self.fail(
            events,
            FailureReason::Conflict,
            OutcomeKind::AlreadyExists,
            format!("ID {} was enrolled by another session; capture discarded", person_id),
            saved,
        )
    }

    fn fail_with(&self, events: &mut dyn FnMut(EnrollmentEvent), error: &RosterError, saved: usize) -> EnrollmentOutcome {
        tracing::error!("Enrollment failed: {}", error);
        self.fail(
            events,
            FailureReason::Error(error.to_string()),
            OutcomeKind::from(error),
            error.to_string(),
            saved,
        )
    }

    fn fail(
        &self,
        events: &mut dyn FnMut(EnrollmentEvent),
        reason: FailureReason,
        kind: OutcomeKind,
        message: String,
        saved: usize,
    ) -> EnrollmentOutcome {
        self.finish(events, EnrollmentState::Failed(reason), kind, message, saved)
    }

    fn finish(
        &self,
        events: &mut dyn FnMut(EnrollmentEvent),
        state: EnrollmentState,
        kind: OutcomeKind,
        message: String,
        saved: usize,
    ) -> EnrollmentOutcome {
        events(EnrollmentEvent::State(state.clone()));
        EnrollmentOutcome { kind, state, message, saved }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_placeholders_and_non_numeric_ids() {
        let invalid = [
            ("", "Alice"),
            ("unknown", "Alice"),
            ("Person ID", "Alice"),
            ("12a", "Alice"),
            ("-5", "Alice"),
            ("101", ""),
            ("101", "  "),
            ("101", "Person Name"),
            ("101", "UNKNOWN"),
        ];
        for (id, name) in invalid {
            let err = validate_request(&EnrollmentRequest::new(id, name)).unwrap_err();
            assert!(matches!(err, RosterError::InvalidInput(_)), "{:?}/{:?} accepted", id, name);
        }

        assert!(validate_request(&EnrollmentRequest::new(" 101 ", "Alice")).is_ok());
    }

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = ActiveGuard::acquire(&flag).unwrap();
        assert!(matches!(ActiveGuard::acquire(&flag), Err(RosterError::SessionBusy)));
        drop(guard);
        assert!(ActiveGuard::acquire(&flag).is_ok());
    }
}
