mod common;

use common::{file_names, ScriptedCamera, StubLocator};
use face_roster::core::DetectionBackend;
use face_roster::pipeline::{CaptureEvent, CaptureLimits, CaptureOutcome, CaptureSession, EnrollmentSession};
use face_roster::RosterError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn limits(max_frames: u64) -> CaptureLimits {
    CaptureLimits {
        padding: 70,
        frame_delay: Duration::ZERO,
        max_frames,
        timeout: Duration::from_secs(60),
    }
}

fn capture(dir: &TempDir, target: usize, max_frames: u64) -> (Arc<EnrollmentSession>, CaptureSession) {
    let session = Arc::new(EnrollmentSession::new("101", "Alice", target));
    let capture = CaptureSession::new(
        Arc::clone(&session),
        dir.path().join("101"),
        DetectionBackend::Fast,
        limits(max_frames),
    );
    (session, capture)
}

#[test]
fn saves_exactly_target_files_with_increasing_progress() {
    let dir = TempDir::new().unwrap();
    let (session, capture) = capture(&dir, 4, 100);
    let camera = ScriptedCamera::endless();
    let locator = StubLocator::new(1);

    let mut progress = Vec::new();
    let mut closed = 0;
    let outcome = capture
        .run(&camera, &locator, &mut |event| match event {
            CaptureEvent::Saved { saved, target } => progress.push((saved, target)),
            CaptureEvent::Closed => closed += 1,
            CaptureEvent::Frame { .. } => {}
        })
        .unwrap();

    assert_eq!(outcome, CaptureOutcome::Completed { saved: 4 });
    assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(closed, 1);
    assert_eq!(
        file_names(capture.output_dir()),
        vec!["00000.png", "00001.png", "00002.png", "00003.png"]
    );
    assert_eq!(session.captured(), 4);
    assert_eq!(camera.released(), 1);
}

#[test]
fn crops_are_padded_and_clamped() {
    let dir = TempDir::new().unwrap();
    let (_session, capture) = capture(&dir, 1, 10);

    capture
        .run(&ScriptedCamera::endless(), &StubLocator::new(1), &mut |_| {})
        .unwrap();

    // Face (40,60)-(140,180) grown by 70 and clamped to 320x240
    let crop = image::open(capture.output_dir().join("00000.png")).unwrap();
    assert_eq!((crop.width(), crop.height()), (210, 240));
}

#[test]
fn several_faces_in_one_frame_each_count() {
    let dir = TempDir::new().unwrap();
    let (_session, capture) = capture(&dir, 3, 100);
    let locator = StubLocator::new(2);

    let outcome = capture.run(&ScriptedCamera::endless(), &locator, &mut |_| {}).unwrap();

    assert_eq!(outcome, CaptureOutcome::Completed { saved: 3 });
    assert_eq!(locator.calls(), 2);
    assert_eq!(file_names(capture.output_dir()).len(), 3);
}

#[test]
fn cancelling_after_k_saves_keeps_k_files() {
    let dir = TempDir::new().unwrap();
    let (session, capture) = capture(&dir, 5, 100);
    let camera = ScriptedCamera::endless();

    let cancel = Arc::clone(&session);
    let outcome = capture
        .run(&camera, &StubLocator::new(1), &mut |event| {
            if let CaptureEvent::Saved { saved: 2, .. } = event {
                cancel.cancel();
            }
        })
        .unwrap();

    assert_eq!(outcome, CaptureOutcome::Stopped { saved: 2 });
    assert_eq!(file_names(capture.output_dir()), vec!["00000.png", "00001.png"]);
    assert_eq!(camera.released(), 1);
}

#[test]
fn cancelled_before_start_saves_nothing() {
    let dir = TempDir::new().unwrap();
    let (session, capture) = capture(&dir, 5, 100);
    session.cancel();

    let outcome = capture
        .run(&ScriptedCamera::endless(), &StubLocator::new(1), &mut |_| {})
        .unwrap();

    assert_eq!(outcome, CaptureOutcome::Stopped { saved: 0 });
    assert!(file_names(capture.output_dir()).is_empty());
}

#[test]
fn frames_without_faces_run_into_the_frame_limit() {
    let dir = TempDir::new().unwrap();
    let (_session, capture) = capture(&dir, 3, 7);
    let locator = StubLocator::new(0);

    let mut frames = 0;
    let outcome = capture
        .run(&ScriptedCamera::endless(), &locator, &mut |event| {
            if let CaptureEvent::Frame { faces, .. } = event {
                assert!(faces.is_empty());
                frames += 1;
            }
        })
        .unwrap();

    assert_eq!(outcome, CaptureOutcome::TimedOut { saved: 0 });
    assert_eq!(frames, 7);
    assert_eq!(locator.calls(), 7);
}

#[test]
fn camera_that_cannot_open_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let (_session, capture) = capture(&dir, 3, 10);

    let mut events = Vec::new();
    let err = capture
        .run(&ScriptedCamera::broken(), &StubLocator::new(1), &mut |event| events.push(event))
        .unwrap_err();

    assert!(matches!(err, RosterError::CameraUnavailable(_)));
    assert!(matches!(events.as_slice(), [CaptureEvent::Closed]));
}

#[test]
fn stream_ending_early_fails_and_releases_camera() {
    let dir = TempDir::new().unwrap();
    let (_session, capture) = capture(&dir, 5, 100);
    let camera = ScriptedCamera::with_frames(2);

    let err = capture.run(&camera, &StubLocator::new(1), &mut |_| {}).unwrap_err();

    assert!(matches!(err, RosterError::CameraUnavailable(_)));
    assert_eq!(file_names(capture.output_dir()).len(), 2);
    assert_eq!(camera.released(), 1);
}
