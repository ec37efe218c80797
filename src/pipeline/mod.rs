pub mod capture;
pub mod encode;
pub mod enrollment;
pub mod identify;
pub mod maintenance;
pub mod outcome;
pub mod session;
pub mod summary;
pub mod train;

pub use capture::{CaptureEvent, CaptureLimits, CaptureOutcome, CaptureSession};
pub use encode::{EncodingJob, EncodingReport};
pub use enrollment::{
    EnrollmentCoordinator, EnrollmentEvent, EnrollmentHandle, EnrollmentOutcome, EnrollmentRequest,
    EnrollmentState, FailureReason,
};
pub use identify::{annotate, Identification, Identifier};
pub use maintenance::{CleanupFailure, CleanupStep, DeletionReport, MaintenanceCoordinator, ModelAction};
pub use outcome::OutcomeKind;
pub use session::EnrollmentSession;
pub use summary::RosterSummary;
pub use train::{ClassifierTrainer, TrainingPhase, TrainingReport};
