use face_roster::{
    camera::V4lCamera,
    cli::{self, AsciiRenderer},
    common::{self, Config, RosterError},
    core::{FaceDetector, OnnxExtractor},
    pipeline::{
        self, CaptureEvent, ClassifierTrainer, EncodingJob, EnrollmentCoordinator, EnrollmentEvent, EnrollmentHandle,
        EnrollmentOutcome, EnrollmentRequest, EnrollmentState, Identifier, MaintenanceCoordinator, ModelAction,
        OutcomeKind, RosterSummary,
    },
    storage::{AttendanceStore, EmbeddingStore, JsonRecordStore, ModelStore, PersonStatus, RecordRepository},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::terminal;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "face-roster")]
#[command(about = "Face enrollment and recognition roster")]
struct Cli {
    /// Configuration file (default: configs/face-roster.toml, then user, then system)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging with source locations
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face samples for a new person and record them
    Enroll {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        name: String,
        /// Print progress lines instead of the camera preview
        #[arg(long)]
        no_preview: bool,
    },
    /// Embed the faces of the most recently enrolled person
    Encode,
    /// Train the classifier on all stored embeddings
    Train,
    /// List enrolled people
    List,
    /// Delete a person with their samples, embeddings and attendance
    Delete {
        #[arg(short, long)]
        id: String,
    },
    /// Change a person's name or status
    Modify {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        name: Option<String>,
        /// enrolled, active or inactive
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Export the roster as CSV
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show roster statistics
    Status,
    /// Recognise the faces in an image
    Identify {
        #[arg(short, long)]
        image: PathBuf,
        /// Save a copy with boxes drawn around the faces
        #[arg(short, long)]
        annotate: Option<PathBuf>,
    },
    /// List video capture devices
    ListCameras,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose);

    if let Commands::ListCameras = args.command {
        return list_cameras();
    }

    let config_path = args.config.unwrap_or_else(common::resolve_config_file);
    let config = Arc::new(
        Config::load_from_path(&config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?,
    );
    let records: Arc<dyn RecordRepository> = Arc::new(JsonRecordStore::new(&config.storage.records_path));

    match args.command {
        Commands::Enroll { id, name, no_preview } => {
            let preview = config.preview.enabled && !no_preview;
            enroll(config, records, EnrollmentRequest::new(id, name), preview)?;
        }
        Commands::Encode => {
            let extractor = OnnxExtractor::new(&config)?;
            let store = EmbeddingStore::new(&config.storage.embeddings_path);
            let job = EncodingJob::from_config(&config);

            match job.run(&extractor, &store, &mut |done, total| eprint!("\rEncoding {}/{}", done, total)) {
                Ok(report) => {
                    eprintln!();
                    println!(
                        "Encoded {}: {} new embeddings from {} images ({} skipped), {} in store",
                        report.person_id, report.new_embeddings, report.images, report.skipped, report.total_embeddings
                    );
                }
                Err(e) => handle_failure(e)?,
            }
        }
        Commands::Train => {
            let store = EmbeddingStore::new(&config.storage.embeddings_path);
            let trainer = ClassifierTrainer::from_config(&config);

            match trainer.train_from_store(&store, &mut |phase| println!("{}...", phase)) {
                Ok(report) => println!(
                    "Trained on {} embeddings of {} people at {}",
                    report.samples,
                    report.classes.len(),
                    report.trained_at.format("%Y-%m-%d %H:%M:%S")
                ),
                Err(e) => handle_failure(e)?,
            }
        }
        Commands::List => {
            let people = records.list_all()?;
            if people.is_empty() {
                println!("No one is enrolled yet.");
            } else {
                println!("{:<10} {:<30} {}", "ID", "NAME", "STATUS");
                for person in &people {
                    println!("{:<10} {:<30} {}", person.person_id, person.name, person.status);
                }
            }
        }
        Commands::Delete { id } => {
            let maintenance = MaintenanceCoordinator::new(Arc::clone(&config), records);
            let report = match maintenance.delete_person(&id) {
                Ok(report) => report,
                Err(e) => return handle_failure(e),
            };

            println!("Deleted {} ({})", report.record.person_id, report.record.name);
            println!("  face samples removed: {}", report.samples_removed);
            println!("  attendance removed:   {}", report.attendance_removed);
            println!("  embeddings removed:   {}", report.embeddings_removed);
            match &report.model {
                Some(ModelAction::Retrained { classes }) => println!("  model retrained on {} people", classes),
                Some(ModelAction::Cleared) => println!("  model cleared (fewer than two people left)"),
                None => {}
            }
            for failure in &report.failures {
                eprintln!("  cleanup of {} failed: {}", failure.step, failure.message);
            }
        }
        Commands::Modify { id, name, status } => {
            let existing = records
                .lookup(id.trim())?
                .ok_or_else(|| RosterError::NotFound(id.trim().to_string()))?;
            let name = name.unwrap_or(existing.name);
            let status = match status {
                Some(text) => text.parse::<PersonStatus>()?,
                None => existing.status,
            };

            let maintenance = MaintenanceCoordinator::new(Arc::clone(&config), records);
            let updated = maintenance.modify_person(&id, &name, status)?;
            println!("Updated {}: {} ({})", updated.person_id, updated.name, updated.status);
        }
        Commands::Export { output } => {
            let people = records.list_all()?;
            let count = cli::export_records(&people, &output)?;
            println!("Exported {} records to {}", count, output.display());
        }
        Commands::Status => {
            let summary = RosterSummary::collect(
                records.as_ref(),
                &EmbeddingStore::new(&config.storage.embeddings_path),
                &ModelStore::new(&config.storage.classifier_path, &config.storage.label_encoder_path),
                &AttendanceStore::new(&config.storage.attendance_path),
            )?;
            println!("{}", summary);
        }
        Commands::Identify { image, annotate } => {
            let models = ModelStore::new(&config.storage.classifier_path, &config.storage.label_encoder_path);
            let identifier = Identifier::load(&models, config.recognition.threshold)?;
            let extractor = OnnxExtractor::new(&config)?;
            let img = image::open(&image).with_context(|| format!("Failed to open {}", image.display()))?;

            let results = identifier.identify(&extractor, &img, config.capture.detection_backend)?;
            if results.is_empty() {
                println!("No faces found in {}", image.display());
            }
            for (i, result) in results.iter().enumerate() {
                let who = match &result.person_id {
                    Some(id) => records
                        .lookup(id)?
                        .map(|r| format!("{} ({})", id, r.name))
                        .unwrap_or_else(|| id.clone()),
                    None => "unknown".to_string(),
                };
                println!(
                    "Face {} at ({:.0}, {:.0}): {} [{:.1}%]",
                    i + 1,
                    result.face.x1,
                    result.face.y1,
                    who,
                    result.probability * 100.0
                );
            }

            if let Some(output) = annotate {
                pipeline::annotate(&img, &results)
                    .save(&output)
                    .with_context(|| format!("Failed to save {}", output.display()))?;
                println!("Annotated image saved to {}", output.display());
            }
        }
        Commands::ListCameras => list_cameras()?,
    }

    Ok(())
}

fn enroll(
    config: Arc<Config>,
    records: Arc<dyn RecordRepository>,
    request: EnrollmentRequest,
    preview: bool,
) -> Result<()> {
    let camera = Arc::new(V4lCamera::new(&config.camera));
    let detector = Arc::new(FaceDetector::new(&config)?);
    let coordinator = EnrollmentCoordinator::new(Arc::clone(&config), records, camera, detector)?;

    println!("Enrolling {} ({})", request.person_id, request.name);
    let handle = coordinator.start(request)?;

    if preview {
        let renderer = AsciiRenderer::new(config.preview.ascii_width, config.preview.ascii_height);
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        let watched = watch_with_preview(&handle, &renderer);
        terminal::disable_raw_mode().context("Failed to disable raw mode")?;
        crossterm::execute!(io::stdout(), crossterm::cursor::Show).ok();
        cli::clear_screen().ok();
        watched?;
    } else {
        watch_with_progress(&handle);
    }

    let outcome = handle.wait()?;
    report_enrollment(&outcome)
}

fn watch_with_preview(handle: &EnrollmentHandle, renderer: &AsciiRenderer) -> Result<()> {
    cli::clear_screen().ok();
    crossterm::execute!(io::stdout(), crossterm::cursor::Hide).ok();

    loop {
        if cli::check_for_escape()? {
            handle.cancel();
        }

        match handle.events.recv_timeout(Duration::from_millis(50)) {
            Ok(EnrollmentEvent::Capture(CaptureEvent::Frame { frame, faces, saved, target })) => {
                let ascii = renderer.render_frame_with_progress(&frame, &faces, saved, target);
                crossterm::execute!(
                    io::stdout(),
                    crossterm::cursor::MoveTo(0, 0),
                    crossterm::style::Print(&ascii)
                )
                .ok();
            }
            Ok(EnrollmentEvent::Finished(_)) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

fn watch_with_progress(handle: &EnrollmentHandle) {
    for event in handle.events.iter() {
        match event {
            EnrollmentEvent::State(EnrollmentState::Capturing) => println!("Look at the camera..."),
            EnrollmentEvent::Capture(CaptureEvent::Saved { saved, target }) => {
                println!("{}", cli::progress_bar(saved, target));
            }
            EnrollmentEvent::Finished(_) => break,
            _ => {}
        }
    }
}

fn report_enrollment(outcome: &EnrollmentOutcome) -> Result<()> {
    match outcome.kind {
        OutcomeKind::Success => {
            println!("{}", outcome.message);
            println!("Run `face-roster encode` and `face-roster train` to update the model.");
            Ok(())
        }
        OutcomeKind::Cancelled => {
            println!("{}", outcome.message);
            Ok(())
        }
        kind => anyhow::bail!("Enrollment {}: {}", kind, outcome.message),
    }
}

/// Non-failures such as "nothing to do" are printed; the rest propagate.
fn handle_failure(error: RosterError) -> Result<()> {
    let kind = OutcomeKind::from(&error);
    if kind.is_failure() {
        return Err(error.into());
    }
    println!("{}: {}", kind, error);
    Ok(())
}

fn list_cameras() -> Result<()> {
    let cameras = V4lCamera::list_all_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found. Check that /dev/video* exists and is readable.");
        return Ok(());
    }

    for camera in &cameras {
        let capture = if camera.video_capture { "" } else { " (no video capture)" };
        println!("/dev/video{}: {}{}", camera.index, camera.name, capture);
        if !camera.formats.is_empty() {
            println!("   formats: {}", camera.formats.join(", "));
        }
    }
    println!("\nSet [camera] device_index in the configuration to choose one.");
    Ok(())
}

fn setup_logging(verbose: bool) {
    // stderr keeps log lines out of the preview
    if verbose {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
