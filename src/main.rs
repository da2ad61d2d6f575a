use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use epiwatch::backend::{CameraSource, VisionFaceAnalyzer, VisionObjectDetector};
use epiwatch::config::{self, Config};
use epiwatch::dispatch::IdentityDispatcher;
use epiwatch::display::{ExitSignal, SnapshotDisplay};
use epiwatch::{
    ComplianceState, Gallery, IdentityMatcher, Monitor, MonitorSettings, ObjectDetector, Session,
    SessionError,
};
use log::{error, info, warn};

#[derive(Parser)]
#[command(name = "epiwatch")]
#[command(
    version,
    about = "Live face identification and PPE compliance monitoring"
)]
struct Cli {
    /// Config file (defaults to the installed config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the camera until 'q' is entered
    Run,
    /// Load the reference gallery and list its identities
    Gallery,
    /// List the object detector classes
    Classes,
    /// Open config file in editor
    Config,
}

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<SessionError>() {
            // already logged by the monitor
            Some(session_error) => ExitCode::from(session_error.exit_code()),
            None => {
                error!("{:#}", e);
                ExitCode::from(1)
            }
        },
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let load = || -> Result<Config> {
        let cfg = config::load_config(config_path)?;
        cfg.validate()?;
        Ok(cfg)
    };

    match cli.command {
        Commands::Run => run(&load()?),
        Commands::Gallery => list_gallery(&load()?),
        Commands::Classes => list_classes(&load()?),
        // skips loading so a broken config can still be fixed
        Commands::Config => open_config(config_path.unwrap_or(&config::CONFIG_PATH)),
    }
}

fn run(cfg: &Config) -> Result<()> {
    let mut analyzer = VisionFaceAnalyzer::load(cfg)?;
    let gallery = Gallery::load(&cfg.gallery_dir, &mut analyzer)?;
    if gallery.is_empty() {
        warn!("gallery is empty, every face will be reported as unidentified");
    }

    let detector = VisionObjectDetector::load(cfg)?;
    log_classes(&detector.classes(), &cfg.required_labels);

    info!("Opening camera: {}", cfg.camera);
    let source = CameraSource::open(cfg)?;

    let session = Session::new(ComplianceState::new(
        cfg.required_labels.iter().cloned(),
        cfg.min_confidence,
        cfg.compliance,
    ));
    let matcher = Arc::new(IdentityMatcher::new(Arc::new(gallery), cfg.face_threshold));
    let identity = IdentityDispatcher::new(analyzer, matcher, session.clone());
    let display = SnapshotDisplay::new(&cfg.snapshot_path, ExitSignal::watch_stdin());

    let mut monitor = Monitor::new(
        source,
        detector,
        display,
        identity,
        session,
        MonitorSettings::from_config(cfg),
    );
    let result = monitor.run();
    // releases the camera
    drop(monitor);
    result?;
    Ok(())
}

fn list_gallery(cfg: &Config) -> Result<()> {
    let mut analyzer = VisionFaceAnalyzer::load(cfg)?;
    let gallery = Gallery::load(&cfg.gallery_dir, &mut analyzer)?;
    for identity in gallery.identities() {
        println!("{}\t{} dims", identity.name, identity.embedding.len());
    }
    Ok(())
}

fn list_classes(cfg: &Config) -> Result<()> {
    let detector = VisionObjectDetector::load(cfg)?;
    for (id, name) in detector.classes().iter().enumerate() {
        let marker = if cfg.required_labels.contains(name) { " (required)" } else { "" };
        println!("{}\t{}{}", id, name, marker);
    }
    Ok(())
}

fn log_classes(classes: &[String], required: &[String]) {
    if classes.is_empty() {
        warn!("[ppe] no class_labels configured, detections will be named class_<id>");
        return;
    }
    info!("[ppe] detector classes:");
    for (id, name) in classes.iter().enumerate() {
        info!("[ppe]   -> class {}: {}", id, name);
    }
    for label in required.iter().filter(|l| !classes.contains(l)) {
        warn!("[ppe] required label {:?} is not a detector class", label);
    }
}

fn open_config(path: &Path) -> Result<()> {
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {}", path.display());

    if !path.exists() {
        config::save_config(&Config::default(), Some(path))
            .context("Failed to write default config")?;
    }

    let status = std::process::Command::new(editor)
        .arg(path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
