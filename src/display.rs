use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use image::RgbImage;
use log::{info, warn};

use crate::capability::Display;

/// Shared "stop the session" flag.
#[derive(Debug, Clone, Default)]
pub struct ExitSignal {
    flag: Arc<AtomicBool>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag when `q` is entered on stdin.
    pub fn watch_stdin() -> Self {
        let signal = Self::new();
        let flag = Arc::clone(&signal.flag);
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(l) if is_quit(&l) => {
                        flag.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("stdin closed: {}", e);
                        break;
                    }
                }
            }
        });
        signal
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

fn is_quit(line: &str) -> bool {
    matches!(line.trim(), "q" | "Q" | "quit")
}

/// Writes each rendered frame to an image file, replacing it atomically.
pub struct SnapshotDisplay {
    path: PathBuf,
    staging: PathBuf,
    exit: ExitSignal,
}

impl SnapshotDisplay {
    pub fn new(path: &Path, exit: ExitSignal) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame.png".to_string());
        info!("rendering annotated frames to {}", path.display());
        Self {
            path: path.to_path_buf(),
            staging: path.with_file_name(format!(".{}", name)),
            exit,
        }
    }
}

impl Display for SnapshotDisplay {
    fn render(&mut self, frame: &RgbImage) -> Result<()> {
        frame
            .save(&self.staging)
            .with_context(|| format!("writing {}", self.staging.display()))?;
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn exit_requested(&mut self) -> bool {
        self.exit.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_words() {
        assert!(is_quit("q\n"));
        assert!(is_quit(" quit "));
        assert!(!is_quit("query"));
    }

    #[test]
    fn snapshot_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.png");
        let exit = ExitSignal::new();
        let mut display = SnapshotDisplay::new(&path, exit.clone());

        display.render(&RgbImage::new(4, 3)).unwrap();
        display.render(&RgbImage::new(8, 6)).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));

        assert!(!display.exit_requested());
        exit.trigger();
        assert!(display.exit_requested());
    }

    #[test]
    fn unwritable_target_is_an_error() {
        let mut display =
            SnapshotDisplay::new(Path::new("/nonexistent/dir/live.png"), ExitSignal::new());
        assert!(display.render(&RgbImage::new(2, 2)).is_err());
    }
}
