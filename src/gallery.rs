use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info};
use ndarray::Array1;

use crate::capability::FaceAnalyzer;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceIdentity {
    pub name: String,
    pub embedding: Array1<f32>,
}

/// Reference identities in load order. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<ReferenceIdentity>,
}

impl Gallery {
    /// Build a gallery; every embedding must have the same length.
    pub fn new(identities: Vec<ReferenceIdentity>) -> Result<Self> {
        if let Some(first) = identities.first() {
            let dim = first.embedding.len();
            if let Some(odd) = identities.iter().find(|i| i.embedding.len() != dim) {
                anyhow::bail!(
                    "embedding for {} has {} dimensions, expected {}",
                    odd.name,
                    odd.embedding.len(),
                    dim
                );
            }
        }
        Ok(Self { identities })
    }

    /// Embed every image in `dir`, named after the file stem.
    ///
    /// Files that cannot be read or embedded are logged and skipped.
    pub fn load<A: FaceAnalyzer + ?Sized>(dir: &Path, analyzer: &mut A) -> Result<Self> {
        info!("[gallery] loading reference identities from {}", dir.display());
        let mut identities: Vec<ReferenceIdentity> = Vec::new();

        for path in image_files(dir)? {
            let name = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().into_owned(),
                None => continue,
            };
            match embed_file(&path, analyzer) {
                Ok(embedding) => {
                    if let Some(first) = identities.first() {
                        if first.embedding.len() != embedding.len() {
                            error!(
                                "[gallery] {}: embedding has {} dimensions, expected {}",
                                path.display(),
                                embedding.len(),
                                first.embedding.len()
                            );
                            continue;
                        }
                    }
                    info!("[gallery] loaded embedding for {}", name);
                    identities.push(ReferenceIdentity { name, embedding });
                }
                Err(e) => error!("[gallery] failed to process {}: {:#}", path.display(), e),
            }
        }

        info!("[gallery] {} identities loaded", identities.len());
        Self::new(identities)
    }

    pub fn identities(&self) -> &[ReferenceIdentity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.identities.first().map(|i| i.embedding.len())
    }
}

fn embed_file<A: FaceAnalyzer + ?Sized>(path: &Path, analyzer: &mut A) -> Result<Array1<f32>> {
    let img = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();
    Ok(analyzer.embed(&img)?.vector)
}

/// Image files in `dir`, sorted by file name.
fn image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading gallery {}", dir.display()))?;
    Ok(select_images(dir, entries.map(|e| e.map(|e| e.path()))))
}

/// Keeps readable image paths; an entry that fails is logged and skipped.
fn select_images<I>(dir: &Path, entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                error!("[gallery] skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    files
}
