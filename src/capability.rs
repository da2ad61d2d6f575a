//! Seams to the perception and I/O collaborators.
//!
//! The monitor only ever sees the boundary types defined here; backend
//! specific outputs are converted as soon as they cross a trait method.

use anyhow::Result;
use image::RgbImage;
use ndarray::Array1;

/// Face region as reported by a locator, in frame pixels. May extend
/// past the frame edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Clip to a `width`x`height` frame. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<FaceBox> {
        let x = self.x.max(0);
        let y = self.y.max(0);
        let w = self.w.min(width as i32 - x);
        let h = self.h.min(height as i32 - y);
        if w <= 0 || h <= 0 {
            return None;
        }
        Some(FaceBox { x, y, w, h })
    }

    /// `[x1, y1, x2, y2]`
    pub fn corners(&self) -> [f32; 4] {
        [
            self.x as f32,
            self.y as f32,
            (self.x + self.w) as f32,
            (self.y + self.h) as f32,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub vector: Array1<f32>,
}

impl From<Vec<f32>> for EmbeddingResult {
    fn from(v: Vec<f32>) -> Self {
        Self {
            vector: Array1::from(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub label: String,
    pub confidence: f32,
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
}

/// Finds faces and turns face images into embeddings.
///
/// Owned by one identity task at a time, hence `Send`.
pub trait FaceAnalyzer: Send + 'static {
    fn locate_faces(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>>;

    fn embed(&mut self, face: &RgbImage) -> Result<EmbeddingResult>;
}

pub trait ObjectDetector {
    /// Detections with confidence of at least `min_confidence`. Backends
    /// may return lower scores; callers filter again.
    fn detect(&mut self, frame: &RgbImage, min_confidence: f32) -> Result<Vec<DetectionResult>>;

    /// Class names the detector can report, by class id.
    fn classes(&self) -> Vec<String> {
        Vec::new()
    }
}

pub trait FrameSource {
    fn capture(&mut self) -> Result<RgbImage>;
}

pub trait Display {
    fn render(&mut self, frame: &RgbImage) -> Result<()>;

    /// Polled once per frame after rendering.
    fn exit_requested(&mut self) -> bool;
}
