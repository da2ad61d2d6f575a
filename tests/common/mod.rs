#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use epiwatch::capability::{Display, FrameSource};
use epiwatch::{DetectionResult, EmbeddingResult, FaceAnalyzer, FaceBox, ObjectDetector};
use image::{Rgb, RgbImage};

/// Colour that makes `ColorAnalyzer::embed` fail.
pub const POISON: Rgb<u8> = Rgb([255, 0, 255]);

pub fn solid(color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(64, 48, Rgb(color))
}

/// Embeds an image as the RGB value of its top-left pixel.
pub struct ColorAnalyzer {
    pub faces: Vec<FaceBox>,
    pub fail_locate: bool,
    gate: Option<Receiver<()>>,
}

impl ColorAnalyzer {
    pub fn new(faces: Vec<FaceBox>) -> Self {
        Self {
            faces,
            fail_locate: false,
            gate: None,
        }
    }

    /// Block every `locate_faces` call until a message arrives on `gate`.
    pub fn gated(faces: Vec<FaceBox>, gate: Receiver<()>) -> Self {
        Self {
            faces,
            fail_locate: false,
            gate: Some(gate),
        }
    }
}

impl FaceAnalyzer for ColorAnalyzer {
    fn locate_faces(&mut self, _frame: &RgbImage) -> Result<Vec<FaceBox>> {
        if let Some(gate) = &self.gate {
            gate.recv().map_err(|_| anyhow!("gate closed"))?;
        }
        if self.fail_locate {
            return Err(anyhow!("face locator unavailable"));
        }
        Ok(self.faces.clone())
    }

    fn embed(&mut self, face: &RgbImage) -> Result<EmbeddingResult> {
        let px = *face.get_pixel(0, 0);
        if px == POISON {
            return Err(anyhow!("no embedding for this face"));
        }
        Ok(EmbeddingResult::from(
            px.0.iter().map(|&c| c as f32).collect::<Vec<f32>>(),
        ))
    }
}

/// Plays back a fixed list of frames, then fails.
pub struct ScriptedSource {
    frames: VecDeque<RgbImage>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn repeat(frame: RgbImage, n: usize) -> Self {
        Self::new(vec![frame; n])
    }
}

impl FrameSource for ScriptedSource {
    fn capture(&mut self) -> Result<RgbImage> {
        self.frames
            .pop_front()
            .ok_or_else(|| anyhow!("camera disconnected"))
    }
}

/// Returns one scripted batch per call; `None` entries fail.
pub struct ScriptedDetector {
    batches: VecDeque<Option<Vec<DetectionResult>>>,
}

impl ScriptedDetector {
    pub fn new(batches: Vec<Option<Vec<DetectionResult>>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &RgbImage, _min_confidence: f32) -> Result<Vec<DetectionResult>> {
        match self.batches.pop_front() {
            Some(Some(batch)) => Ok(batch),
            Some(None) => Err(anyhow!("inference failed")),
            None => Ok(Vec::new()),
        }
    }
}

pub fn detection(label: &str, confidence: f32) -> DetectionResult {
    DetectionResult {
        label: label.to_string(),
        confidence,
        bbox: [4.0, 4.0, 20.0, 20.0],
    }
}

/// Keeps the last rendered frame; requests exit after `exit_after` renders.
pub struct RecordingDisplay {
    pub last: Arc<Mutex<Option<RgbImage>>>,
    renders: usize,
    exit_after: Option<usize>,
    fail_on: Option<usize>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(None)),
            renders: 0,
            exit_after: None,
            fail_on: None,
        }
    }

    pub fn exit_after(mut self, n: usize) -> Self {
        self.exit_after = Some(n);
        self
    }

    /// Fail the `n`th render (1-based).
    pub fn fail_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }
}

impl Display for RecordingDisplay {
    fn render(&mut self, frame: &RgbImage) -> Result<()> {
        self.renders += 1;
        if self.fail_on == Some(self.renders) {
            return Err(anyhow!("display went away"));
        }
        *self.last.lock().unwrap() = Some(frame.clone());
        Ok(())
    }

    fn exit_requested(&mut self) -> bool {
        self.exit_after.map_or(false, |n| self.renders >= n)
    }
}
