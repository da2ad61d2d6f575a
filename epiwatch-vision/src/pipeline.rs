use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::face::{self, Detection, Embedding, FaceDetector, FaceEncoder, ENCODER_INPUT};

pub const SCORE_THRESHOLD: f32 = 0.6;
pub const NMS_THRESHOLD: f32 = 0.3;

/// Face pipeline: detect faces → align → encode.
pub struct FacePipeline {
    pub detector: FaceDetector,
    pub encoder: FaceEncoder,
}

impl FacePipeline {
    pub fn load(detector_model: &Path, encoder_model: &Path) -> Result<Self> {
        Ok(Self {
            detector: FaceDetector::load(detector_model)?,
            encoder: FaceEncoder::load(encoder_model)?,
        })
    }

    /// All faces in the image, strongest first.
    pub fn locate(&mut self, img: &RgbImage) -> Result<Vec<Detection>> {
        let mut faces = self
            .detector
            .detect(img, SCORE_THRESHOLD, NMS_THRESHOLD)
            .context("detecting faces")?;
        faces.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(faces)
    }

    /// Embed the dominant face of an image.
    ///
    /// When no face is found the whole image is encoded as is, which is
    /// what pre-cropped faces and tight gallery portraits need.
    pub fn embed(&mut self, img: &RgbImage) -> Result<Embedding> {
        let faces = self.locate(img)?;
        let aligned = match faces.first() {
            Some(best) => face::align_face(img, best, ENCODER_INPUT),
            None => {
                log::debug!("no face found in {}x{} image, encoding unaligned", img.width(), img.height());
                img.clone()
            }
        };
        self.encoder.encode(&aligned).context("encoding face")
    }
}
