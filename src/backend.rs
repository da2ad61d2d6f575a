//! Capability implementations backed by `epiwatch-vision`.

use anyhow::{Context, Result};
use image::RgbImage;

use epiwatch_vision::{Camera, FacePipeline, ObjectDetector as YoloDetector};

use crate::capability::{
    DetectionResult, EmbeddingResult, FaceAnalyzer, FaceBox, FrameSource, ObjectDetector,
};
use crate::config::Config;

pub struct VisionFaceAnalyzer {
    pipeline: FacePipeline,
}

impl VisionFaceAnalyzer {
    pub fn load(cfg: &Config) -> Result<Self> {
        let pipeline = FacePipeline::load(&cfg.face_detector_model, &cfg.face_encoder_model)
            .context("Failed to initialize face recognition pipeline")?;
        Ok(Self { pipeline })
    }
}

impl FaceAnalyzer for VisionFaceAnalyzer {
    fn locate_faces(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>> {
        Ok(self
            .pipeline
            .locate(frame)?
            .into_iter()
            .map(|d| {
                let [x, y, w, h] = d.bbox;
                FaceBox::new(x.round() as i32, y.round() as i32, w.round() as i32, h.round() as i32)
            })
            .collect())
    }

    fn embed(&mut self, face: &RgbImage) -> Result<EmbeddingResult> {
        let embedding = self.pipeline.embed(face)?;
        Ok(EmbeddingResult {
            vector: embedding.vector,
        })
    }
}

pub struct VisionObjectDetector {
    detector: YoloDetector,
}

impl VisionObjectDetector {
    pub fn load(cfg: &Config) -> Result<Self> {
        let detector = YoloDetector::load(&cfg.object_detector_model, cfg.class_labels.clone())
            .context("Failed to initialize object detector")?;
        Ok(Self { detector })
    }
}

impl ObjectDetector for VisionObjectDetector {
    fn detect(&mut self, frame: &RgbImage, min_confidence: f32) -> Result<Vec<DetectionResult>> {
        Ok(self
            .detector
            .detect(frame, min_confidence)?
            .into_iter()
            .map(|d| DetectionResult {
                label: d.label,
                confidence: d.confidence,
                bbox: d.bbox,
            })
            .collect())
    }

    fn classes(&self) -> Vec<String> {
        self.detector.class_labels().to_vec()
    }
}

pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn open(cfg: &Config) -> Result<Self> {
        let (width, height) = cfg.resolution;
        let camera = Camera::open(&cfg.camera, width, height).context("Failed to open camera")?;
        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn capture(&mut self) -> Result<RgbImage> {
        self.camera.frame()
    }
}
