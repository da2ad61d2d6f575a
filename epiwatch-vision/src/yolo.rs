//! YOLOv8-style object detector.
//!
//! The ONNX export produces `[1, 4 + classes, anchors]`: per anchor a
//! centre/size box in letterboxed input pixels followed by one score per
//! class.

use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;
use ort::{session::Session, value::Value};

use crate::geometry;
use crate::model;
use crate::tensor::{self, ChannelOrder, Letterbox};

pub const INPUT_SIZE: u32 = 640;
const PAD_VALUE: u8 = 114;
const NMS_IOU: f32 = 0.45;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    /// x1, y1, x2, y2 in source-image pixels
    pub bbox: [f32; 4],
}

pub struct ObjectDetector {
    session: Session,
    class_labels: Vec<String>,
}

impl ObjectDetector {
    pub fn load(path: &Path, class_labels: Vec<String>) -> Result<Self> {
        Ok(Self {
            session: model::load_session(path, "object detector")?,
            class_labels,
        })
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    pub fn detect(&mut self, img: &RgbImage, min_confidence: f32) -> Result<Vec<ObjectDetection>> {
        let lb = Letterbox::fit(img.width(), img.height(), INPUT_SIZE);
        let canvas = lb.apply(img, PAD_VALUE);
        let input = Value::from_array(tensor::to_nchw(&canvas, ChannelOrder::Rgb, 1.0 / 255.0))?;

        let outputs = self.session.run(ort::inputs![input])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let shape: Vec<i64> = shape.iter().copied().collect();

        let mut found = decode(&shape, data, min_confidence, &self.class_labels)?;
        for det in &mut found {
            det.bbox = [
                lb.unmap_x(det.bbox[0]).clamp(0.0, img.width() as f32),
                lb.unmap_y(det.bbox[1]).clamp(0.0, img.height() as f32),
                lb.unmap_x(det.bbox[2]).clamp(0.0, img.width() as f32),
                lb.unmap_y(det.bbox[3]).clamp(0.0, img.height() as f32),
            ];
        }
        log::debug!("yolo: {} detections", found.len());
        Ok(found)
    }
}

pub fn label_for(class_labels: &[String], class_id: usize) -> String {
    class_labels
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// Decode raw output into canvas-space detections with class-wise NMS applied.
pub fn decode(
    shape: &[i64],
    data: &[f32],
    min_confidence: f32,
    class_labels: &[String],
) -> Result<Vec<ObjectDetection>> {
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        bail!("unexpected yolo output shape {:?}", shape);
    }
    let rows = shape[1] as usize;
    let anchors = shape[2] as usize;
    if data.len() != rows * anchors {
        bail!("yolo output has {} values, shape {:?}", data.len(), shape);
    }
    let at = |row: usize, anchor: usize| data[row * anchors + anchor];

    let mut candidates = Vec::new();
    for a in 0..anchors {
        let (class_id, confidence) = (4..rows)
            .map(|r| (r - 4, at(r, a)))
            .max_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((0, 0.0));
        if confidence < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(0, a), at(1, a), at(2, a), at(3, a));
        candidates.push(ObjectDetection {
            class_id,
            label: label_for(class_labels, class_id),
            confidence,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    let mut kept = Vec::new();
    let mut classes: Vec<usize> = candidates.iter().map(|c| c.class_id).collect();
    classes.sort_unstable();
    classes.dedup();
    for class_id in classes {
        let group: Vec<&ObjectDetection> =
            candidates.iter().filter(|c| c.class_id == class_id).collect();
        let boxes: Vec<[f32; 4]> = group.iter().map(|c| c.bbox).collect();
        let scores: Vec<f32> = group.iter().map(|c| c.confidence).collect();
        kept.extend(
            geometry::nms(&boxes, &scores, NMS_IOU)
                .into_iter()
                .map(|i| group[i].clone()),
        );
    }
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(kept)
}
