//! YuNet (2023mar) output decoding.
//!
//! The network emits twelve tensors, four heads for each of the strides
//! 8, 16 and 32, in the order `cls_*`, `obj_*`, `bbox_*`, `kps_*`. Each
//! head is laid out as `[1, rows * cols, channels]` over the stride grid.
//! Scores are already sigmoid-activated; the face score is
//! `sqrt(cls * obj)`. Box sizes are log-encoded.

use anyhow::{bail, Result};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// A face candidate in model-canvas pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFace {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
    /// Five (x, y) points: right eye, left eye, nose tip, mouth corners.
    pub landmarks: [f32; 10],
}

/// One output tensor as returned by the runtime.
pub struct Tensor<'a> {
    pub shape: &'a [i64],
    pub data: &'a [f32],
}

fn head<'a>(
    outputs: &'a [Tensor<'a>],
    index: usize,
    cells: usize,
    channels: usize,
) -> Result<&'a [f32]> {
    let Some(t) = outputs.get(index) else {
        bail!("yunet output {} missing ({} outputs)", index, outputs.len());
    };
    if t.data.len() != cells * channels {
        bail!(
            "yunet output {} has shape {:?}, expected [1, {}, {}]",
            index,
            t.shape,
            cells,
            channels
        );
    }
    Ok(t.data)
}

/// Decode all faces scoring at least `score_threshold` on an input of
/// `input_size`×`input_size` pixels.
pub fn decode(outputs: &[Tensor<'_>], input_size: usize, score_threshold: f32) -> Result<Vec<RawFace>> {
    let mut faces = Vec::new();

    for (level, &stride) in STRIDES.iter().enumerate() {
        let cols = input_size / stride;
        let cells = cols * cols;
        let cls = head(outputs, level, cells, 1)?;
        let obj = head(outputs, level + 3, cells, 1)?;
        let bbox = head(outputs, level + 6, cells, 4)?;
        let kps = head(outputs, level + 9, cells, 10)?;
        let s = stride as f32;

        for idx in 0..cells {
            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
            if score < score_threshold {
                continue;
            }
            let row = (idx / cols) as f32;
            let col = (idx % cols) as f32;

            let b = &bbox[idx * 4..idx * 4 + 4];
            let cx = (col + b[0]) * s;
            let cy = (row + b[1]) * s;
            let w = b[2].exp() * s;
            let h = b[3].exp() * s;

            let mut landmarks = [0.0f32; 10];
            for k in 0..5 {
                landmarks[k * 2] = (col + kps[idx * 10 + k * 2]) * s;
                landmarks[k * 2 + 1] = (row + kps[idx * 10 + k * 2 + 1]) * s;
            }

            faces.push(RawFace {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    Ok(faces)
}
