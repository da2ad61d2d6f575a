use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::Array1;
use ort::{session::Session, value::Value};

use crate::geometry;
use crate::model;
use crate::tensor::{self, ChannelOrder, Letterbox};
use crate::yunet;

/// Side of the square YuNet input.
pub const DETECTOR_INPUT: u32 = 640;
/// Side of the square SFace input.
pub const ENCODER_INPUT: u32 = 112;
/// Largest Euclidean distance between two `FaceEncoder` embeddings, which are unit length.
pub const MAX_EMBEDDING_DISTANCE: f32 = 2.0;
/// SFace's same-person cutoff for the L2 distance of normalised features.
pub const SFACE_L2_THRESHOLD: f32 = 1.128;

/// Face found by YuNet, in source-image pixels.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

impl Detection {
    fn corners(&self) -> [f32; 4] {
        let [x, y, w, h] = self.bbox;
        [x, y, x + w, y + h]
    }
}

/// L2-normalised SFace output.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            session: model::load_session(path, "face detector")?,
        })
    }

    pub fn detect(
        &mut self,
        img: &RgbImage,
        score_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let lb = Letterbox::fit(img.width(), img.height(), DETECTOR_INPUT);
        let canvas = lb.apply(img, 0);
        let input = Value::from_array(tensor::to_nchw(&canvas, ChannelOrder::Bgr, 1.0))?;

        let outputs = self.session.run(ort::inputs![input])?;
        let mut owned: Vec<(Vec<i64>, Vec<f32>)> = Vec::with_capacity(outputs.len());
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            owned.push((shape.iter().copied().collect(), data.to_vec()));
        }
        let views: Vec<yunet::Tensor<'_>> = owned
            .iter()
            .map(|(shape, data)| yunet::Tensor { shape, data })
            .collect();

        let raw = yunet::decode(&views, DETECTOR_INPUT as usize, score_threshold)
            .context("decoding yunet outputs")?;

        let faces: Vec<Detection> = raw
            .into_iter()
            .map(|f| {
                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = lb.unmap_x(f.landmarks[k * 2]);
                    landmarks[k * 2 + 1] = lb.unmap_y(f.landmarks[k * 2 + 1]);
                }
                Detection {
                    bbox: [
                        lb.unmap_x(f.bbox[0]),
                        lb.unmap_y(f.bbox[1]),
                        f.bbox[2] / lb.scale,
                        f.bbox[3] / lb.scale,
                    ],
                    score: f.score,
                    landmarks,
                }
            })
            .collect();

        Ok(suppress(faces, nms_threshold))
    }
}

fn suppress(faces: Vec<Detection>, nms_threshold: f32) -> Vec<Detection> {
    if nms_threshold >= 1.0 || faces.len() < 2 {
        return faces;
    }
    let boxes: Vec<[f32; 4]> = faces.iter().map(Detection::corners).collect();
    let scores: Vec<f32> = faces.iter().map(|f| f.score).collect();
    geometry::nms(&boxes, &scores, nms_threshold)
        .into_iter()
        .map(|i| faces[i].clone())
        .collect()
}

pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            session: model::load_session(path, "face encoder")?,
        })
    }

    /// Encode a face image. Images that are not 112x112 are resized first.
    pub fn encode(&mut self, face: &RgbImage) -> Result<Embedding> {
        let face = if face.dimensions() == (ENCODER_INPUT, ENCODER_INPUT) {
            face.clone()
        } else {
            image::imageops::resize(face, ENCODER_INPUT, ENCODER_INPUT, FilterType::Triangle)
        };
        let input = Value::from_array(tensor::to_nchw(&face, ChannelOrder::Bgr, 1.0))?;

        let outputs = self.session.run(ort::inputs![input])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        if data.is_empty() {
            anyhow::bail!("face encoder returned an empty tensor");
        }

        Ok(Embedding {
            vector: l2_normalize(Array1::from(data.to_vec())),
        })
    }
}

pub fn l2_normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v / norm
    } else {
        v
    }
}

/// Similarity-align a face so its eyes land on the 112x112 ArcFace
/// reference positions, scaled to `size`.
pub fn align_face(img: &RgbImage, detection: &Detection, size: u32) -> RgbImage {
    const REF_LEFT: (f32, f32) = (38.29, 51.70);
    const REF_RIGHT: (f32, f32) = (73.53, 51.50);

    let k = size as f32 / 112.0;
    // landmarks[0..2] is the eye on the image left
    let src_l = (detection.landmarks[0], detection.landmarks[1]);
    let src_r = (detection.landmarks[2], detection.landmarks[3]);
    let dst_l = (REF_LEFT.0 * k, REF_LEFT.1 * k);
    let dst_r = (REF_RIGHT.0 * k, REF_RIGHT.1 * k);

    // dst = s * R * src + t, solved from the two eye correspondences
    let (sx, sy) = (src_r.0 - src_l.0, src_r.1 - src_l.1);
    let (dx, dy) = (dst_r.0 - dst_l.0, dst_r.1 - dst_l.1);
    let src_len2 = (sx * sx + sy * sy).max(f32::EPSILON);
    let a = (sx * dx + sy * dy) / src_len2;
    let b = (sx * dy - sy * dx) / src_len2;
    let tx = dst_l.0 - (a * src_l.0 - b * src_l.1);
    let ty = dst_l.1 - (b * src_l.0 + a * src_l.1);

    // inverse of [[a, -b], [b, a]]
    let det = (a * a + b * b).max(f32::EPSILON);
    let (w, h) = img.dimensions();
    let mut out = RgbImage::new(size, size);
    if w < 2 || h < 2 {
        return out;
    }

    for oy in 0..size {
        for ox in 0..size {
            let px = ox as f32 - tx;
            let py = oy as f32 - ty;
            let ix = (a * px + b * py) / det;
            let iy = (-b * px + a * py) / det;
            if ix < 0.0 || iy < 0.0 || ix >= (w - 1) as f32 || iy >= (h - 1) as f32 {
                continue;
            }
            out.put_pixel(ox, oy, bilinear(img, ix, iy));
        }
    }
    out
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x0 + 1, y0).0;
    let p01 = img.get_pixel(x0, y0 + 1).0;
    let p11 = img.get_pixel(x0 + 1, y0 + 1).0;

    let mut px = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        px[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(px)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection_with_eyes(l: (f32, f32), r: (f32, f32)) -> Detection {
        let mut landmarks = [0.0; 10];
        landmarks[0] = l.0;
        landmarks[1] = l.1;
        landmarks[2] = r.0;
        landmarks[3] = r.1;
        Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            score: 0.9,
            landmarks,
        }
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(Array1::from(vec![3.0, 4.0]));
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        let zero = l2_normalize(Array1::from(vec![0.0, 0.0]));
        assert_eq!(zero[0], 0.0);
    }

    #[test]
    fn identity_alignment_preserves_reference_eyes() {
        // Eyes already at the reference positions: the transform is identity.
        let mut img = RgbImage::from_pixel(112, 112, Rgb([0, 0, 0]));
        img.put_pixel(60, 60, Rgb([255, 255, 255]));
        let det = detection_with_eyes((38.29, 51.70), (73.53, 51.50));
        let out = align_face(&img, &det, 112);
        assert_eq!(out.dimensions(), (112, 112));
        assert!(out.get_pixel(60, 60).0[0] > 200);
    }

    #[test]
    fn alignment_scales_distant_eyes_down() {
        let img = RgbImage::from_pixel(400, 400, Rgb([120, 120, 120]));
        let det = detection_with_eyes((100.0, 200.0), (300.0, 200.0));
        let out = align_face(&img, &det, 112);
        // centre of the output samples inside the grey source
        assert_eq!(out.get_pixel(56, 56).0, [120, 120, 120]);
    }

    #[test]
    fn test_suppress_overlapping_faces() {
        let faces = vec![
            Detection {
                bbox: [10.0, 10.0, 20.0, 20.0],
                score: 0.9,
                landmarks: [0.0; 10],
            },
            Detection {
                bbox: [12.0, 12.0, 20.0, 20.0],
                score: 0.8,
                landmarks: [0.0; 10],
            },
            Detection {
                bbox: [100.0, 100.0, 20.0, 20.0],
                score: 0.85,
                landmarks: [0.0; 10],
            },
        ];
        assert_eq!(suppress(faces, 0.3).len(), 2);
    }
}
