use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbImage;
use log::{debug, info, warn};
use ndarray::Array1;

use crate::capability::{FaceAnalyzer, FaceBox};
use crate::gallery::Gallery;

pub const UNIDENTIFIED: &str = "unidentified";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaceName {
    Identified(String),
    Unidentified,
}

impl FaceName {
    pub fn as_str(&self) -> &str {
        match self {
            FaceName::Identified(name) => name,
            FaceName::Unidentified => UNIDENTIFIED,
        }
    }

    pub fn identified(&self) -> Option<&str> {
        match self {
            FaceName::Identified(name) => Some(name),
            FaceName::Unidentified => None,
        }
    }
}

impl fmt::Display for FaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub bbox: FaceBox,
    pub name: FaceName,
}

/// Closest gallery entry for a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub index: usize,
    pub distance: f32,
}

pub fn euclidean(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let d = a - b;
    d.dot(&d).sqrt()
}

/// Nearest-neighbour identification against the gallery.
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    gallery: Arc<Gallery>,
    threshold: f32,
}

impl IdentityMatcher {
    pub fn new(gallery: Arc<Gallery>, threshold: f32) -> Self {
        Self { gallery, threshold }
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Distance to every gallery entry, in gallery order.
    pub fn distances(&self, probe: &Array1<f32>) -> Vec<f32> {
        self.gallery
            .identities()
            .iter()
            .map(|r| euclidean(probe, &r.embedding))
            .collect()
    }

    /// Minimum-distance entry. Ties go to the earliest entry.
    pub fn nearest(&self, probe: &Array1<f32>) -> Option<Nearest> {
        self.distances(probe)
            .into_iter()
            .enumerate()
            .fold(None, |best, (index, distance)| match best {
                Some(b) if b.distance <= distance => Some(b),
                _ => Some(Nearest { index, distance }),
            })
    }

    /// Name for a probe: the nearest entry unless it is farther than the threshold.
    pub fn identify(&self, probe: &Array1<f32>) -> FaceName {
        let distances = self.distances(probe);
        let listing = self
            .gallery
            .identities()
            .iter()
            .zip(&distances)
            .map(|(r, d)| format!("{}: {:.2}", r.name, d))
            .collect::<Vec<_>>()
            .join(", ");

        let Some(best) = self.nearest(probe) else {
            info!("[identity] face not recognised (empty gallery)");
            return FaceName::Unidentified;
        };

        if best.distance > self.threshold {
            info!(
                "[identity] face not recognised (min distance: {:.2}, threshold: {:.2})",
                best.distance, self.threshold
            );
            info!("[identity] distances: {}", listing);
            FaceName::Unidentified
        } else {
            let name = self.gallery.identities()[best.index].name.clone();
            info!(
                "[identity] face recognised as {} (distance: {:.2})",
                name, best.distance
            );
            info!("[identity] distances: {}", listing);
            FaceName::Identified(name)
        }
    }

    /// Locate, embed and identify every face in `frame`.
    ///
    /// A face whose embedding fails is dropped; failing to locate faces
    /// fails the whole call.
    pub fn match_faces<A: FaceAnalyzer + ?Sized>(
        &self,
        analyzer: &mut A,
        frame: &RgbImage,
    ) -> Result<Vec<FaceMatch>> {
        let (width, height) = frame.dimensions();
        let regions = analyzer.locate_faces(frame).context("locating faces")?;
        let mut matches = Vec::with_capacity(regions.len());

        for region in regions {
            let Some(bbox) = region.clamp_to(width, height) else {
                debug!("[identity] dropping face outside the frame: {:?}", region);
                continue;
            };
            info!(
                "[identity] face at (x={}, y={}, w={}, h={})",
                bbox.x, bbox.y, bbox.w, bbox.h
            );

            let crop = image::imageops::crop_imm(
                frame,
                bbox.x as u32,
                bbox.y as u32,
                bbox.w as u32,
                bbox.h as u32,
            )
            .to_image();

            let probe = match analyzer.embed(&crop) {
                Ok(e) => e.vector,
                Err(e) => {
                    warn!("[identity] failed to extract embedding: {:#}", e);
                    continue;
                }
            };
            if let Some(dim) = self.gallery.dimension() {
                if probe.len() != dim {
                    warn!(
                        "[identity] embedding has {} dimensions, gallery uses {}",
                        probe.len(),
                        dim
                    );
                    continue;
                }
            }

            matches.push(FaceMatch {
                bbox,
                name: self.identify(&probe),
            });
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::ReferenceIdentity;

    fn gallery(entries: &[(&str, Vec<f32>)]) -> Arc<Gallery> {
        let ids = entries
            .iter()
            .map(|(n, v)| ReferenceIdentity {
                name: n.to_string(),
                embedding: Array1::from(v.clone()),
            })
            .collect();
        Arc::new(Gallery::new(ids).unwrap())
    }

    #[test]
    fn test_euclidean() {
        let a = Array1::from(vec![0.0, 0.0]);
        let b = Array1::from(vec![3.0, 4.0]);
        assert!((euclidean(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn alice_within_threshold() {
        let m = IdentityMatcher::new(
            gallery(&[("Alice", vec![0.0, 0.0]), ("Bob", vec![50.0, 0.0])]),
            15.0,
        );
        // 10 from Alice, 40 from Bob
        let probe = Array1::from(vec![10.0, 0.0]);
        assert_eq!(m.identify(&probe), FaceName::Identified("Alice".into()));
    }

    #[test]
    fn beyond_threshold_is_unidentified() {
        let m = IdentityMatcher::new(gallery(&[("Alice", vec![0.0])]), 15.0);
        assert_eq!(m.identify(&Array1::from(vec![15.5])), FaceName::Unidentified);
        // the threshold itself still matches
        assert_eq!(
            m.identify(&Array1::from(vec![15.0])),
            FaceName::Identified("Alice".into())
        );
    }

    #[test]
    fn ties_go_to_the_earliest_entry() {
        let m = IdentityMatcher::new(
            gallery(&[("First", vec![-1.0]), ("Second", vec![1.0])]),
            15.0,
        );
        let best = m.nearest(&Array1::from(vec![0.0])).unwrap();
        assert_eq!(best.index, 0);
        assert_eq!(
            m.identify(&Array1::from(vec![0.0])),
            FaceName::Identified("First".into())
        );
    }

    #[test]
    fn empty_gallery_never_identifies() {
        let m = IdentityMatcher::new(Arc::new(Gallery::default()), 15.0);
        assert!(m.nearest(&Array1::from(vec![0.0])).is_none());
        assert_eq!(m.identify(&Array1::from(vec![0.0])), FaceName::Unidentified);
    }

    #[test]
    fn unidentified_displays_placeholder() {
        assert_eq!(FaceName::Unidentified.to_string(), UNIDENTIFIED);
        assert_eq!(FaceName::Identified("Ana".into()).identified(), Some("Ana"));
    }
}
