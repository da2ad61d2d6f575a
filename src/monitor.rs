//! The per-frame driver.
//!
//! Each iteration captures a frame, hands a copy to the identity
//! dispatcher every `dispatch_every` frames, runs object detection on the
//! frame itself, folds everything into the session, draws the overlay,
//! reports, renders and checks for exit. Face overlays show the last
//! completed identity run; object overlays always show the current frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, error, info, warn};

use epiwatch_vision::overlay;

use crate::aggregator::DetectionEvent;
use crate::capability::{Display, FaceAnalyzer, FrameSource, ObjectDetector};
use crate::config::{Config, DetectorFailure};
use crate::dispatch::{Dispatch, IdentityDispatcher};
use crate::error::SessionError;
use crate::matcher::{FaceMatch, FaceName};
use crate::reporter::{self, PeriodicReporter, Report};
use crate::session::{FrameOutcome, Session, Summary};

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: u32 = 2;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub dispatch_every: u64,
    pub min_confidence: f32,
    pub report_interval: Duration,
    pub detector_failure: DetectorFailure,
}

impl MonitorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            dispatch_every: cfg.dispatch_every.max(1),
            min_confidence: cfg.min_confidence,
            report_interval: cfg.report_interval(),
            detector_failure: cfg.detector_failure,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Everything one iteration produced.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub index: u64,
    pub dispatch: Option<Dispatch>,
    /// Face matches drawn on this frame.
    pub faces: Arc<[FaceMatch]>,
    pub detections: Vec<DetectionEvent>,
    pub outcome: FrameOutcome,
    pub report: Option<Report>,
    pub flow: Flow,
}

pub struct Monitor<S, D, V, A: FaceAnalyzer> {
    source: S,
    detector: D,
    display: V,
    identity: IdentityDispatcher<A>,
    session: Session,
    reporter: PeriodicReporter,
    settings: MonitorSettings,
    frame_index: u64,
}

impl<S, D, V, A> Monitor<S, D, V, A>
where
    S: FrameSource,
    D: ObjectDetector,
    V: Display,
    A: FaceAnalyzer,
{
    pub fn new(
        source: S,
        detector: D,
        display: V,
        identity: IdentityDispatcher<A>,
        session: Session,
        settings: MonitorSettings,
    ) -> Self {
        let reporter = PeriodicReporter::new(settings.report_interval, Instant::now());
        Self {
            source,
            detector,
            display,
            identity,
            session,
            reporter,
            settings,
            frame_index: 0,
        }
    }

    pub fn identity(&mut self) -> &mut IdentityDispatcher<A> {
        &mut self.identity
    }

    /// Frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frame_index
    }

    /// Run one iteration of the frame loop.
    pub fn step(&mut self) -> Result<FrameReport, SessionError> {
        let index = self.frame_index;
        let mut frame = self.source.capture().map_err(SessionError::Capture)?;

        let dispatch = if index % self.settings.dispatch_every == 0 {
            let outcome = self.identity.dispatch(Arc::new(frame.clone()));
            debug!("frame {}: identity dispatch {:?}", index, outcome);
            Some(outcome)
        } else {
            None
        };

        let detections: Vec<DetectionEvent> =
            match self.detector.detect(&frame, self.settings.min_confidence) {
                Ok(found) => found
                    .into_iter()
                    .map(|d| DetectionEvent::new(d, index))
                    .collect(),
                Err(e) => match self.settings.detector_failure {
                    DetectorFailure::Fatal => return Err(SessionError::Detector(e)),
                    DetectorFailure::SkipFrame => {
                        warn!("[ppe] detection failed on frame {}: {:#}", index, e);
                        Vec::new()
                    }
                },
            };

        let faces = self.session.faces();
        self.session.announce(&faces);
        let outcome = self.session.record_frame(&detections);
        draw_overlay(&mut frame, &faces, &outcome.qualifying);

        let now = Instant::now();
        let report = if self.reporter.is_due(now) {
            let observed = self.session.observed_labels();
            self.reporter.report_if_due(now, &observed, &detections)
        } else {
            None
        };

        self.display.render(&frame).map_err(SessionError::Render)?;
        self.frame_index += 1;

        let flow = if self.display.exit_requested() {
            Flow::Exit
        } else {
            Flow::Continue
        };

        Ok(FrameReport {
            index,
            dispatch,
            faces,
            detections,
            outcome,
            report,
            flow,
        })
    }

    /// Loop until exit is requested or a fatal error occurs. The final
    /// summary is logged on both paths.
    pub fn run(&mut self) -> Result<Summary, SessionError> {
        info!("=== monitoring started, enter 'q' to stop ===");
        let result = loop {
            match self.step() {
                Ok(r) if r.flow == Flow::Exit => break Ok(()),
                Ok(_) => {}
                Err(e) => {
                    error!("{}: {:#}", e, source_of(&e));
                    break Err(e);
                }
            }
        };

        let summary = self.session.summary();
        reporter::log_final(&summary);
        info!("processed {} frames", self.frame_index);
        result.map(|()| summary)
    }
}

fn source_of(e: &SessionError) -> &anyhow::Error {
    match e {
        SessionError::Capture(inner) | SessionError::Render(inner) | SessionError::Detector(inner) => {
            inner
        }
    }
}

pub fn draw_overlay(frame: &mut RgbImage, faces: &[FaceMatch], items: &[DetectionEvent]) {
    for face in faces {
        let color = match face.name {
            FaceName::Identified(_) => overlay::GREEN,
            FaceName::Unidentified => overlay::YELLOW,
        };
        let corners = face.bbox.corners();
        overlay::draw_box(frame, corners, color, BOX_THICKNESS);
        overlay::draw_label(frame, corners, face.name.as_str(), color, LABEL_SCALE);
    }
    for item in items {
        let text = format!("{} {:.2}", item.label, item.confidence);
        overlay::draw_box(frame, item.bbox, overlay::RED, BOX_THICKNESS);
        overlay::draw_label(frame, item.bbox, &text, overlay::RED, LABEL_SCALE);
        debug!("[ppe] {}", text);
    }
}
