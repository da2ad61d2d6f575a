use std::time::{Duration, Instant};

use log::info;

use crate::aggregator::DetectionEvent;
use crate::session::Summary;

/// Detection summary emitted by the reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub observed_labels: Vec<String>,
    pub current: Vec<DetectionEvent>,
}

impl Report {
    pub fn log(&self) {
        info!("[report] detection summary");
        info!("[report] labels reported during this session:");
        for label in &self.observed_labels {
            info!("[report]   -> {}", label);
        }
        info!("[report] detections in the current frame:");
        if self.current.is_empty() {
            info!("[report]   no detections in this frame");
        }
        for (i, d) in self.current.iter().enumerate() {
            info!(
                "[report]   -> #{}-{} {} (conf: {:.2}, pos: ({:.0}, {:.0}, {:.0}, {:.0}))",
                d.frame_index, i, d.label, d.confidence, d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]
            );
        }
    }
}

/// Rate-limited detection summaries.
#[derive(Debug, Clone)]
pub struct PeriodicReporter {
    interval: Duration,
    last: Instant,
}

impl PeriodicReporter {
    /// The first report becomes due one `interval` after `start`.
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last: start,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) > self.interval
    }

    /// Emit a report when more than `interval` has passed since the last one.
    pub fn report_if_due(
        &mut self,
        now: Instant,
        observed_labels: &[String],
        current: &[DetectionEvent],
    ) -> Option<Report> {
        if !self.is_due(now) {
            return None;
        }
        let mut observed_labels = observed_labels.to_vec();
        observed_labels.sort();
        let report = Report {
            observed_labels,
            current: current.to_vec(),
        };
        report.log();
        self.last = now;
        Some(report)
    }
}

/// Log the end-of-session summary.
pub fn log_final(summary: &Summary) {
    info!("[summary] final list of labels reported during this session:");
    if summary.observed_labels.is_empty() {
        info!("[summary]   none");
    }
    for label in &summary.observed_labels {
        info!("[summary]   -> {}", label);
    }
    info!(
        "[summary] identified: {}",
        if summary.identities.is_empty() {
            "nobody".to_string()
        } else {
            summary.identities.join(", ")
        }
    );
    info!(
        "[summary] compliance {:?}; detected: [{}], outstanding: [{}]",
        summary.status,
        summary.detected.join(", "),
        summary.outstanding.join(", ")
    );
}
