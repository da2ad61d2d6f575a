//! Cumulative PPE compliance over the detection history.

use std::collections::BTreeSet;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::capability::DetectionResult;

/// One detector report, tagged with the frame it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub label: String,
    pub confidence: f32,
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
    pub frame_index: u64,
}

impl DetectionEvent {
    pub fn new(result: DetectionResult, frame_index: u64) -> Self {
        Self {
            label: result.label,
            confidence: result.confidence,
            bbox: result.bbox,
            frame_index,
        }
    }
}

/// When the compliance state may leave `Satisfied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompliancePolicy {
    /// Satisfied once every required label has ever been seen; never reverts.
    #[default]
    Latching,
    /// Satisfied while the current frame shows every required label.
    PerFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplianceStatus {
    Monitoring,
    Satisfied,
}

/// What a single frame changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceUpdate {
    /// Required labels seen for the first time, in frame order.
    pub newly_detected: Vec<String>,
    /// Set when the status changed on this frame.
    pub transition: Option<ComplianceStatus>,
}

#[derive(Debug, Clone)]
pub struct ComplianceState {
    required: BTreeSet<String>,
    detected: BTreeSet<String>,
    status: ComplianceStatus,
    policy: CompliancePolicy,
    min_confidence: f32,
}

impl ComplianceState {
    pub fn new<I, S>(required: I, min_confidence: f32, policy: CompliancePolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            detected: BTreeSet::new(),
            status: ComplianceStatus::Monitoring,
            policy,
            min_confidence,
        }
    }

    /// Whether an event counts toward compliance.
    pub fn qualifies(&self, event: &DetectionEvent) -> bool {
        event.confidence > self.min_confidence && self.required.contains(&event.label)
    }

    /// Fold one frame of detections into the state. An empty frame is valid.
    pub fn observe(&mut self, events: &[DetectionEvent]) -> ComplianceUpdate {
        let mut update = ComplianceUpdate::default();
        let mut frame_labels = BTreeSet::new();

        let qualifying: Vec<&DetectionEvent> =
            events.iter().filter(|e| self.qualifies(e)).collect();
        for event in qualifying {
            frame_labels.insert(event.label.as_str());
            if self.detected.insert(event.label.clone()) {
                info!("[ppe] detected: {}", event.label);
                update.newly_detected.push(event.label.clone());
            }
        }

        let present = match self.policy {
            CompliancePolicy::Latching => self.required.is_subset(&self.detected),
            CompliancePolicy::PerFrame => self
                .required
                .iter()
                .all(|label| frame_labels.contains(label.as_str())),
        };

        match (self.status, present) {
            (ComplianceStatus::Monitoring, true) => {
                info!("[ppe] all required items present");
                self.status = ComplianceStatus::Satisfied;
                update.transition = Some(ComplianceStatus::Satisfied);
            }
            (ComplianceStatus::Satisfied, false) if self.policy == CompliancePolicy::PerFrame => {
                warn!("[ppe] compliance lost, missing: {}", self.missing_in(&frame_labels).join(", "));
                self.status = ComplianceStatus::Monitoring;
                update.transition = Some(ComplianceStatus::Monitoring);
            }
            _ => {}
        }

        update
    }

    fn missing_in(&self, labels: &BTreeSet<&str>) -> Vec<&str> {
        self.required
            .iter()
            .map(String::as_str)
            .filter(|l| !labels.contains(l))
            .collect()
    }

    pub fn status(&self) -> ComplianceStatus {
        self.status
    }

    pub fn is_satisfied(&self) -> bool {
        self.status == ComplianceStatus::Satisfied
    }

    pub fn detected(&self) -> &BTreeSet<String> {
        &self.detected
    }

    /// Required labels never seen so far.
    pub fn outstanding(&self) -> Vec<&str> {
        self.required.difference(&self.detected).map(String::as_str).collect()
    }
}
