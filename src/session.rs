//! Session-scoped shared state.
//!
//! One mutex guards everything the frame loop and the identity task both
//! touch. Face matches are swapped as a whole `Arc<[FaceMatch]>`, so a
//! reader holds either the previous complete set or the next one.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use crate::aggregator::{ComplianceState, ComplianceStatus, ComplianceUpdate, DetectionEvent};
use crate::matcher::FaceMatch;

/// Names announced so far, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct IdentitySet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl IdentitySet {
    /// Returns `true` when `name` was not already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        self.order.push(name.to_string());
        true
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }
}

/// Result of folding one frame of detections into the session.
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    pub update: ComplianceUpdate,
    /// Events that count toward compliance, for the overlay.
    pub qualifying: Vec<DetectionEvent>,
}

/// Point-in-time copy of the session state.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub identities: Vec<String>,
    pub observed_labels: Vec<String>,
    pub detected: Vec<String>,
    pub outstanding: Vec<String>,
    pub status: ComplianceStatus,
}

struct SessionState {
    faces: Arc<[FaceMatch]>,
    identities: IdentitySet,
    compliance: ComplianceState,
    observed: BTreeSet<String>,
}

#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(compliance: ComplianceState) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                faces: Arc::from(Vec::new()),
                identities: IdentitySet::default(),
                compliance,
                observed: BTreeSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // writes are single assignments or inserts, so a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current face matches wholesale.
    pub fn publish_faces(&self, faces: Vec<FaceMatch>) {
        let faces: Arc<[FaceMatch]> = Arc::from(faces);
        self.lock().faces = faces;
    }

    /// Most recently completed face matches.
    pub fn faces(&self) -> Arc<[FaceMatch]> {
        Arc::clone(&self.lock().faces)
    }

    /// Record identified names; returns the ones seen for the first time.
    pub fn announce(&self, faces: &[FaceMatch]) -> Vec<String> {
        let mut state = self.lock();
        let mut fresh = Vec::new();
        for name in faces.iter().filter_map(|f| f.name.identified()) {
            if state.identities.insert(name) {
                info!("[person] identified: {}", name);
                fresh.push(name.to_string());
            }
        }
        fresh
    }

    /// Fold a frame of detections into the observed labels and compliance state.
    pub fn record_frame(&self, events: &[DetectionEvent]) -> FrameOutcome {
        let mut state = self.lock();
        for e in events {
            state.observed.insert(e.label.clone());
        }
        let qualifying = events
            .iter()
            .filter(|e| state.compliance.qualifies(e))
            .cloned()
            .collect();
        let update = state.compliance.observe(events);
        FrameOutcome { update, qualifying }
    }

    /// Every label the detector has reported, sorted.
    pub fn observed_labels(&self) -> Vec<String> {
        self.lock().observed.iter().cloned().collect()
    }

    pub fn identities(&self) -> Vec<String> {
        self.lock().identities.names().to_vec()
    }

    pub fn status(&self) -> ComplianceStatus {
        self.lock().compliance.status()
    }

    pub fn summary(&self) -> Summary {
        let state = self.lock();
        Summary {
            identities: state.identities.names().to_vec(),
            observed_labels: state.observed.iter().cloned().collect(),
            detected: state.compliance.detected().iter().cloned().collect(),
            outstanding: state
                .compliance
                .outstanding()
                .into_iter()
                .map(String::from)
                .collect(),
            status: state.compliance.status(),
        }
    }
}
