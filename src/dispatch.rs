//! Background identity matching with a single in-flight task.
//!
//! The analyzer is moved into the worker thread for the duration of a
//! run and handed back through the join handle, so only one run can
//! exist at a time and results are published in dispatch order. A
//! dispatch that arrives while a run is in flight is skipped.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use image::RgbImage;
use log::{debug, error};

use crate::capability::FaceAnalyzer;
use crate::matcher::IdentityMatcher;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    /// A previous run is still in flight.
    Skipped,
    /// A previous run panicked; identity matching is off for the session.
    Disabled,
}

enum Slot<A> {
    Idle(A),
    Running(JoinHandle<A>),
    Disabled,
}

pub struct IdentityDispatcher<A: FaceAnalyzer> {
    slot: Slot<A>,
    matcher: Arc<IdentityMatcher>,
    session: Session,
    started: u64,
}

impl<A: FaceAnalyzer> IdentityDispatcher<A> {
    pub fn new(analyzer: A, matcher: Arc<IdentityMatcher>, session: Session) -> Self {
        Self {
            slot: Slot::Idle(analyzer),
            matcher,
            session,
            started: 0,
        }
    }

    /// Start matching on `frame` unless a run is already in flight.
    pub fn dispatch(&mut self, frame: Arc<RgbImage>) -> Dispatch {
        self.reap(false);
        match std::mem::replace(&mut self.slot, Slot::Disabled) {
            Slot::Idle(mut analyzer) => {
                let matcher = Arc::clone(&self.matcher);
                let session = self.session.clone();
                let run = self.started;
                self.slot = Slot::Running(thread::spawn(move || {
                    run_task(run, &matcher, &mut analyzer, &frame, &session);
                    analyzer
                }));
                self.started += 1;
                Dispatch::Started
            }
            running @ Slot::Running(_) => {
                self.slot = running;
                debug!("[identity] previous run still in flight, skipping dispatch");
                Dispatch::Skipped
            }
            Slot::Disabled => Dispatch::Disabled,
        }
    }

    pub fn in_flight(&self) -> bool {
        matches!(&self.slot, Slot::Running(h) if !h.is_finished())
    }

    /// Number of runs started so far.
    pub fn started(&self) -> u64 {
        self.started
    }

    /// Block until the in-flight run, if any, has published its result.
    pub fn wait(&mut self) {
        self.reap(true);
    }

    fn reap(&mut self, block: bool) {
        self.slot = match std::mem::replace(&mut self.slot, Slot::Disabled) {
            Slot::Running(handle) if block || handle.is_finished() => match handle.join() {
                Ok(analyzer) => Slot::Idle(analyzer),
                Err(_) => {
                    error!("[identity] matching task panicked, identity matching disabled");
                    Slot::Disabled
                }
            },
            other => other,
        };
    }
}

fn run_task<A: FaceAnalyzer>(
    run: u64,
    matcher: &IdentityMatcher,
    analyzer: &mut A,
    frame: &RgbImage,
    session: &Session,
) {
    let started = Instant::now();
    match matcher.match_faces(analyzer, frame) {
        Ok(matches) => {
            debug!(
                "[identity] run {} matched {} face(s) in {:?}",
                run,
                matches.len(),
                started.elapsed()
            );
            session.publish_faces(matches);
        }
        Err(e) => {
            error!("[identity] run {} failed: {:#}", run, e);
            session.publish_faces(Vec::new());
        }
    }
}
